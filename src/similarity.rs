//! Intra-document duplication scoring.
//!
//! Every pair of paragraphs in one document is compared with three signals:
//!
//! | Signal | Weight | What it measures |
//! |--------|--------|------------------|
//! | MinHash | 0.4 | Jaccard estimate over 3-character shingles (whitespace stripped) |
//! | LCS ratio | 0.3 | Longest common subsequence over the first 500 characters |
//! | Character cosine | 0.3 | Cosine of non-whitespace code-point histograms |
//!
//! A paragraph's score is the best combined value it reaches against any
//! other paragraph, scaled to 0–100. The document score is the plain mean
//! of the paragraph scores, so one heavily duplicated pair and many mildly
//! similar ones can land on the same number.
//!
//! Scoring is pure: the only shared state is the MinHash coefficient table,
//! built once from a fixed seed and never mutated afterwards. Identical input
//! always yields identical output, whether scored sequentially or on the
//! rayon pool.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Number of MinHash functions.
pub const SIGNATURE_SIZE: usize = 64;
/// Mersenne prime 2^31 - 1 used as the MinHash modulus.
pub const MINHASH_PRIME: u64 = 2_147_483_647;
/// Shingle length in characters.
pub const SHINGLE_LEN: usize = 3;
/// Characters of each text considered by the LCS signal.
pub const LCS_MAX_CHARS: usize = 500;

pub const MINHASH_WEIGHT: f64 = 0.4;
pub const LCS_WEIGHT: f64 = 0.3;
pub const COSINE_WEIGHT: f64 = 0.3;

const COEFFICIENT_SEED: u64 = 42;

struct HashCoefficients {
    a: [u64; SIGNATURE_SIZE],
    b: [u64; SIGNATURE_SIZE],
}

fn coefficients() -> &'static HashCoefficients {
    static TABLE: OnceLock<HashCoefficients> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(COEFFICIENT_SEED);
        let mut a = [0u64; SIGNATURE_SIZE];
        let mut b = [0u64; SIGNATURE_SIZE];
        for i in 0..SIGNATURE_SIZE {
            a[i] = rng.gen_range(1..MINHASH_PRIME);
            b[i] = rng.gen_range(1..MINHASH_PRIME);
        }
        HashCoefficients { a, b }
    })
}

/// Per-signal breakdown for one pair of paragraphs. All values in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairScore {
    pub minhash: f64,
    pub lcs: f64,
    pub cosine: f64,
    pub combined: f64,
}

impl PairScore {
    const ZERO: PairScore = PairScore {
        minhash: 0.0,
        lcs: 0.0,
        cosine: 0.0,
        combined: 0.0,
    };
}

/// Scores for a whole document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityReport {
    /// One score per input paragraph, in input order, each in [0, 100].
    pub scores: Vec<f64>,
    /// Index of the paragraph that produced each maximum, if any pair scored above zero.
    pub sources: Vec<Option<usize>>,
    /// Mean of `scores`; 0 for an empty document.
    pub overall: f64,
}

/// Everything the pair loop needs from one paragraph, computed once.
struct Profile {
    blank: bool,
    signature: [u64; SIGNATURE_SIZE],
    lcs_chars: Vec<char>,
    histogram: HashMap<char, u64>,
    norm_sq: u64,
}

impl Profile {
    fn build(text: &str) -> Self {
        let normalized: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let blank = normalized.is_empty();

        let mut histogram: HashMap<char, u64> = HashMap::new();
        for c in normalized.chars() {
            *histogram.entry(c).or_insert(0) += 1;
        }
        let norm_sq = histogram.values().map(|v| v * v).sum();

        Self {
            blank,
            signature: signature(&normalized),
            lcs_chars: text.chars().take(LCS_MAX_CHARS).collect(),
            histogram,
            norm_sq,
        }
    }
}

fn shingle_hash(shingle: &str) -> u64 {
    let digest = Sha256::digest(shingle.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % MINHASH_PRIME
}

fn shingles(normalized: &str) -> HashSet<u64> {
    let chars: Vec<char> = normalized.chars().collect();
    let mut set = HashSet::new();
    if chars.len() <= SHINGLE_LEN {
        set.insert(shingle_hash(normalized));
        return set;
    }
    for window in chars.windows(SHINGLE_LEN) {
        let shingle: String = window.iter().collect();
        set.insert(shingle_hash(&shingle));
    }
    set
}

fn signature(normalized: &str) -> [u64; SIGNATURE_SIZE] {
    let table = coefficients();
    let mut sig = [u64::MAX; SIGNATURE_SIZE];
    for h in shingles(normalized) {
        for i in 0..SIGNATURE_SIZE {
            let v = (table.a[i] * h + table.b[i]) % MINHASH_PRIME;
            if v < sig[i] {
                sig[i] = v;
            }
        }
    }
    sig
}

fn signature_agreement(a: &[u64; SIGNATURE_SIZE], b: &[u64; SIGNATURE_SIZE]) -> f64 {
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matches as f64 / SIGNATURE_SIZE as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn lcs_ratio_chars(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    (2 * lcs_len(a, b)) as f64 / (a.len() + b.len()) as f64
}

fn cosine_profiles(a: &Profile, b: &Profile) -> f64 {
    if a.norm_sq == 0 || b.norm_sq == 0 {
        return 0.0;
    }
    let (small, large) = if a.histogram.len() <= b.histogram.len() {
        (&a.histogram, &b.histogram)
    } else {
        (&b.histogram, &a.histogram)
    };
    let dot: u64 = small
        .iter()
        .filter_map(|(c, n)| large.get(c).map(|m| n * m))
        .sum();
    // sqrt of the product keeps identical histograms at exactly 1.0
    (dot as f64 / (a.norm_sq as f64 * b.norm_sq as f64).sqrt()).min(1.0)
}

fn score_profiles(a: &Profile, b: &Profile) -> PairScore {
    if a.blank || b.blank {
        return PairScore::ZERO;
    }
    let minhash = signature_agreement(&a.signature, &b.signature);
    let lcs = lcs_ratio_chars(&a.lcs_chars, &b.lcs_chars);
    let cosine = cosine_profiles(a, b);
    let combined =
        (MINHASH_WEIGHT * minhash + LCS_WEIGHT * lcs + COSINE_WEIGHT * cosine).clamp(0.0, 1.0);
    PairScore {
        minhash,
        lcs,
        cosine,
        combined,
    }
}

/// MinHash estimate of the Jaccard similarity of two texts' shingle sets.
pub fn minhash_similarity(a: &str, b: &str) -> f64 {
    score_pair(a, b).minhash
}

/// `2 * LCS / (len(a) + len(b))` over the first [`LCS_MAX_CHARS`] characters.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().take(LCS_MAX_CHARS).collect();
    let b: Vec<char> = b.chars().take(LCS_MAX_CHARS).collect();
    lcs_ratio_chars(&a, &b)
}

/// Cosine similarity of the non-whitespace character histograms.
pub fn char_cosine(a: &str, b: &str) -> f64 {
    cosine_profiles(&Profile::build(a), &Profile::build(b))
}

/// Full signal breakdown for two paragraphs. Blank input scores zero.
pub fn score_pair(a: &str, b: &str) -> PairScore {
    score_profiles(&Profile::build(a), &Profile::build(b))
}

#[derive(Debug, Clone, Copy, Default)]
struct Best {
    score: f64,
    partner: Option<usize>,
}

impl Best {
    fn offer(&mut self, score: f64, partner: usize) {
        if score > self.score {
            self.score = score;
            self.partner = Some(partner);
        }
    }

    /// Higher score wins; ties go to the lower partner index, which is what
    /// the sequential loop picks.
    fn merge(self, other: Best) -> Best {
        match other.score.partial_cmp(&self.score) {
            Some(Ordering::Greater) => other,
            Some(Ordering::Equal) if other.partner < self.partner => other,
            _ => self,
        }
    }
}

fn offer_row(profiles: &[Profile], i: usize, best: &mut [Best]) {
    for j in (i + 1)..profiles.len() {
        let combined = score_profiles(&profiles[i], &profiles[j]).combined;
        best[i].offer(combined, j);
        best[j].offer(combined, i);
    }
}

fn finish(best: Vec<Best>) -> SimilarityReport {
    let scores: Vec<f64> = best.iter().map(|b| b.score * 100.0).collect();
    let sources = best.iter().map(|b| b.partner).collect();
    let overall = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    SimilarityReport {
        scores,
        sources,
        overall,
    }
}

/// Score every paragraph against every other one on the calling thread.
pub fn score_paragraphs<S: AsRef<str>>(texts: &[S]) -> SimilarityReport {
    let n = texts.len();
    if n <= 1 {
        return finish(vec![Best::default(); n]);
    }
    let profiles: Vec<Profile> = texts.iter().map(|t| Profile::build(t.as_ref())).collect();
    let mut best = vec![Best::default(); n];
    for i in 0..n {
        offer_row(&profiles, i, &mut best);
    }
    finish(best)
}

/// Same result as [`score_paragraphs`], with the pair loop spread over rayon.
///
/// Each worker keeps its own per-paragraph maxima; they are merged afterwards.
pub fn score_paragraphs_parallel<S: AsRef<str> + Sync>(texts: &[S]) -> SimilarityReport {
    let n = texts.len();
    if n <= 1 {
        return finish(vec![Best::default(); n]);
    }
    let profiles: Vec<Profile> = texts
        .par_iter()
        .map(|t| Profile::build(t.as_ref()))
        .collect();
    let best = (0..n)
        .into_par_iter()
        .fold(
            || vec![Best::default(); n],
            |mut acc, i| {
                offer_row(&profiles, i, &mut acc);
                acc
            },
        )
        .reduce(
            || vec![Best::default(); n],
            |a, b| a.into_iter().zip(b).map(|(x, y)| x.merge(y)).collect(),
        );
    finish(best)
}
