//! Human-readable CLI commands.
//!
//! Each `run_*` function opens the services, performs one operation and
//! prints the result to stdout. Diagnostics go through `tracing` to stderr.

use anyhow::{Context, Result};
use std::path::Path;

use crate::app::App;
use crate::config::Config;
use crate::ingest::DocumentReport;
use crate::models::{format_ts_iso, Document, NewVersion, ParagraphEdit, RewriteVersion};
use crate::rewrite::RewriteRequest;
use crate::store::DocumentFilter;

async fn open(config: &Config) -> Result<App> {
    App::open(config)
        .await
        .context("failed to open database (did you run `paracheck init`?)")
}

pub async fn run_upload(config: &Config, path: &Path, user_id: i64) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let app = open(config).await?;
    let result = app.documents.upload(user_id, &filename, &bytes).await;
    app.close().await;
    let result = result?;

    println!("document {}: {}", result.document_id, result.title);
    println!("  overall similarity: {:.1}%", result.overall_similarity);
    println!("  paragraphs: {}", result.paragraphs.len());
    for p in &result.paragraphs {
        println!("  [{:>3}] {:>5.1}%  {}", p.index, p.similarity, preview(&p.text, 60));
    }
    Ok(())
}

pub async fn run_report(config: &Config, document_id: i64) -> Result<()> {
    let app = open(config).await?;
    let report = app.documents.report(document_id).await;
    app.close().await;
    print_report(&report?);
    Ok(())
}

pub async fn run_recheck(config: &Config, document_id: i64, user_id: i64) -> Result<()> {
    let app = open(config).await?;
    let report = app.documents.recheck(user_id, document_id).await;
    app.close().await;
    print_report(&report?);
    Ok(())
}

fn print_report(report: &DocumentReport) {
    let doc = &report.document;
    println!("document {}: {}", doc.id, doc.title);
    println!("  status: {}", doc.status);
    println!("  overall similarity: {:.1}%", doc.overall_similarity);
    println!("  updated: {}", format_ts_iso(doc.updated_at));
    println!();
    for p in &report.paragraphs {
        let score = p.similarity.unwrap_or(0.0);
        let flag = if score >= report.high_risk_threshold {
            "!"
        } else {
            " "
        };
        let source = p.similar_source.as_deref().unwrap_or("-");
        println!(
            "{}[{:>3}] {:>5.1}%  {:<14} {}",
            flag,
            p.index,
            score,
            source,
            preview(&p.text, 60)
        );
    }
    println!();
    println!(
        "{} of {} paragraphs at or above {:.0}%",
        report.high_risk.len(),
        report.paragraphs.len(),
        report.high_risk_threshold
    );
}

pub async fn run_documents(config: &Config, filter: &DocumentFilter) -> Result<()> {
    let app = open(config).await?;
    let docs = app.documents.list(filter).await;
    app.close().await;
    let docs = docs?;

    if docs.is_empty() {
        println!("No documents found.");
        return Ok(());
    }
    for doc in &docs {
        print_document_line(doc);
    }
    Ok(())
}

fn print_document_line(doc: &Document) {
    println!(
        "{:>5}  {:<10} {:>5.1}%  owner={:<5} {}  {}",
        doc.id,
        doc.status.as_str(),
        doc.overall_similarity,
        doc.owner_id,
        format_ts_iso(doc.created_at),
        doc.title
    );
}

pub async fn run_edit(
    config: &Config,
    document_id: i64,
    index: i64,
    text: &str,
    user_id: i64,
) -> Result<()> {
    let app = open(config).await?;
    let edits = [ParagraphEdit {
        index,
        text: text.to_string(),
    }];
    let changed = app
        .documents
        .update_paragraphs(user_id, document_id, &edits)
        .await;
    app.close().await;
    match changed? {
        0 => println!("No paragraph {} in document {}; nothing changed.", index, document_id),
        n => println!("Updated {} paragraph(s).", n),
    }
    Ok(())
}

pub async fn run_rewrite(config: &Config, request: &RewriteRequest, user_id: i64) -> Result<()> {
    let app = open(config).await?;
    let result = app.rewriter.rewrite(user_id, request).await;
    app.close().await;
    let result = result?;
    println!("{}", result.rewritten_text);
    eprintln!("tokens used: {}", result.tokens_used);
    Ok(())
}

pub async fn run_version_save(config: &Config, new: &NewVersion) -> Result<()> {
    let app = open(config).await?;
    let version = app.save_version(new).await;
    app.close().await;
    let version = version?;
    println!(
        "Saved version {} of document {} (id {}).",
        version.version_no, version.document_id, version.id
    );
    Ok(())
}

pub async fn run_version_list(config: &Config, document_id: i64) -> Result<()> {
    let app = open(config).await?;
    let versions = app.versions.list_versions(document_id).await;
    app.close().await;
    let versions = versions?;
    if versions.is_empty() {
        println!("No versions for document {}.", document_id);
        return Ok(());
    }
    for v in &versions {
        println!(
            "v{:<3} id={:<5} {:<14} {}  {}",
            v.version_no,
            v.id,
            v.style.as_deref().unwrap_or("-"),
            format_ts_iso(v.created_at),
            v.remark.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn run_version_get(config: &Config, version_id: i64) -> Result<()> {
    let app = open(config).await?;
    let version = app.versions.get_version(version_id).await;
    app.close().await;
    print_version(&version?);
    Ok(())
}

fn print_version(v: &RewriteVersion) {
    println!("--- version {} of document {}", v.version_no, v.document_id);
    println!("id: {}", v.id);
    println!("style: {}", v.style.as_deref().unwrap_or("-"));
    println!("created: {} by {}", format_ts_iso(v.created_at), v.created_by);
    if let Some(remark) = &v.remark {
        println!("remark: {}", remark);
    }
    println!("---");
    println!("{}", v.content);
}

pub async fn run_export(
    config: &Config,
    document_id: i64,
    output: Option<&Path>,
    user_id: i64,
) -> Result<()> {
    let app = open(config).await?;
    let exported = app.documents.export(user_id, document_id).await;
    app.close().await;
    let exported = exported?;

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::path::PathBuf::from(&exported.filename));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &exported.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "Exported document {} to {} ({}).",
        document_id,
        path.display(),
        exported.mode.as_str()
    );
    Ok(())
}

pub async fn run_delete(config: &Config, document_id: i64, user_id: i64) -> Result<()> {
    let app = open(config).await?;
    let result = app.documents.delete(user_id, document_id).await;
    app.close().await;
    result?;
    println!("Deleted document {}.", document_id);
    Ok(())
}

pub async fn run_words_add(
    config: &Config,
    word: &str,
    category: Option<&str>,
    level: Option<&str>,
) -> Result<()> {
    let app = open(config).await?;
    let added = app.words.add_word(word, category, level).await;
    app.close().await;
    let added = added?;
    println!("Added sensitive word \"{}\" ({}, {}).", added.word, added.category, added.level);
    Ok(())
}

pub async fn run_words_set_enabled(config: &Config, word: &str, enabled: bool) -> Result<()> {
    let app = open(config).await?;
    let result = app.words.set_enabled(word, enabled).await;
    app.close().await;
    result?;
    println!(
        "Sensitive word \"{}\" {}.",
        word.trim(),
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub async fn run_words_list(config: &Config) -> Result<()> {
    let app = open(config).await?;
    let words = app.words.list_words().await;
    app.close().await;
    let words = words?;
    if words.is_empty() {
        println!("No sensitive words configured.");
        return Ok(());
    }
    for w in &words {
        println!(
            "{:<20} {:<12} {:<6} {}",
            w.word,
            w.category,
            w.level,
            if w.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

/// First `max` characters on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    }
}
