//! # paracheck
//!
//! Paragraph-level duplication checking and versioned AI rewriting for
//! uploaded documents.
//!
//! An upload is split into paragraphs, every paragraph is compared with
//! every other paragraph of the same document, and each one gets the
//! highest duplication score it reaches against any partner. Users then
//! rewrite paragraphs through an external text-generation backend, keep
//! snapshots in an append-only version history and download the edited
//! document as `.docx`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐
//! │  upload  │──▶│ extract  │──▶│ similarity │──▶│  SQLite  │
//! │ CLI/HTTP │   │ docx/pdf │   │ (rayon)    │   │  store   │
//! └──────────┘   └──────────┘   └────────────┘   └────┬─────┘
//!                                                     │
//!                  ┌──────────────┬───────────────────┤
//!                  ▼              ▼                   ▼
//!             ┌─────────┐   ┌──────────┐        ┌──────────┐
//!             │ rewrite │   │ versions │        │  export  │
//!             └─────────┘   └──────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`similarity`] | MinHash, LCS and character-cosine paragraph scoring |
//! | [`extract`] | Paragraph extraction from uploads |
//! | [`ingest`] | Document lifecycle service |
//! | [`store`] | SQLite persistence |
//! | [`versions`] | Append-only rewrite history |
//! | [`rewrite`] | Style-conditioned rewriting |
//! | [`generation`] | Text-generation backends |
//! | [`export`] | `.docx` reconstruction |
//! | [`blob`] | Original upload storage |
//! | [`moderation`] | Sensitive-word detection |
//! | [`audit`] | Operation log |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod audit;
pub mod blob;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod moderation;
pub mod rewrite;
pub mod server;
pub mod similarity;
pub mod store;
pub mod versions;

pub use error::{PcError, PcResult};
