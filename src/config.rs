//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/paracheck.sqlite"
//!
//! [storage]
//! root = "./data/uploads"
//!
//! [similarity]
//! high_risk_threshold = 70.0
//! parallel = true
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub versions: VersionsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    /// Paragraphs at or above this score are listed as high risk in reports.
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,
    /// Run the pair loop on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: default_high_risk_threshold(),
            parallel: default_parallel(),
        }
    }
}

fn default_high_risk_threshold() -> f64 {
    70.0
}
fn default_parallel() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_generation_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// No timeout unless set; the orchestrator itself never imposes one.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: default_generation_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: None,
            temperature: None,
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_generation_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VersionsConfig {
    /// How many times the CLI and server retry a save that lost a version-number race.
    #[serde(default = "default_max_save_attempts")]
    pub max_save_attempts: u32,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            max_save_attempts: default_max_save_attempts(),
        }
    }
}

fn default_max_save_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !(0.0..=100.0).contains(&config.similarity.high_risk_threshold) {
        anyhow::bail!("similarity.high_risk_threshold must be in [0, 100]");
    }

    if config.versions.max_save_attempts == 0 {
        anyhow::bail!("versions.max_save_attempts must be >= 1");
    }

    match config.generation.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.generation.model.is_none() {
                anyhow::bail!("generation.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if let Some(t) = config.generation.temperature {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!("[db]\npath = \"/tmp/pc.sqlite\"\n{}", extra);
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.similarity.high_risk_threshold, 70.0);
        assert!(config.similarity.parallel);
        assert!(!config.generation.is_enabled());
        assert_eq!(config.generation.timeout_secs, None);
        assert_eq!(config.versions.max_save_attempts, 3);
        assert_eq!(config.storage.root, PathBuf::from("./data/uploads"));
    }

    #[test]
    fn openai_requires_model() {
        let err = parse("[generation]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("generation.model"));
        assert!(parse("[generation]\nprovider = \"openai\"\nmodel = \"m\"\n").is_ok());
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(parse("[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(parse("[similarity]\nhigh_risk_threshold = 120.0\n").is_err());
    }
}
