//! Application configuration
//!
//! A small JSON file (`mercado-etl.json` in the working directory) with
//! sensible defaults; `DATABASE_URL` in the environment overrides the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "mercado-etl.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// sqlite connection string for both staging and normalized tables.
    pub database_url: String,
    /// Directory for per-category JSON exports.
    pub export_dir: PathBuf,
    /// 10-bit machine tag for the id generator.
    pub machine_id: u16,
    pub http: HttpConfig,
    pub markets: MarketsConfig,
    /// Max staged rows promoted per run; 0 means no limit.
    pub promotion_batch_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    /// Base for exponential backoff between retries, in milliseconds.
    pub backoff_base_ms: u64,
    /// Randomized inter-request delay bounds, in milliseconds.
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketsConfig {
    pub tenda: TendaConfig,
    pub marche: MarcheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TendaConfig {
    pub api_base_url: String,
    pub bearer_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarcheConfig {
    pub base_url: String,
    pub store_id: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/mercado.db".to_string(),
            export_dir: PathBuf::from("data"),
            machine_id: 0,
            http: HttpConfig::default(),
            markets: MarketsConfig::default(),
            promotion_batch_limit: 0,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         Chrome/114.0.0.0 Safari/537.36"
                .to_string(),
            timeout_seconds: 30,
            max_retries: 5,
            backoff_base_ms: 800,
            delay_min_ms: 1_000,
            delay_max_ms: 4_000,
        }
    }
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            tenda: TendaConfig::default(),
            marche: MarcheConfig::default(),
        }
    }
}

impl Default for TendaConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.tendaatacado.com.br/api".to_string(),
            bearer_token: String::new(),
        }
    }
}

impl Default for MarcheConfig {
    fn default() -> Self {
        Self {
            base_url: "https://marche.com.br".to_string(),
            store_id: 66_677_604_431,
        }
    }
}

impl AppConfig {
    /// Load configuration: file if present, defaults otherwise, then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                config.database_url = url;
            }
        }

        Ok(config)
    }
}
