/// config.rs — Centralised configuration loaded from .env
///
/// All parameters consumed by the volatility engine are defined here.
/// Loading happens once at startup; every component borrows &AppConfig.
use std::env;
use std::path::PathBuf;

use crate::error::{EngineError, Result};

pub const DEFAULT_ALPHA_BASE_URL: &str = "https://www.alphavantage.co";

/// Default AlphaVantage output size: "full" returns the complete daily
/// history, "compact" only the last 100 bars.
pub const DEFAULT_OUTPUT_SIZE: &str = "full";

#[derive(Debug, Clone)]
pub struct AppConfig {
    // ── AlphaVantage credentials / endpoint ──────────────────────────
    pub alpha_api_key: String,
    pub alpha_base_url: String,
    pub output_size: String,

    // ── Storage ──────────────────────────────────────────────────────
    /// SQLite database holding one price-bar table per ticker
    pub db_path: PathBuf,
    /// Directory receiving persisted model artifacts
    pub model_dir: PathBuf,

    // ── Fitting ──────────────────────────────────────────────────────
    /// Iteration cap for the Nelder-Mead likelihood maximisation
    pub max_fit_iters: u64,
}

impl AppConfig {
    /// Load configuration from environment variables (after dotenv).
    ///
    /// `ALPHA_API_KEY`, `DB_PATH` and `MODEL_DIR` are required; the rest
    /// fall back to sane defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env

        Ok(Self {
            alpha_api_key: require_env("ALPHA_API_KEY")?,
            alpha_base_url: env::var("ALPHA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ALPHA_BASE_URL.into()),
            output_size: env::var("ALPHA_OUTPUT_SIZE")
                .unwrap_or_else(|_| DEFAULT_OUTPUT_SIZE.into()),

            db_path: PathBuf::from(require_env("DB_PATH")?),
            model_dir: PathBuf::from(require_env("MODEL_DIR")?),

            max_fit_iters: parse_env("MAX_FIT_ITERS", 2000u64)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| EngineError::Config(format!("missing required env var {key}")))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| EngineError::Config(format!("config key {key}: {e}"))),
        Err(_) => Ok(default),
    }
}
