/// error.rs — Failure taxonomy for the volatility service core
///
/// Every failure path in the core surfaces one of these variants; nothing
/// is swallowed or replaced with a zero-like placeholder. All variants are
/// recoverable at the service facade, which converts them into
/// `{success: false, message}` payloads.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Transport failure or malformed payload from the market-data provider.
    #[error("market data fetch failed: {0}")]
    DataFetch(String),

    /// Too few price bars to compute at least one return.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Return series too short (or order invalid) for p+q+1 free parameters.
    #[error("model underdetermined: {0}")]
    ModelUnderdetermined(String),

    /// Optimizer hit its iteration cap or produced unusable parameters.
    #[error("fit did not converge: {0}")]
    FitConvergence(String),

    /// No persisted artifact for the ticker — caller should fit first.
    #[error("no fitted model found for '{0}'")]
    ModelNotFound(String),

    /// Insert under the "fail if exists" policy hit an existing table.
    #[error("store conflict: table '{0}' already exists")]
    StoreConflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::DataFetch(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Io(format!("serialization error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
