pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod models;
pub mod optimize;
pub mod service;
pub mod store;

pub use error::{EngineError, Result};
pub use models::garch::FittedModel;
