pub mod garch;

pub use garch::{FittedModel, GarchParams};
