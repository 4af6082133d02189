//! Common definitions shared across modules
//!
//! Error types, the user-error collector and the generator configuration.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, ErrorCollector, Result};
