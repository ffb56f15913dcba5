//! Core module - Common types, traits, configuration and error handling

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{AppConfig, Credentials, SymbolConfig};
pub use error::{Error, ErrorKind, Result};
pub use traits::*;
pub use types::*;
