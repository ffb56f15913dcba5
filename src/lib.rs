//! RegimeTX - Core Library
//! Regime-driven equity trading runtime

// Public modules
pub mod core;
pub mod exchanges;
pub mod execution;
pub mod feeds;
pub mod strategies;

// Re-exports
pub use core::{AppConfig, Error, Result};
