//! Exchange implementations - Venue adapters

pub mod alpaca;

pub use alpaca::Alpaca;
