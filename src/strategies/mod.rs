//! Trading strategies - regime oracle and per-symbol decision engine

pub mod oracle;
pub mod regime;

pub use oracle::{GaussianHmmOracle, HmmModel};
pub use regime::{order_volume, DecisionEngine, TickOutcome};
