//! Core traits - Seams between the runtime and its collaborators

use async_trait::async_trait;

use crate::core::{
    CloseAmount, CloseResult, FeatureVector, OrderAck, OrderRequest, PositionSnapshot, Result,
    Symbol,
};

/// Execution venue - REST surface used by the ledger and the order manager
#[async_trait]
pub trait Venue: Send + Sync {
    /// Venue name for logging
    fn name(&self) -> &str;

    /// Submit an order. Non-success statuses map to `Error::VenueRejection`.
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    /// Fetch open positions, or a single symbol's position
    async fn fetch_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<PositionSnapshot>>;

    /// Close (part of) one position. Returns the venue's order body.
    async fn close_position(&self, symbol: &Symbol, amount: CloseAmount)
    -> Result<serde_json::Value>;

    /// Close every position; one sub-result per affected symbol
    async fn close_all_positions(&self, cancel_orders: bool) -> Result<Vec<CloseResult>>;
}

/// Regime classifier - opaque oracle over the accumulated feature matrix
pub trait RegimeOracle: Send + Sync {
    /// One label per input row, same length as `features`.
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<usize>>;
}
