//! Execution layer - Order lifecycle and position tracking

pub mod orders;
pub mod positions;

#[cfg(test)]
pub(crate) mod testing;

pub use orders::{InsertOrderResponse, OrderLifecycleManager};
pub use positions::PositionLedger;
