//! Position ledger - best-effort view of venue positions
//!
//! Quantities are only ever replaced, never accumulated: both snapshot rows
//! and fill notifications carry the venue's post-event total.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::{PositionSnapshot, Symbol, Venue};

pub struct PositionLedger {
    venue: Arc<dyn Venue>,
    positions: RwLock<HashMap<Symbol, f64>>,
}

impl PositionLedger {
    pub fn new(venue: Arc<dyn Venue>) -> Self {
        Self {
            venue,
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Build and load the initial snapshot
    pub async fn create(venue: Arc<dyn Venue>) -> Self {
        let ledger = Self::new(venue);
        ledger.refresh_snapshot().await;
        ledger
    }

    /// Fetch all positions and overwrite every symbol in the response.
    /// Symbols missing from the response keep their last value.
    /// Failures are logged and the ledger keeps serving what it has.
    pub async fn refresh_snapshot(&self) {
        match self.venue.fetch_positions(None).await {
            Ok(rows) => {
                info!("Position snapshot: {} symbols from {}", rows.len(), self.venue.name());
                self.apply_snapshot(rows);
            }
            Err(e) => warn!("Failed to get positions: {}", e),
        }
    }

    /// Same as `refresh_snapshot` for one symbol
    pub async fn refresh_symbol(&self, symbol: &Symbol) {
        match self.venue.fetch_positions(Some(symbol)).await {
            Ok(rows) => self.apply_snapshot(rows),
            Err(e) => warn!("Failed to get position for {}: {}", symbol, e),
        }
    }

    fn apply_snapshot(&self, rows: Vec<PositionSnapshot>) {
        let mut positions = self.positions.write();
        for row in rows {
            debug!("Position {} = {}", row.symbol, row.quantity);
            positions.insert(row.symbol, row.quantity);
        }
    }

    /// Replace the stored quantity with the fill's resulting total
    pub fn apply_fill(&self, symbol: &Symbol, resulting_quantity: f64) {
        info!("Position update from fill: {} -> {}", symbol, resulting_quantity);
        self.positions
            .write()
            .insert(symbol.clone(), resulting_quantity);
    }

    /// Zero for symbols never seen
    pub fn quantity(&self, symbol: &Symbol) -> f64 {
        self.positions.read().get(symbol).copied().unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> HashMap<Symbol, f64> {
        self.positions.read().clone()
    }
}
