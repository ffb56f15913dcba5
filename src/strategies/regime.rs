//! Regime decision engine - one per traded symbol
//!
//! Polls the market data cache on a fixed interval. Each new bar becomes one
//! feature vector; the oracle re-labels the whole feature history and the
//! newest label sets the regime. The regime picks side, limit offset and
//! target volume. At most one order is kept in flight per symbol.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::{
    round_price, Bar, FeatureVector, OrderKind, Regime, RegimeOracle, Side, Symbol, SymbolConfig,
};
use crate::execution::{OrderLifecycleManager, PositionLedger};
use crate::feeds::MarketDataCache;

/// Result of one decision tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No bar has been seen for the symbol
    NoData,
    /// First bar seeded the previous close
    Seeded,
    /// No regime has been established yet
    NoRegime,
    /// Target volume is zero
    Flat,
    /// No mid price to quote against
    NoQuote,
    /// Previous order has not reached a terminal state
    OrderPending,
    /// Order accepted by the venue, with its id
    Submitted(String),
    /// Venue call failed or was rejected
    SubmitFailed,
}

/// Order size for a regime, given the current position and cap.
///
/// Bull buys up to the cap, or buys back a short to flat. Bear sells a long
/// to flat; if shortable it extends a short up to the cap, otherwise it
/// sells `|pos|`. The result is floored at zero.
pub fn order_volume(regime: Regime, shortable: bool, position: f64, max_position: f64) -> f64 {
    let volume = match regime {
        Regime::Unset => 0.0,
        Regime::Bull if position >= 0.0 => max_position - position,
        Regime::Bull => position.abs(),
        Regime::Bear if position > 0.0 => position,
        Regime::Bear if shortable => max_position - position.abs(),
        Regime::Bear => position.abs(),
    };
    volume.max(0.0)
}

pub struct DecisionEngine {
    symbol: Symbol,
    max_position: f64,
    shortable: bool,
    poll_interval: Duration,

    oracle: Arc<dyn RegimeOracle>,
    cache: Arc<MarketDataCache>,
    ledger: Arc<PositionLedger>,
    orders: Arc<OrderLifecycleManager>,

    last_close: Option<f64>,
    last_bar_count: Option<usize>,
    regime: Regime,
    outstanding_order_id: Option<String>,
    features: Vec<FeatureVector>,
}

impl DecisionEngine {
    pub fn new(
        config: &SymbolConfig,
        oracle: Arc<dyn RegimeOracle>,
        cache: Arc<MarketDataCache>,
        ledger: Arc<PositionLedger>,
        orders: Arc<OrderLifecycleManager>,
    ) -> Self {
        Self {
            symbol: config.symbol(),
            max_position: f64::from(config.max_position),
            shortable: config.shortable,
            poll_interval: config.poll_interval(),
            oracle,
            cache,
            ledger,
            orders,
            last_close: None,
            last_bar_count: None,
            regime: Regime::Unset,
            outstanding_order_id: None,
            features: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }

    pub fn last_close(&self) -> Option<f64> {
        self.last_close
    }

    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    pub fn outstanding_order_id(&self) -> Option<&str> {
        self.outstanding_order_id.as_deref()
    }

    /// Run one decision step
    pub async fn tick(&mut self) -> TickOutcome {
        let Some((bar_count, bar)) = self.cache.bar_state(&self.symbol) else {
            return TickOutcome::NoData;
        };

        match self.last_bar_count {
            None => {
                debug!("{} seeded at close {}", self.symbol, bar.close);
                self.last_close = Some(bar.close);
                self.last_bar_count = Some(bar_count);
                return TickOutcome::Seeded;
            }
            Some(seen) if bar_count > seen => self.observe_bar(bar_count, &bar),
            Some(_) => {}
        }

        let (Some(side), Some(offset)) = (self.regime.side(), self.regime.price_offset()) else {
            return TickOutcome::NoRegime;
        };

        let position = self.ledger.quantity(&self.symbol);
        let volume = order_volume(self.regime, self.shortable, position, self.max_position);
        if volume == 0.0 {
            return TickOutcome::Flat;
        }

        let Some(mid) = self.cache.mid_price(&self.symbol) else {
            debug!("{} has no mid price yet", self.symbol);
            return TickOutcome::NoQuote;
        };
        let price = round_price(mid + offset);

        if !self.orders.last_order_terminal(&self.symbol) {
            return TickOutcome::OrderPending;
        }

        self.submit(side, volume, price).await
    }

    async fn submit(&mut self, side: Side, volume: f64, price: f64) -> TickOutcome {
        info!(
            "{} {} regime: {} {} @ {} (position {})",
            self.symbol,
            self.regime,
            side,
            volume,
            price,
            self.ledger.quantity(&self.symbol)
        );
        let response = self
            .orders
            .insert_order(&self.symbol, price, volume, side, OrderKind::Ioc)
            .await;
        match response.order_id {
            Some(id) => {
                self.outstanding_order_id = Some(id.clone());
                TickOutcome::Submitted(id)
            }
            None => {
                warn!(
                    "{} order not placed: {}",
                    self.symbol,
                    response.error_reason().unwrap_or_default()
                );
                TickOutcome::SubmitFailed
            }
        }
    }

    fn observe_bar(&mut self, bar_count: usize, bar: &Bar) {
        if let Some(last_close) = self.last_close {
            match FeatureVector::from_bar(bar, last_close) {
                Some(fv) => {
                    self.features.push(fv);
                    self.update_regime();
                }
                None => warn!("{} skipping degenerate bar {:?}", self.symbol, bar),
            }
        }
        self.last_close = Some(bar.close);
        self.last_bar_count = Some(bar_count);
    }

    fn update_regime(&mut self) {
        let labels = match self.oracle.predict(&self.features) {
            Ok(labels) => labels,
            Err(e) => {
                warn!("{} regime inference failed: {}", self.symbol, e);
                return;
            }
        };
        if labels.len() != self.features.len() {
            warn!(
                "{} oracle returned {} labels for {} rows",
                self.symbol,
                labels.len(),
                self.features.len()
            );
            return;
        }
        let Some(label) = labels.last().copied() else {
            return;
        };
        match Regime::from_label(label) {
            Some(regime) => {
                if regime != self.regime {
                    info!("{} regime {} -> {}", self.symbol, self.regime, regime);
                }
                self.regime = regime;
            }
            None => warn!("{} unknown regime label {}", self.symbol, label),
        }
    }

    /// Tick forever on the poll interval
    pub async fn run(mut self) {
        info!(
            "Decision engine started for {} (max position {}, shortable {}, every {:?})",
            self.symbol, self.max_position, self.shortable, self.poll_interval
        );
        loop {
            let outcome = self.tick().await;
            debug!("{} tick: {:?}", self.symbol, outcome);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
