//! Core types - Strong typing for feed events, orders and regimes

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::Error;

/// Tradeable symbol (e.g., "AAPL")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(Error::Validation(format!(
                "side must be one of [buy, sell], got {other:?}"
            ))),
        }
    }
}

/// Order type accepted by the order manager.
///
/// Only membership is checked: the venue request is always sent as a
/// limit order with time-in-force IOC, whichever kind the caller picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Ioc,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::Ioc => write!(f, "IOC"),
        }
    }
}

impl FromStr for OrderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "limit" => Ok(OrderKind::Limit),
            "ioc" => Ok(OrderKind::Ioc),
            other => Err(Error::Validation(format!(
                "order type must be one of [limit, ioc], got {other:?}"
            ))),
        }
    }
}

/// OHLC bar for one period. Appended to history, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// Top of book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Mid price rounded to cents, `None` while either side is missing.
    pub fn mid(&self) -> Option<f64> {
        if self.bid > 0.0 && self.ask > 0.0 {
            Some(round_price((self.bid + self.ask) * 0.5))
        } else {
            None
        }
    }
}

/// Last-sale print
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub price: f64,
    pub size: f64,
    pub timestamp: DateTime<Utc>,
}

/// Trade-update event kinds reported by the venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    New,
    PendingNew,
    Fill,
    PartialFill,
    Canceled,
    Expired,
    Rejected,
    Replaced,
    DoneForDay,
    Other(String),
}

impl OrderEvent {
    pub fn parse(s: &str) -> Self {
        match s {
            "new" => OrderEvent::New,
            "pending_new" => OrderEvent::PendingNew,
            "fill" => OrderEvent::Fill,
            "partial_fill" => OrderEvent::PartialFill,
            "canceled" => OrderEvent::Canceled,
            "expired" => OrderEvent::Expired,
            "rejected" => OrderEvent::Rejected,
            "replaced" => OrderEvent::Replaced,
            "done_for_day" => OrderEvent::DoneForDay,
            other => OrderEvent::Other(other.to_string()),
        }
    }

    /// Events that carry a post-fill position total.
    pub fn is_fill(&self) -> bool {
        matches!(self, OrderEvent::Fill | OrderEvent::PartialFill)
    }

    /// End of an order's lifecycle: filled or canceled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderEvent::Fill | OrderEvent::Canceled)
    }
}

impl std::fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderEvent::New => "new",
            OrderEvent::PendingNew => "pending_new",
            OrderEvent::Fill => "fill",
            OrderEvent::PartialFill => "partial_fill",
            OrderEvent::Canceled => "canceled",
            OrderEvent::Expired => "expired",
            OrderEvent::Rejected => "rejected",
            OrderEvent::Replaced => "replaced",
            OrderEvent::DoneForDay => "done_for_day",
            OrderEvent::Other(s) => s.as_str(),
        };
        write!(f, "{s}")
    }
}

/// Order status notification from the trade-update stream
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusEvent {
    pub symbol: Symbol,
    pub order_id: String,
    pub event: OrderEvent,
    /// Venue-reported position total after this event (fills only)
    pub position_qty: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Typed feed event, one variant per stream channel
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Trade(Symbol, Trade),
    Quote(Symbol, Quote),
    Bar(Symbol, Bar),
    OrderUpdate(OrderStatusEvent),
}

/// Order request handed to the venue
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: f64,
    pub price: f64,
    pub client_order_id: String,
}

/// Venue acknowledgement of a submitted order
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderAck {
    pub id: String,
    pub symbol: Symbol,
}

/// Record of an order the manager submitted (or a close order the venue created)
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: String,
    pub symbol: Symbol,
    pub submitted_at: DateTime<Utc>,
}

/// One row of a position snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    pub quantity: f64,
}

/// How much of a position to close
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseAmount {
    Qty(f64),
    Percentage(f64),
}

/// Per-symbol sub-result of a close-all request
#[derive(Debug, Clone, PartialEq)]
pub struct CloseResult {
    pub symbol: Symbol,
    pub status: u16,
    pub order_id: Option<String>,
    pub body: serde_json::Value,
}

impl CloseResult {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Per-bar features fed to the regime oracle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub log_return: f64,
    pub high_over_open: f64,
    pub low_over_open: f64,
    pub close_over_open: f64,
}

impl FeatureVector {
    pub const DIM: usize = 4;

    /// Features of `bar` normalised by the previous close.
    /// `None` when a ratio would not be finite (non-positive open or previous close).
    pub fn from_bar(bar: &Bar, last_close: f64) -> Option<Self> {
        if bar.open <= 0.0 || last_close <= 0.0 || bar.close <= 0.0 {
            return None;
        }
        let fv = Self {
            log_return: (bar.close / last_close).ln(),
            high_over_open: bar.high / bar.open,
            low_over_open: bar.low / bar.open,
            close_over_open: bar.close / bar.open,
        };
        fv.as_array().iter().all(|v| v.is_finite()).then_some(fv)
    }

    pub fn as_array(&self) -> [f64; Self::DIM] {
        [
            self.log_return,
            self.high_over_open,
            self.low_over_open,
            self.close_over_open,
        ]
    }
}

/// Market regime assigned by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Regime {
    Bull,
    Bear,
    #[default]
    Unset,
}

impl Regime {
    /// Oracle label mapping: 0 is bull, 1 is bear.
    pub fn from_label(label: usize) -> Option<Self> {
        match label {
            0 => Some(Regime::Bull),
            1 => Some(Regime::Bear),
            _ => None,
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            Regime::Bull => Some(Side::Buy),
            Regime::Bear => Some(Side::Sell),
            Regime::Unset => None,
        }
    }

    /// Offset applied to the mid price when quoting the limit.
    pub fn price_offset(&self) -> Option<f64> {
        match self {
            Regime::Bull => Some(0.1),
            Regime::Bear => Some(-0.1),
            Regime::Unset => None,
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Bull => write!(f, "BULL"),
            Regime::Bear => write!(f, "BEAR"),
            Regime::Unset => write!(f, "UNSET"),
        }
    }
}

/// Round a price to cents, ties to even.
pub fn round_price(value: f64) -> f64 {
    match Decimal::try_from(value) {
        Ok(d) => d
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
            .to_f64()
            .unwrap_or(value),
        Err(_) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bid: f64, ask: f64) -> Quote {
        Quote {
            bid,
            ask,
            bid_size: 1.0,
            ask_size: 1.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_mid_requires_both_sides() {
        assert_eq!(quote(100.10, 100.30).mid(), Some(100.20));
        assert_eq!(quote(0.0, 100.30).mid(), None);
        assert_eq!(quote(100.10, 0.0).mid(), None);
    }

    #[test]
    fn test_side_and_kind_validation() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::Sell);
        assert!(matches!("hold".parse::<Side>(), Err(Error::Validation(_))));
        assert_eq!("ioc".parse::<OrderKind>().unwrap(), OrderKind::Ioc);
        assert!(matches!("market".parse::<OrderKind>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_feature_vector_from_bar() {
        let bar = Bar {
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            volume: 1_000.0,
            timestamp: Utc::now(),
        };
        let fv = FeatureVector::from_bar(&bar, 100.0).unwrap();
        assert!((fv.log_return - (1.01f64).ln()).abs() < 1e-12);
        assert_eq!(fv.high_over_open, 1.02);
        assert_eq!(fv.low_over_open, 0.99);
        assert_eq!(fv.close_over_open, 1.01);
        assert!(FeatureVector::from_bar(&bar, 0.0).is_none());
    }

    #[test]
    fn test_terminal_events() {
        assert!(OrderEvent::parse("fill").is_terminal());
        assert!(OrderEvent::parse("canceled").is_terminal());
        assert!(!OrderEvent::parse("partial_fill").is_terminal());
        assert!(OrderEvent::parse("partial_fill").is_fill());
        assert_eq!(
            OrderEvent::parse("held"),
            OrderEvent::Other("held".to_string())
        );
    }

    #[test]
    fn test_regime_labels() {
        assert_eq!(Regime::from_label(0), Some(Regime::Bull));
        assert_eq!(Regime::from_label(1), Some(Regime::Bear));
        assert_eq!(Regime::from_label(2), None);
        assert_eq!(Regime::Bear.price_offset(), Some(-0.1));
        assert_eq!(Regime::Unset.side(), None);
    }

    #[test]
    fn test_round_price() {
        assert_eq!(round_price(100.2 + 0.1), 100.3);
        assert_eq!(round_price(99.999), 100.0);
    }
}
