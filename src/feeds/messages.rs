//! Wire models for the streaming endpoints
//!
//! Market data frames are JSON arrays of `{"T": kind, ...}` objects.
//! Trading frames are single `{"stream": name, "data": {...}}` objects.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::core::{
    Bar, FeedEvent, OrderEvent, OrderStatusEvent, Quote, Result, Symbol, Trade,
};

/// Decoded stream message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Event(FeedEvent),
    /// Control acknowledgement (connected / authenticated / authorized)
    Success(String),
    Error { code: i64, msg: String },
    /// Subscription or listen confirmation
    Subscribed,
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "T")]
enum DataWire {
    #[serde(rename = "t")]
    Trade(WireTrade),
    #[serde(rename = "q")]
    Quote(WireQuote),
    #[serde(rename = "b")]
    Bar(WireBar),
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: i64,
        #[serde(default)]
        msg: String,
    },
    #[serde(rename = "subscription")]
    Subscription {},
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireTrade {
    #[serde(rename = "S")]
    symbol: String,
    #[serde(rename = "p")]
    price: f64,
    #[serde(rename = "s", default)]
    size: f64,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WireQuote {
    #[serde(rename = "S")]
    symbol: String,
    #[serde(rename = "bp", default)]
    bid: f64,
    #[serde(rename = "ap", default)]
    ask: f64,
    #[serde(rename = "bs", default)]
    bid_size: f64,
    #[serde(rename = "as", default)]
    ask_size: f64,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WireBar {
    #[serde(rename = "S")]
    symbol: String,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v", default)]
    volume: f64,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
}

impl From<DataWire> for StreamMessage {
    fn from(wire: DataWire) -> Self {
        match wire {
            DataWire::Trade(t) => StreamMessage::Event(FeedEvent::Trade(
                Symbol::new(t.symbol),
                Trade {
                    price: t.price,
                    size: t.size,
                    timestamp: t.timestamp,
                },
            )),
            DataWire::Quote(q) => StreamMessage::Event(FeedEvent::Quote(
                Symbol::new(q.symbol),
                Quote {
                    bid: q.bid,
                    ask: q.ask,
                    bid_size: q.bid_size,
                    ask_size: q.ask_size,
                    timestamp: q.timestamp,
                },
            )),
            DataWire::Bar(b) => StreamMessage::Event(FeedEvent::Bar(
                Symbol::new(b.symbol),
                Bar {
                    open: b.open,
                    high: b.high,
                    low: b.low,
                    close: b.close,
                    volume: b.volume,
                    timestamp: b.timestamp,
                },
            )),
            DataWire::Success { msg } => StreamMessage::Success(msg),
            DataWire::Error { code, msg } => StreamMessage::Error { code, msg },
            DataWire::Subscription {} => StreamMessage::Subscribed,
            DataWire::Unknown => StreamMessage::Ignored,
        }
    }
}

/// Decode one market data frame (a JSON array).
pub fn decode_data_frame(text: &str) -> Result<Vec<StreamMessage>> {
    let wire: Vec<DataWire> = serde_json::from_str(text)?;
    Ok(wire.into_iter().map(StreamMessage::from).collect())
}

#[derive(Debug, Deserialize)]
struct TradingWire {
    stream: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct WireTradeUpdate {
    event: String,
    order: WireOrder,
    #[serde(default)]
    position_qty: Option<Value>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireOrder {
    id: String,
    symbol: String,
}

/// Quantities arrive as strings ("10") or plain numbers.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Decode one trade-update frame.
pub fn decode_trading_frame(text: &str) -> Result<StreamMessage> {
    let wire: TradingWire = serde_json::from_str(text)?;
    let msg = match wire.stream.as_str() {
        "trade_updates" => {
            let update: WireTradeUpdate = serde_json::from_value(wire.data)?;
            StreamMessage::Event(FeedEvent::OrderUpdate(OrderStatusEvent {
                symbol: Symbol::new(update.order.symbol),
                order_id: update.order.id,
                event: OrderEvent::parse(&update.event),
                position_qty: update.position_qty.as_ref().and_then(number),
                timestamp: update.timestamp,
            }))
        }
        "authorization" => match wire.data.get("status").and_then(Value::as_str) {
            Some("authorized") => StreamMessage::Success("authorized".to_string()),
            status => StreamMessage::Error {
                code: 0,
                msg: format!("authorization status {}", status.unwrap_or("missing")),
            },
        },
        "listening" => StreamMessage::Subscribed,
        _ => StreamMessage::Ignored,
    };
    Ok(msg)
}
