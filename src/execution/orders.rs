//! Order lifecycle manager - submits orders and remembers outcomes
//!
//! Does not enforce one open order per symbol; callers check
//! `last_order_terminal` before submitting.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{
    CloseAmount, Error, OrderKind, OrderRecord, OrderRequest, OrderStatusEvent, Side, Symbol,
    Venue,
};

/// Outcome of `insert_order`
#[derive(Debug)]
pub struct InsertOrderResponse {
    pub order_id: Option<String>,
    pub error: Option<Error>,
}

impl InsertOrderResponse {
    fn accepted(order_id: String) -> Self {
        Self {
            order_id: Some(order_id),
            error: None,
        }
    }

    fn failed(error: Error) -> Self {
        Self {
            order_id: None,
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.order_id.is_some()
    }

    pub fn error_reason(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

#[derive(Debug, Default)]
struct SymbolOrders {
    latest: Option<OrderRecord>,
    statuses: HashMap<String, OrderStatusEvent>,
}

pub struct OrderLifecycleManager {
    venue: Arc<dyn Venue>,
    orders: RwLock<HashMap<Symbol, SymbolOrders>>,
}

impl OrderLifecycleManager {
    pub fn new(venue: Arc<dyn Venue>) -> Self {
        Self {
            venue,
            orders: RwLock::new(HashMap::new()),
        }
    }

    /// Submit a limit order. The venue request is always limit + IOC;
    /// `kind` only has to be one of the accepted kinds. Never retries.
    pub async fn insert_order(
        &self,
        symbol: &Symbol,
        price: f64,
        quantity: f64,
        side: Side,
        kind: OrderKind,
    ) -> InsertOrderResponse {
        let request = OrderRequest {
            symbol: symbol.clone(),
            side,
            kind,
            quantity,
            price,
            client_order_id: Uuid::new_v4().to_string(),
        };

        match self.venue.submit_order(&request).await {
            Ok(ack) => {
                info!(
                    "Successful order insertion - Symbol: {}, Qty: {}, Side: {}, Price: {}, Id: {}",
                    symbol, quantity, side, price, ack.id
                );
                self.record_order(&ack.symbol, ack.id.clone());
                InsertOrderResponse::accepted(ack.id)
            }
            Err(e) => {
                warn!("Order insertion error ({:?}) for {}: {}", e.kind(), symbol, e);
                InsertOrderResponse::failed(e)
            }
        }
    }

    fn record_order(&self, symbol: &Symbol, order_id: String) {
        let record = OrderRecord {
            id: order_id,
            symbol: symbol.clone(),
            submitted_at: Utc::now(),
        };
        self.orders
            .write()
            .entry(symbol.clone())
            .or_default()
            .latest = Some(record);
    }

    /// Close part of a position by quantity or percentage. Fire-and-forget.
    pub async fn close_position(&self, symbol: &Symbol, amount: CloseAmount) {
        match self.venue.close_position(symbol, amount).await {
            Ok(body) => info!("Closed position for {} ({:?}): {}", symbol, amount, body),
            Err(e) => warn!("Failed to close position for {}: {}", symbol, e),
        }
    }

    /// Close every position. Each per-symbol result is logged; successful
    /// close orders become that symbol's latest order.
    pub async fn close_all_positions(&self, cancel_orders: bool) {
        let results = match self.venue.close_all_positions(cancel_orders).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Error closing all positions: {}", e);
                return;
            }
        };
        info!("Close all positions: {} symbol results", results.len());
        for result in results {
            if result.is_success() {
                info!("Closed position for {}: {}", result.symbol, result.body);
                if let Some(id) = result.order_id {
                    self.record_order(&result.symbol, id);
                }
            } else {
                warn!(
                    "Failed to close position for {}: status {}, details: {}",
                    result.symbol, result.status, result.body
                );
            }
        }
    }

    /// Store the latest status event for an order
    pub fn record_status(&self, event: OrderStatusEvent) {
        self.orders
            .write()
            .entry(event.symbol.clone())
            .or_default()
            .statuses
            .insert(event.order_id.clone(), event);
    }

    pub fn order_record(&self, symbol: &Symbol) -> Option<OrderRecord> {
        self.orders.read().get(symbol)?.latest.clone()
    }

    pub fn order_status(&self, symbol: &Symbol, order_id: &str) -> Option<OrderStatusEvent> {
        self.orders.read().get(symbol)?.statuses.get(order_id).cloned()
    }

    /// Whether the symbol's most recent order has finished.
    /// No order, or no status seen for it yet, both count as finished.
    pub fn last_order_terminal(&self, symbol: &Symbol) -> bool {
        let orders = self.orders.read();
        let entry = orders.get(symbol);
        let Some(record) = entry.and_then(|o| o.latest.as_ref()) else {
            debug!("No submitted order for {}", symbol);
            return true;
        };
        match entry.and_then(|o| o.statuses.get(&record.id)) {
            Some(status) => status.event.is_terminal(),
            None => {
                debug!("No trade update for {} order {}", symbol, record.id);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CloseResult, ErrorKind, OrderAck, OrderEvent};
    use crate::execution::testing::MockVenue;

    fn status(symbol: &str, id: &str, event: &str) -> OrderStatusEvent {
        OrderStatusEvent {
            symbol: Symbol::new(symbol),
            order_id: id.to_string(),
            event: OrderEvent::parse(event),
            position_qty: None,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_insert_records_order_and_sends_limit() {
        let venue = Arc::new(MockVenue::default());
        let om = OrderLifecycleManager::new(venue.clone());
        let sym = Symbol::new("TSLA");

        let resp = om.insert_order(&sym, 180.25, 6.0, Side::Buy, OrderKind::Ioc).await;
        assert!(resp.success());
        assert_eq!(resp.order_id.as_deref(), Some("order-1"));
        assert!(resp.error_reason().is_none());
        assert_eq!(om.order_record(&sym).unwrap().id, "order-1");

        let sent = venue.last_submitted().unwrap();
        assert_eq!(sent.side, Side::Buy);
        assert_eq!(sent.quantity, 6.0);
        assert_eq!(sent.price, 180.25);
        assert!(!sent.client_order_id.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_not_recorded() {
        let venue = Arc::new(MockVenue::default());
        venue.push_response(Err(Error::VenueRejection {
            status: 403,
            reason: "insufficient qty available for order".into(),
        }));
        let om = OrderLifecycleManager::new(venue.clone());
        let sym = Symbol::new("AAPL");

        let resp = om.insert_order(&sym, 170.0, 5.0, Side::Sell, OrderKind::Limit).await;
        assert!(!resp.success());
        assert_eq!(resp.error.as_ref().unwrap().kind(), ErrorKind::VenueRejection);
        assert!(resp.error_reason().unwrap().contains("insufficient qty"));
        assert!(om.order_record(&sym).is_none());
        assert!(om.last_order_terminal(&sym));
    }

    #[tokio::test]
    async fn test_last_order_terminal_follows_status() {
        let venue = Arc::new(MockVenue::default());
        let om = OrderLifecycleManager::new(venue);
        let sym = Symbol::new("NVDA");

        assert!(om.last_order_terminal(&sym));

        om.insert_order(&sym, 800.0, 1.0, Side::Buy, OrderKind::Ioc).await;
        // Submitted but nothing heard yet: permissive
        assert!(om.last_order_terminal(&sym));

        om.record_status(status("NVDA", "order-1", "new"));
        assert!(!om.last_order_terminal(&sym));
        om.record_status(status("NVDA", "order-1", "partial_fill"));
        assert!(!om.last_order_terminal(&sym));
        om.record_status(status("NVDA", "order-1", "canceled"));
        assert!(om.last_order_terminal(&sym));
        assert_eq!(
            om.order_status(&sym, "order-1").unwrap().event,
            OrderEvent::Canceled
        );
    }

    #[tokio::test]
    async fn test_status_for_other_order_is_ignored() {
        let venue = Arc::new(MockVenue::default());
        let om = OrderLifecycleManager::new(venue);
        let sym = Symbol::new("TSLA");
        om.insert_order(&sym, 1.0, 1.0, Side::Buy, OrderKind::Ioc).await;
        om.record_status(status("TSLA", "order-1", "new"));
        om.record_status(status("TSLA", "someone-else", "fill"));
        assert!(!om.last_order_terminal(&sym));
    }

    #[tokio::test]
    async fn test_close_all_records_successful_closes() {
        let venue = Arc::new(MockVenue::default());
        venue.set_close_all(vec![
            CloseResult {
                symbol: Symbol::new("TSLA"),
                status: 200,
                order_id: Some("close-tsla".into()),
                body: serde_json::json!({"id": "close-tsla"}),
            },
            CloseResult {
                symbol: Symbol::new("AAPL"),
                status: 403,
                order_id: None,
                body: serde_json::json!({"message": "forbidden"}),
            },
        ]);
        let om = OrderLifecycleManager::new(venue.clone());
        om.close_all_positions(true).await;

        assert_eq!(om.order_record(&Symbol::new("TSLA")).unwrap().id, "close-tsla");
        assert!(om.order_record(&Symbol::new("AAPL")).is_none());

        om.close_position(&Symbol::new("TSLA"), CloseAmount::Percentage(50.0)).await;
        assert_eq!(venue.closes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_ack_symbol_is_used_for_record() {
        let venue = Arc::new(MockVenue::default());
        venue.push_response(Ok(OrderAck {
            id: "abc".into(),
            symbol: Symbol::new("TSLA"),
        }));
        let om = OrderLifecycleManager::new(venue);
        om.insert_order(&Symbol::new("tsla"), 1.0, 1.0, Side::Buy, OrderKind::Ioc).await;
        assert_eq!(om.order_record(&Symbol::new("TSLA")).unwrap().id, "abc");
    }
}
