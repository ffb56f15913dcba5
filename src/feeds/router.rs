//! Feed router - single writer for the cache, ledger and order status table
//!
//! Stream clients push typed events into one channel; this task drains it and
//! applies each event in arrival order.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::{FeedEvent, OrderStatusEvent};
use crate::execution::{OrderLifecycleManager, PositionLedger};
use crate::feeds::MarketDataCache;

pub struct FeedRouter {
    cache: Arc<MarketDataCache>,
    ledger: Arc<PositionLedger>,
    orders: Arc<OrderLifecycleManager>,
}

impl FeedRouter {
    pub fn new(
        cache: Arc<MarketDataCache>,
        ledger: Arc<PositionLedger>,
        orders: Arc<OrderLifecycleManager>,
    ) -> Self {
        Self {
            cache,
            ledger,
            orders,
        }
    }

    pub fn apply(&self, event: FeedEvent) {
        match event {
            FeedEvent::Trade(symbol, trade) => self.cache.record_trade(&symbol, trade),
            FeedEvent::Quote(symbol, quote) => self.cache.record_quote(&symbol, quote),
            FeedEvent::Bar(symbol, bar) => {
                debug!("Bar {} close={} at {}", symbol, bar.close, bar.timestamp);
                self.cache.record_bar(&symbol, bar);
            }
            FeedEvent::OrderUpdate(update) => self.apply_order_update(update),
        }
    }

    fn apply_order_update(&self, update: OrderStatusEvent) {
        info!(
            "Trade update {} {} order {}",
            update.symbol, update.event, update.order_id
        );
        if update.event.is_fill() {
            match update.position_qty {
                Some(qty) => self.ledger.apply_fill(&update.symbol, qty),
                None => warn!(
                    "{} event for {} without position_qty",
                    update.event, update.symbol
                ),
            }
        }
        self.orders.record_status(update);
    }

    /// Drain the channel until every sender is gone
    pub async fn run(&self, rx: flume::Receiver<FeedEvent>) {
        while let Ok(event) = rx.recv_async().await {
            self.apply(event);
        }
        info!("Feed channel closed, router stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Bar, OrderEvent, OrderKind, Quote, Side, Symbol, Trade};
    use crate::execution::testing::MockVenue;
    use chrono::Utc;

    fn router() -> (FeedRouter, Arc<MarketDataCache>, Arc<PositionLedger>, Arc<OrderLifecycleManager>) {
        let venue = Arc::new(MockVenue::default());
        let cache = Arc::new(MarketDataCache::new(10));
        let ledger = Arc::new(PositionLedger::new(venue.clone()));
        let orders = Arc::new(OrderLifecycleManager::new(venue));
        (
            FeedRouter::new(cache.clone(), ledger.clone(), orders.clone()),
            cache,
            ledger,
            orders,
        )
    }

    fn update(event: &str, qty: Option<f64>) -> FeedEvent {
        FeedEvent::OrderUpdate(OrderStatusEvent {
            symbol: Symbol::new("TSLA"),
            order_id: "order-1".into(),
            event: OrderEvent::parse(event),
            position_qty: qty,
            timestamp: None,
        })
    }

    #[test]
    fn test_market_events_reach_cache() {
        let (router, cache, _, _) = router();
        let sym = Symbol::new("TSLA");
        let now = Utc::now();
        router.apply(FeedEvent::Trade(sym.clone(), Trade { price: 180.0, size: 5.0, timestamp: now }));
        router.apply(FeedEvent::Quote(
            sym.clone(),
            Quote { bid: 179.9, ask: 180.1, bid_size: 1.0, ask_size: 1.0, timestamp: now },
        ));
        router.apply(FeedEvent::Bar(
            sym.clone(),
            Bar { open: 179.0, high: 181.0, low: 178.5, close: 180.0, volume: 900.0, timestamp: now },
        ));
        assert_eq!(cache.last_trade_price(&sym), Some(180.0));
        assert_eq!(cache.mid_price(&sym), Some(180.0));
        assert_eq!(cache.bar_count(&sym), Some(1));
    }

    #[tokio::test]
    async fn test_fills_replace_position_and_update_status() {
        let (router, _, ledger, orders) = router();
        let sym = Symbol::new("TSLA");
        orders.insert_order(&sym, 180.0, 10.0, Side::Buy, OrderKind::Ioc).await;

        router.apply(update("new", None));
        assert_eq!(ledger.quantity(&sym), 0.0);
        assert!(!orders.last_order_terminal(&sym));

        router.apply(update("partial_fill", Some(4.0)));
        assert_eq!(ledger.quantity(&sym), 4.0);
        assert!(!orders.last_order_terminal(&sym));

        router.apply(update("fill", Some(10.0)));
        assert_eq!(ledger.quantity(&sym), 10.0);
        assert!(orders.last_order_terminal(&sym));
    }

    #[tokio::test]
    async fn test_run_drains_until_senders_drop() {
        let (router, cache, _, _) = router();
        let (tx, rx) = flume::unbounded();
        let sym = Symbol::new("AAPL");
        for i in 0..3 {
            tx.send(FeedEvent::Trade(
                sym.clone(),
                Trade { price: 170.0 + i as f64, size: 1.0, timestamp: Utc::now() },
            ))
            .unwrap();
        }
        drop(tx);
        router.run(rx).await;
        assert_eq!(cache.trade_history(&sym).unwrap().len(), 3);
        assert_eq!(cache.last_trade_price(&sym), Some(172.0));
    }
}
