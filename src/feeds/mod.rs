//! Market data feeds - WebSocket ingestion, decoding and the in-memory cache

pub mod cache;
pub mod messages;
pub mod router;
pub mod ws_client;

pub use cache::MarketDataCache;
pub use router::FeedRouter;
pub use ws_client::{MarketDataStream, ReconnectPolicy, TradeUpdateStream};
