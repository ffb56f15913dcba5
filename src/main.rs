use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use regime_tx::core::{AppConfig, Credentials, RegimeOracle, Venue};
use regime_tx::exchanges::Alpaca;
use regime_tx::execution::{OrderLifecycleManager, PositionLedger};
use regime_tx::feeds::{
    FeedRouter, MarketDataCache, MarketDataStream, ReconnectPolicy, TradeUpdateStream,
};
use regime_tx::strategies::{DecisionEngine, GaussianHmmOracle};

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REGIME_TX_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string())
        .into()
}

fn credentials() -> regime_tx::Result<Credentials> {
    match std::env::var("APCA_HEADERS_FILE") {
        Ok(path) => Credentials::from_headers_file(PathBuf::from(path).as_path()),
        Err(_) => Credentials::from_env(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // 1. Logger
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,regime_tx=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!("RegimeTX starting...");

    // 2. Config + credentials
    let path = config_path();
    let config = AppConfig::load(&path)?;
    let creds = credentials()?;
    tracing::info!(
        "Loaded {} ({} symbols, key {})",
        path.display(),
        config.symbols.len(),
        creds.key_id
    );

    // 3. Venue, ledger, cache, order manager
    let venue: Arc<dyn Venue> = Arc::new(Alpaca::new(&config.venue.rest_url, &creds)?);
    let ledger = Arc::new(PositionLedger::create(venue.clone()).await);
    let cache = Arc::new(MarketDataCache::new(config.feed.max_trade_history));
    let orders = Arc::new(OrderLifecycleManager::new(venue.clone()));

    // Models load up front so a bad file stops startup before any stream opens
    let mut engines = Vec::with_capacity(config.symbols.len());
    for symbol_config in &config.symbols {
        let oracle: Arc<dyn RegimeOracle> =
            Arc::new(GaussianHmmOracle::load(&symbol_config.model_path)?);
        engines.push(DecisionEngine::new(
            symbol_config,
            oracle,
            cache.clone(),
            ledger.clone(),
            orders.clone(),
        ));
    }

    // 4. Feed channel: streams -> router
    let (tx, rx) = flume::unbounded();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let router = FeedRouter::new(cache.clone(), ledger.clone(), orders.clone());
    tasks.push(tokio::spawn(async move { router.run(rx).await }));

    let reconnect = ReconnectPolicy::with_max_attempts(config.feed.reconnect_attempts);
    let market = MarketDataStream::new(
        config.venue.data_stream_url.clone(),
        creds.clone(),
        config.symbols(),
    )
    .with_reconnect(reconnect);
    let market_tx = tx.clone();
    let mut market_task = tokio::spawn(async move {
        if let Err(e) = market.run(market_tx).await {
            tracing::error!("Market data stream stopped: {}", e);
        }
    });

    let trade_updates = TradeUpdateStream::new(config.venue.trading_stream_url.clone(), creds)
        .with_reconnect(reconnect);
    let mut trade_task = tokio::spawn(async move {
        if let Err(e) = trade_updates.run(tx).await {
            tracing::error!("Trade update stream stopped: {}", e);
        }
    });

    if let Some(secs) = config.runtime.position_refresh_secs.filter(|s| *s > 0) {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                ledger.refresh_snapshot().await;
            }
        }));
    }

    // 5. One decision engine per symbol
    for engine in engines {
        tasks.push(tokio::spawn(engine.run()));
    }

    tracing::info!("Booted {} tasks. Waiting for market data...", tasks.len() + 2);

    // Engines must not keep trading on a dead feed
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown requested");
        }
        _ = &mut market_task => tracing::error!("Market data stream gave up, shutting down"),
        _ = &mut trade_task => tracing::error!("Trade update stream gave up, shutting down"),
    }

    market_task.abort();
    trade_task.abort();
    for task in &tasks {
        task.abort();
    }

    if config.runtime.flatten_on_shutdown {
        tracing::info!("Flattening all positions");
        orders.close_all_positions(true).await;
    }

    tracing::info!("Final positions: {:?}", ledger.snapshot());
    Ok(())
}
