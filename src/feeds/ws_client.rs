//! WebSocket clients for market data and trade updates
//!
//! Each client runs sessions under a reconnect supervisor: connect,
//! authenticate, subscribe, then push decoded events into the feed channel.
//! A dropped socket is re-dialled with exponential backoff until the attempt
//! budget runs out. A closed feed channel ends the client for good.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::core::{Credentials, Error, FeedEvent, Result, Symbol};
use crate::feeds::messages::{StreamMessage, decode_data_frame, decode_trading_frame};

/// What the session loop should do after a frame
#[derive(Debug, Default, PartialEq)]
struct FrameOutcome {
    replies: Vec<String>,
    stop: bool,
}

/// Why a session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Server closed the socket or the stream ran dry
    SocketClosed,
    /// Every feed receiver is gone
    ReceiverGone,
}

/// Frames seen by one session and how it ended
#[derive(Debug)]
struct SessionReport {
    frames: u64,
    result: Result<SessionEnd>,
}

/// Backoff for re-dialling a dropped stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive failed sessions tolerated before giving up
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// `base * 2^(attempt-1)`, capped at `max_delay`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Re-enter `session` until the feed channel closes or the attempt budget is
/// spent. A session that delivered frames resets the attempt counter.
async fn supervise<F, Fut>(
    name: &str,
    policy: &ReconnectPolicy,
    tx: &flume::Sender<FeedEvent>,
    mut session: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SessionReport>,
{
    let mut attempts = 0u32;
    loop {
        let report = session().await;
        if report.frames > 0 {
            attempts = 0;
        }
        match report.result {
            Ok(SessionEnd::ReceiverGone) => return Ok(()),
            Ok(SessionEnd::SocketClosed) => warn!("{} stream closed", name),
            Err(e) => warn!("{} stream failed: {}", name, e),
        }
        if tx.is_disconnected() {
            info!("{} feed channel closed, not reconnecting", name);
            return Ok(());
        }

        attempts += 1;
        if attempts > policy.max_attempts {
            error!("{} stream: {} reconnect attempts exhausted", name, policy.max_attempts);
            return Err(Error::WebSocket(format!(
                "{} stream: max reconnect attempts ({}) exceeded",
                name, policy.max_attempts
            )));
        }
        let delay = policy.delay(attempts);
        warn!(
            "Reconnecting {} stream (attempt {}/{}) in {:?}...",
            name, attempts, policy.max_attempts, delay
        );
        tokio::time::sleep(delay).await;
    }
}

/// One session: connect, send `hello`, then feed every text/binary frame to `on_frame`.
async fn run_session<F>(name: &str, url: &str, hello: String, on_frame: F) -> SessionReport
where
    F: FnMut(&str) -> Result<FrameOutcome>,
{
    let mut frames = 0;
    let result = session_loop(name, url, hello, on_frame, &mut frames).await;
    SessionReport { frames, result }
}

async fn session_loop<F>(
    name: &str,
    url: &str,
    hello: String,
    mut on_frame: F,
    frames: &mut u64,
) -> Result<SessionEnd>
where
    F: FnMut(&str) -> Result<FrameOutcome>,
{
    info!("Connecting to {} stream: {}", name, url);
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;
    info!("Connected to {} stream", name);

    let (mut write, mut read) = ws_stream.split();
    write
        .send(Message::Text(hello))
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;

    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!("{}: non-utf8 binary frame: {}", name, e);
                    continue;
                }
            },
            Ok(Message::Ping(data)) => {
                write
                    .send(Message::Pong(data))
                    .await
                    .map_err(|e| Error::WebSocket(e.to_string()))?;
                continue;
            }
            Ok(Message::Close(_)) => {
                info!("{} stream closed by server", name);
                return Ok(SessionEnd::SocketClosed);
            }
            Ok(_) => continue,
            Err(e) => {
                error!("{} stream error: {}", name, e);
                return Err(Error::WebSocket(e.to_string()));
            }
        };
        *frames += 1;

        let outcome = on_frame(&text)?;
        for reply in outcome.replies {
            write
                .send(Message::Text(reply))
                .await
                .map_err(|e| Error::WebSocket(e.to_string()))?;
        }
        if outcome.stop {
            info!("{} feed channel closed, leaving stream", name);
            return Ok(SessionEnd::ReceiverGone);
        }
    }

    Ok(SessionEnd::SocketClosed)
}

/// Forward decoded messages; `on_success` maps control acks to replies.
fn dispatch(
    name: &str,
    messages: Vec<StreamMessage>,
    tx: &flume::Sender<FeedEvent>,
    on_success: impl Fn(&str) -> Option<String>,
) -> Result<FrameOutcome> {
    let mut outcome = FrameOutcome::default();
    for msg in messages {
        match msg {
            StreamMessage::Event(event) => {
                if tx.send(event).is_err() {
                    outcome.stop = true;
                    break;
                }
            }
            StreamMessage::Success(ack) => {
                info!("{}: {}", name, ack);
                if let Some(reply) = on_success(&ack) {
                    outcome.replies.push(reply);
                }
            }
            StreamMessage::Error { code, msg } => {
                return Err(Error::WebSocket(format!("{} error {}: {}", name, code, msg)));
            }
            StreamMessage::Subscribed => info!("{}: subscription confirmed", name),
            StreamMessage::Ignored => {}
        }
    }
    Ok(outcome)
}

/// Trades, quotes and bars for a fixed symbol set
pub struct MarketDataStream {
    url: String,
    credentials: Credentials,
    symbols: Vec<Symbol>,
    reconnect: ReconnectPolicy,
}

impl MarketDataStream {
    pub fn new(url: impl Into<String>, credentials: Credentials, symbols: Vec<Symbol>) -> Self {
        Self {
            url: url.into(),
            credentials,
            symbols,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    fn auth_message(&self) -> String {
        json!({
            "action": "auth",
            "key": self.credentials.key_id,
            "secret": self.credentials.secret_key,
        })
        .to_string()
    }

    fn subscribe_message(&self) -> String {
        let symbols: Vec<&str> = self.symbols.iter().map(Symbol::as_str).collect();
        json!({
            "action": "subscribe",
            "trades": symbols,
            "quotes": symbols,
            "bars": symbols,
        })
        .to_string()
    }

    fn handle_frame(&self, text: &str, tx: &flume::Sender<FeedEvent>) -> Result<FrameOutcome> {
        let messages = match decode_data_frame(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to decode market data frame: {}", e);
                debug!("Frame: {}", text);
                return Ok(FrameOutcome::default());
            }
        };
        dispatch("market data", messages, tx, |ack| {
            (ack == "authenticated").then(|| self.subscribe_message())
        })
    }

    /// Run until every receiver is dropped or reconnects are exhausted
    pub async fn run(&self, tx: flume::Sender<FeedEvent>) -> Result<()> {
        let tx = &tx;
        supervise("market data", &self.reconnect, tx, move || {
            run_session("market data", &self.url, self.auth_message(), move |text| {
                self.handle_frame(text, tx)
            })
        })
        .await
    }
}

/// Order lifecycle events for the account
pub struct TradeUpdateStream {
    url: String,
    credentials: Credentials,
    reconnect: ReconnectPolicy,
}

impl TradeUpdateStream {
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    fn auth_message(&self) -> String {
        json!({
            "action": "authenticate",
            "data": {
                "key_id": self.credentials.key_id,
                "secret_key": self.credentials.secret_key,
            },
        })
        .to_string()
    }

    fn listen_message() -> String {
        json!({
            "action": "listen",
            "data": { "streams": ["trade_updates"] },
        })
        .to_string()
    }

    fn handle_frame(&self, text: &str, tx: &flume::Sender<FeedEvent>) -> Result<FrameOutcome> {
        let message = match decode_trading_frame(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to decode trade update frame: {}", e);
                debug!("Frame: {}", text);
                return Ok(FrameOutcome::default());
            }
        };
        dispatch("trade updates", vec![message], tx, |ack| {
            (ack == "authorized").then(Self::listen_message)
        })
    }

    pub async fn run(&self, tx: flume::Sender<FeedEvent>) -> Result<()> {
        let tx = &tx;
        supervise("trade updates", &self.reconnect, tx, move || {
            run_session("trade updates", &self.url, self.auth_message(), move |text| {
                self.handle_frame(text, tx)
            })
        })
        .await
    }
}
