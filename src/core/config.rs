//! Configuration - Type-safe, validated config
//!
//! Loaded from a TOML file. Credentials are kept out of the file and passed
//! to each component explicitly at construction.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::core::{Error, Result, Symbol};

pub const KEY_ID_HEADER: &str = "APCA-API-KEY-ID";
pub const SECRET_KEY_HEADER: &str = "APCA-API-SECRET-KEY";

/// Upper bound for a decision loop poll interval (one day)
pub const MAX_POLL_INTERVAL_SECS: f64 = 86_400.0;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Venue endpoints
    #[serde(default)]
    pub venue: VenueConfig,

    /// Market data settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Process-level behaviour
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// One decision engine per entry
    pub symbols: Vec<SymbolConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// REST base URL (paper or live)
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// Market data WebSocket
    #[serde(default = "default_data_stream_url")]
    pub data_stream_url: String,

    /// Trade-update WebSocket
    #[serde(default = "default_trading_stream_url")]
    pub trading_stream_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Trade ring buffer capacity per symbol
    #[serde(default = "default_max_trade_history")]
    pub max_trade_history: usize,

    /// Consecutive failed stream sessions before a stream gives up
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Re-fetch the position snapshot every N seconds (disabled when absent)
    #[serde(default)]
    pub position_refresh_secs: Option<u64>,

    /// Close every position (and cancel open orders) on Ctrl-C
    #[serde(default)]
    pub flatten_on_shutdown: bool,
}

/// Per-symbol decision engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,

    /// Serialized regime model
    pub model_path: String,

    /// Position cap in shares
    #[serde(default = "default_max_position")]
    pub max_position: u32,

    /// Whether the engine may open short positions
    #[serde(default = "default_shortable")]
    pub shortable: bool,

    /// Decision loop poll interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
}

fn default_rest_url() -> String {
    "https://paper-api.alpaca.markets".to_string()
}
fn default_data_stream_url() -> String {
    "wss://stream.data.alpaca.markets/v2/iex".to_string()
}
fn default_trading_stream_url() -> String {
    "wss://paper-api.alpaca.markets/stream".to_string()
}
fn default_max_trade_history() -> usize {
    100
}
fn default_reconnect_attempts() -> u32 {
    10
}
fn default_max_position() -> u32 {
    10
}
fn default_shortable() -> bool {
    true
}
fn default_poll_interval() -> f64 {
    1.0
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            data_stream_url: default_data_stream_url(),
            trading_stream_url: default_trading_stream_url(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_trade_history: default_max_trade_history(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }
}

impl SymbolConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }
}

impl AppConfig {
    /// Load and validate from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(Error::Config("at least one [[symbols]] entry is required".into()));
        }
        if self.feed.max_trade_history == 0 {
            return Err(Error::Config("feed.max_trade_history must be positive".into()));
        }
        let mut seen = HashSet::new();
        for s in &self.symbols {
            let symbol = s.symbol();
            if symbol.as_str().is_empty() {
                return Err(Error::Config("symbol must not be empty".into()));
            }
            if !seen.insert(symbol.clone()) {
                return Err(Error::Config(format!("duplicate symbol {}", symbol)));
            }
            if s.max_position == 0 {
                return Err(Error::Config(format!("{}: max_position must be positive", symbol)));
            }
            if !(s.poll_interval_secs > 0.0 && s.poll_interval_secs <= MAX_POLL_INTERVAL_SECS) {
                return Err(Error::Config(format!(
                    "{}: poll_interval_secs must be in (0, {}]",
                    symbol, MAX_POLL_INTERVAL_SECS
                )));
            }
        }
        Ok(())
    }

    /// Symbols in configuration order
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(SymbolConfig::symbol).collect()
    }
}

/// API credentials, passed explicitly to the venue and stream clients
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(rename = "APCA-API-KEY-ID")]
    pub key_id: String,
    #[serde(rename = "APCA-API-SECRET-KEY")]
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Read `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY`
    pub fn from_env() -> Result<Self> {
        let key_id = std::env::var("APCA_API_KEY_ID")
            .map_err(|_| Error::Config("APCA_API_KEY_ID is not set".into()))?;
        let secret_key = std::env::var("APCA_API_SECRET_KEY")
            .map_err(|_| Error::Config("APCA_API_SECRET_KEY is not set".into()))?;
        Ok(Self::new(key_id, secret_key))
    }

    /// JSON object of request headers, e.g.
    /// `{"APCA-API-KEY-ID": "...", "APCA-API-SECRET-KEY": "..."}`
    pub fn from_headers_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_headers_json(&content)
    }

    pub fn from_headers_json(content: &str) -> Result<Self> {
        let creds: Credentials = serde_json::from_str(content)?;
        if creds.key_id.is_empty() || creds.secret_key.is_empty() {
            return Err(Error::Config("credentials file has empty key".into()));
        }
        Ok(creds)
    }
}
