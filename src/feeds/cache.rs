//! Market data cache - last values and history per symbol
//!
//! Pure in-memory projection of the live feed. Writers are the feed router;
//! decision engines only read. Unseen symbols read as `None`.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

use crate::core::{Bar, Quote, Symbol, Trade};

#[derive(Debug, Default)]
struct SymbolData {
    last_trade_price: Option<f64>,
    trades: VecDeque<Trade>,
    last_quote: Option<Quote>,
    mid_price: Option<f64>,
    last_bar: Option<Bar>,
    /// Unbounded: the decision loop detects new bars by history length.
    bars: Vec<Bar>,
}

pub struct MarketDataCache {
    max_trade_history: usize,
    symbols: RwLock<HashMap<Symbol, SymbolData>>,
}

impl MarketDataCache {
    pub fn new(max_trade_history: usize) -> Self {
        Self {
            max_trade_history,
            symbols: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_trade_history(&self) -> usize {
        self.max_trade_history
    }

    /// Append to the trade ring buffer, evicting the oldest prints past capacity.
    pub fn record_trade(&self, symbol: &Symbol, trade: Trade) {
        let mut symbols = self.symbols.write();
        let data = symbols.entry(symbol.clone()).or_default();
        data.last_trade_price = Some(trade.price);
        data.trades.push_back(trade);
        while data.trades.len() > self.max_trade_history {
            data.trades.pop_front();
        }
    }

    /// Store the quote; the mid only moves when both sides are present.
    pub fn record_quote(&self, symbol: &Symbol, quote: Quote) {
        let mut symbols = self.symbols.write();
        let data = symbols.entry(symbol.clone()).or_default();
        data.last_quote = Some(quote);
        if let Some(mid) = quote.mid() {
            data.mid_price = Some(mid);
        }
    }

    pub fn record_bar(&self, symbol: &Symbol, bar: Bar) {
        let mut symbols = self.symbols.write();
        let data = symbols.entry(symbol.clone()).or_default();
        data.last_bar = Some(bar);
        data.bars.push(bar);
    }

    pub fn last_trade_price(&self, symbol: &Symbol) -> Option<f64> {
        self.symbols.read().get(symbol)?.last_trade_price
    }

    /// Oldest first
    pub fn trade_history(&self, symbol: &Symbol) -> Option<Vec<Trade>> {
        let symbols = self.symbols.read();
        let data = symbols.get(symbol)?;
        if data.trades.is_empty() {
            return None;
        }
        Some(data.trades.iter().copied().collect())
    }

    pub fn last_quote(&self, symbol: &Symbol) -> Option<Quote> {
        self.symbols.read().get(symbol)?.last_quote
    }

    pub fn mid_price(&self, symbol: &Symbol) -> Option<f64> {
        self.symbols.read().get(symbol)?.mid_price
    }

    pub fn last_bar(&self, symbol: &Symbol) -> Option<Bar> {
        self.symbols.read().get(symbol)?.last_bar
    }

    /// Copy of the full bar history. Prefer `bar_count` + `last_bar` on hot paths.
    pub fn bar_history(&self, symbol: &Symbol) -> Option<Vec<Bar>> {
        let symbols = self.symbols.read();
        let data = symbols.get(symbol)?;
        if data.bars.is_empty() {
            return None;
        }
        Some(data.bars.clone())
    }

    /// Number of bars received, `None` before the first one.
    pub fn bar_count(&self, symbol: &Symbol) -> Option<usize> {
        let symbols = self.symbols.read();
        let n = symbols.get(symbol)?.bars.len();
        (n > 0).then_some(n)
    }

    /// Bar count and newest bar read under one lock.
    pub fn bar_state(&self, symbol: &Symbol) -> Option<(usize, Bar)> {
        let symbols = self.symbols.read();
        let data = symbols.get(symbol)?;
        Some((data.bars.len(), *data.bars.last()?))
    }
}
