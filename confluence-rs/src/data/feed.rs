//! Market data feed abstraction

use crate::data::{Candle, Timeframe};
use crate::strategy::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top of book for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

impl Quote {
    pub fn new(bid: f64, ask: f64, time: DateTime<Utc>) -> Self {
        Self { bid, ask, time }
    }

    /// Mid price
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// Price a new position in `direction` would fill at
    pub fn entry_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.ask,
            Direction::Short => self.bid,
        }
    }

    /// Price an existing position in `direction` would be closed at
    pub fn exit_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.bid,
            Direction::Short => self.ask,
        }
    }
}

/// Read-only access to bars and quotes.
///
/// `bars` returns only closed bars, oldest first, and at most `count` of them.
/// `None` means the feed has nothing for the symbol and timeframe; callers
/// skip their work for the tick instead of failing.
pub trait MarketDataFeed {
    fn bars(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Option<Vec<Candle>>;

    fn bid_ask(&self, symbol: &str) -> Option<Quote>;

    /// Open time of the most recent closed bar
    fn latest_bar_time(&self, symbol: &str, timeframe: Timeframe) -> Option<DateTime<Utc>> {
        self.bars(symbol, timeframe, 1)
            .and_then(|bars| bars.last().map(|c| c.timestamp))
    }
}

impl<F: MarketDataFeed + ?Sized> MarketDataFeed for &F {
    fn bars(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Option<Vec<Candle>> {
        (**self).bars(symbol, timeframe, count)
    }

    fn bid_ask(&self, symbol: &str) -> Option<Quote> {
        (**self).bid_ask(symbol)
    }

    fn latest_bar_time(&self, symbol: &str, timeframe: Timeframe) -> Option<DateTime<Utc>> {
        (**self).latest_bar_time(symbol, timeframe)
    }
}

/// Remembers the last closed bar seen per timeframe so bar-driven work runs
/// once per bar.
#[derive(Debug, Clone, Default)]
pub struct NewBarGate {
    last_seen: HashMap<Timeframe, DateTime<Utc>>,
}

impl NewBarGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `latest` is newer than what was last seen for `timeframe`.
    /// Records it as seen.
    pub fn is_new_bar(&mut self, timeframe: Timeframe, latest: Option<DateTime<Utc>>) -> bool {
        let Some(latest) = latest else {
            return false;
        };
        match self.last_seen.get(&timeframe) {
            Some(seen) if *seen >= latest => false,
            _ => {
                self.last_seen.insert(timeframe, latest);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_seen.clear();
    }
}
