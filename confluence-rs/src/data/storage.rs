//! In-memory bar and quote storage

use crate::data::{Candle, CandleSeries, MarketDataFeed, Quote, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// In-memory market data feed.
///
/// Holds complete histories and exposes them through a movable clock: only
/// bars that have closed at the clock time are visible. Without a clock every
/// stored bar is visible.
#[derive(Debug, Default)]
pub struct InMemoryFeed {
    /// Store candles by symbol and timeframe
    candles: HashMap<(String, Timeframe), CandleSeries>,
    quotes: HashMap<String, Quote>,
    clock: Option<DateTime<Utc>>,
}

impl InMemoryFeed {
    /// Create new storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candle, replacing any bar with the same open time
    pub fn add_candle(&mut self, candle: Candle) {
        let key = (candle.symbol.clone(), candle.timeframe);
        self.candles.entry(key).or_default().upsert(candle);
    }

    /// Add multiple candles
    pub fn add_candles(&mut self, candles: impl IntoIterator<Item = Candle>) {
        for candle in candles {
            self.add_candle(candle);
        }
    }

    /// Get every stored candle for symbol and timeframe, ignoring the clock
    pub fn get_candles(&self, symbol: &str, timeframe: Timeframe) -> Option<&[Candle]> {
        self.candles
            .get(&(symbol.to_string(), timeframe))
            .map(|s| s.candles())
    }

    pub fn set_quote(&mut self, symbol: &str, quote: Quote) {
        self.quotes.insert(symbol.to_string(), quote);
    }

    pub fn clear_quote(&mut self, symbol: &str) {
        self.quotes.remove(symbol);
    }

    /// Move the visibility clock
    pub fn set_clock(&mut self, now: DateTime<Utc>) {
        self.clock = Some(now);
    }

    pub fn clock(&self) -> Option<DateTime<Utc>> {
        self.clock
    }

    /// Clear all data
    pub fn clear(&mut self) {
        self.candles.clear();
        self.quotes.clear();
        self.clock = None;
    }

    /// Get number of stored candles
    pub fn len(&self) -> usize {
        self.candles.values().map(|s| s.len()).sum()
    }

    /// Check if storage is empty
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

impl MarketDataFeed for InMemoryFeed {
    fn bars(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Option<Vec<Candle>> {
        let series = self.candles.get(&(symbol.to_string(), timeframe))?;
        let visible = match self.clock {
            Some(now) => series.closed_until(now, count),
            None => {
                let all = series.candles();
                &all[all.len().saturating_sub(count)..]
            }
        };
        if visible.is_empty() {
            None
        } else {
            Some(visible.to_vec())
        }
    }

    fn bid_ask(&self, symbol: &str) -> Option<Quote> {
        self.quotes.get(symbol).copied()
    }
}

/// Aggregate `base` bars into `timeframe` bars.
///
/// Input must be oldest first and of a shorter timeframe; buckets follow
/// [`Timeframe::bar_open`]. A trailing bucket is kept even if incomplete, so
/// callers relying on closed bars must filter by time.
pub fn resample(base: &[Candle], timeframe: Timeframe) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::new();
    for candle in base {
        let open_time = timeframe.bar_open(candle.timestamp);
        match out.last_mut() {
            Some(bar) if bar.timestamp == open_time => {
                bar.high = bar.high.max(candle.high);
                bar.low = bar.low.min(candle.low);
                bar.close = candle.close;
                bar.volume += candle.volume;
            }
            _ => out.push(Candle::new(
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
                open_time,
                candle.symbol.clone(),
                timeframe,
            )),
        }
    }
    out
}
