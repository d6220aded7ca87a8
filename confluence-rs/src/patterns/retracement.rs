//! Retracement model
//!
//! Measures the most recent swing and accepts entries that pull back into the
//! 0.5 to 0.618 band of it.

use crate::config::{PatternConfig, RetracementConfig};
use crate::data::{Candle, MarketDataFeed, NewBarGate};
use crate::patterns::extrema::{swing_points, ExtremumKind, SwingPoint};
use crate::patterns::levels::{Anchored, LevelBook};
use crate::patterns::PatternDetector;
use crate::strategy::{Direction, EntrySignal};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

pub const RETRACEMENT_RATIOS: [f64; 6] = [0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

const BAND: (f64, f64) = (0.5, 0.618);

/// Swing between the latest high and low, oriented by which came last
#[derive(Debug, Clone, PartialEq)]
pub struct RetracementSwing {
    pub high: f64,
    pub low: f64,
    pub high_time: DateTime<Utc>,
    pub low_time: DateTime<Utc>,
    /// Trade direction expected after the pullback
    pub direction: Direction,
    pub consumed: bool,
}

impl RetracementSwing {
    fn from_points(high: &SwingPoint, low: &SwingPoint) -> Self {
        // low then high is an up-leg, pullbacks are bought
        let direction = if low.time < high.time {
            Direction::Long
        } else {
            Direction::Short
        };
        Self {
            high: high.price,
            low: low.price,
            high_time: high.time,
            low_time: low.time,
            direction,
            consumed: false,
        }
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Price at `ratio` of the way back from the swing end
    pub fn level(&self, ratio: f64) -> f64 {
        match self.direction {
            Direction::Long => self.high - ratio * self.range(),
            Direction::Short => self.low + ratio * self.range(),
        }
    }

    pub fn levels(&self) -> Vec<(f64, f64)> {
        RETRACEMENT_RATIOS
            .iter()
            .map(|&r| (r, self.level(r)))
            .collect()
    }

    /// Lower and upper price bound of the entry band
    pub fn band(&self) -> (f64, f64) {
        let a = self.level(BAND.0);
        let b = self.level(BAND.1);
        (a.min(b), a.max(b))
    }

    /// Unused, same direction, and entry inside the band give or take `tolerance`
    fn admits(&self, signal: &EntrySignal, tolerance: f64) -> bool {
        if self.consumed || self.direction != signal.direction {
            return false;
        }
        let (lower, upper) = self.band();
        let entry = signal.entry_price;
        entry >= lower * (1.0 - tolerance) && entry <= upper * (1.0 + tolerance)
    }

    /// A close past the full retracement voids the swing
    fn is_broken_by(&self, bar: &Candle) -> bool {
        match self.direction {
            Direction::Long => bar.close < self.level(1.0),
            Direction::Short => bar.close > self.level(1.0),
        }
    }
}

impl Anchored for RetracementSwing {
    fn origin_time(&self) -> DateTime<Utc> {
        self.high_time.max(self.low_time)
    }

    fn same_origin(&self, other: &Self) -> bool {
        self.high_time == other.high_time && self.low_time == other.low_time
    }
}

pub struct RetracementLevels {
    config: RetracementConfig,
    swings: LevelBook<RetracementSwing>,
    gate: NewBarGate,
}

impl RetracementLevels {
    pub fn new(config: RetracementConfig, patterns: &PatternConfig) -> Self {
        Self {
            config,
            swings: LevelBook::new(patterns.capacity, Duration::hours(patterns.retention_hours)),
            gate: NewBarGate::new(),
        }
    }

    pub fn current_swing(&self) -> Option<&RetracementSwing> {
        self.swings.newest()
    }
}

impl PatternDetector for RetracementLevels {
    fn name(&self) -> &'static str {
        "retracement"
    }

    fn rescan(&mut self, feed: &dyn MarketDataFeed, symbol: &str, now: DateTime<Utc>) {
        let latest = feed.latest_bar_time(symbol, self.config.timeframe);
        if self.gate.is_new_bar(self.config.timeframe, latest) {
            if let Some(bars) = feed.bars(symbol, self.config.timeframe, self.config.lookback) {
                let points = swing_points(&bars, self.config.order);
                let high = points.iter().rev().find(|p| p.kind == ExtremumKind::High);
                let low = points.iter().rev().find(|p| p.kind == ExtremumKind::Low);
                if let (Some(high), Some(low)) = (high, low) {
                    let swing = RetracementSwing::from_points(high, low);
                    if swing.range() > 0.0 && self.swings.insert(swing) {
                        debug!(symbol, "new retracement swing");
                    }
                }

                for swing in self.swings.iter_mut().filter(|s| !s.consumed) {
                    let origin = swing.origin_time();
                    if bars
                        .iter()
                        .any(|b| b.timestamp > origin && swing.is_broken_by(b))
                    {
                        swing.consumed = true;
                    }
                }
            }
        }
        self.swings.prune(now);
    }

    fn validate(&self, signal: &EntrySignal) -> bool {
        let tolerance = self.config.band_tolerance;
        self.swings
            .newest()
            .map_or(false, |swing| swing.admits(signal, tolerance))
    }

    fn commit(&mut self, signal: &EntrySignal) {
        let tolerance = self.config.band_tolerance;
        if let Some(swing) = self.swings.newest_mut() {
            if swing.admits(signal, tolerance) {
                swing.consumed = true;
            }
        }
    }

    fn candidate_count(&self) -> usize {
        self.swings.iter().filter(|s| !s.consumed).count()
    }
}
