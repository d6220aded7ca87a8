//! Liquidity sweep model
//!
//! Swing highs and lows mark resting liquidity. A wick through a level with a
//! close back inside, on the same bar or within a few bars, is a sweep: the
//! level is tested once and then confirms signals reacting away from it. Untested levels close to entry on the path
//! of the trade block the signal.

use crate::config::{LiquidityConfig, PatternConfig};
use crate::data::{Candle, MarketDataFeed, NewBarGate};
use crate::patterns::extrema::swing_points;
use crate::patterns::levels::{CandidateLevel, LevelBook};
use crate::patterns::PatternDetector;
use crate::strategy::{Direction, EntrySignal};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Recent sweep on the reaction side, close enough to entry
fn confirms(config: &LiquidityConfig, level: &CandidateLevel, signal: &EntrySignal) -> bool {
    let max_age = Duration::hours(config.max_sweep_age_hours);
    level.is_available()
        && level.bias == signal.direction
        && level
            .tested_at
            .map_or(false, |t| signal.timestamp - t <= max_age)
        && signal.direction.is_beyond(signal.entry_price, level.price)
        && level.distance_ratio(signal.entry_price) <= config.proximity_band
}

pub struct LiquidityZones {
    config: LiquidityConfig,
    levels: LevelBook<CandidateLevel>,
    gate: NewBarGate,
}

impl LiquidityZones {
    pub fn new(config: LiquidityConfig, patterns: &PatternConfig) -> Self {
        Self {
            config,
            levels: LevelBook::new(patterns.capacity, Duration::hours(patterns.retention_hours)),
            gate: NewBarGate::new(),
        }
    }

    pub fn levels(&self) -> &LevelBook<CandidateLevel> {
        &self.levels
    }

    /// Walk bars after each live level and record sweeps and breaks.
    ///
    /// A close beyond an untested level opens a reversal window; a close back
    /// inside within `reversal_bars` makes it a sweep, otherwise the level is
    /// broken. A close beyond a level already swept breaks it at once.
    fn track_sweeps(&mut self, bars: &[Candle]) {
        let tolerance = self.config.sweep_tolerance;
        let window = self.config.reversal_bars;
        for level in self.levels.iter_mut().filter(|l| l.is_available()) {
            let since = level.tested_at.unwrap_or(level.origin_time);
            let mut pierced_at: Option<usize> = None;
            for (idx, bar) in bars.iter().enumerate().filter(|(_, b)| b.timestamp > since) {
                // a swing high expects a short reaction, liquidity sits above it
                let (pierced, closed_beyond) = match level.bias {
                    Direction::Short => (
                        bar.high > level.price * (1.0 + tolerance),
                        bar.close > level.price,
                    ),
                    Direction::Long => (
                        bar.low < level.price * (1.0 - tolerance),
                        bar.close < level.price,
                    ),
                };

                if let Some(start) = pierced_at {
                    if !closed_beyond {
                        pierced_at = None;
                        if level.mark_tested(bar.timestamp) {
                            debug!(
                                price = level.price,
                                bias = %level.bias,
                                bars = idx - start,
                                "liquidity swept, reclaimed"
                            );
                        }
                    } else if idx - start >= window {
                        level.consume();
                        break;
                    }
                    continue;
                }

                if closed_beyond {
                    if level.is_tested() || window == 0 {
                        level.consume();
                        break;
                    }
                    pierced_at = Some(idx);
                    continue;
                }
                if pierced && level.mark_tested(bar.timestamp) {
                    debug!(
                        price = level.price,
                        bias = %level.bias,
                        at = %bar.timestamp,
                        "liquidity swept"
                    );
                }
            }
        }
    }

    /// Untested liquidity close to entry in the direction of the trade
    fn conflicting_level(&self, signal: &EntrySignal) -> Option<&CandidateLevel> {
        let opposing = signal.direction.opposite();
        self.levels.iter().find(|l| {
            l.is_available()
                && !l.is_tested()
                && l.bias == opposing
                && signal.direction.is_beyond(l.price, signal.entry_price)
                && l.distance_ratio(signal.entry_price) <= self.config.near_band
        })
    }
}

impl PatternDetector for LiquidityZones {
    fn name(&self) -> &'static str {
        "liquidity"
    }

    fn rescan(&mut self, feed: &dyn MarketDataFeed, symbol: &str, now: DateTime<Utc>) {
        let latest = feed.latest_bar_time(symbol, self.config.timeframe);
        if self.gate.is_new_bar(self.config.timeframe, latest) {
            if let Some(bars) = feed.bars(symbol, self.config.timeframe, self.config.lookback) {
                for point in swing_points(&bars, self.config.order) {
                    self.levels
                        .insert(CandidateLevel::new(point.price, point.time, point.kind.bias()));
                }
                self.track_sweeps(&bars);
            }
        }
        self.levels.prune(now);
    }

    fn validate(&self, signal: &EntrySignal) -> bool {
        if let Some(level) = self.conflicting_level(signal) {
            debug!(
                level = level.price,
                entry = signal.entry_price,
                "unswept opposing liquidity in the path of the trade"
            );
            return false;
        }
        self.levels
            .iter()
            .any(|l| confirms(&self.config, l, signal))
    }

    fn commit(&mut self, signal: &EntrySignal) {
        let config = &self.config;
        if let Some(level) = self
            .levels
            .iter_mut()
            .rev()
            .find(|l| confirms(config, l, signal))
        {
            debug!(price = level.price, "swept level used");
            level.consume();
        }
    }

    fn candidate_count(&self) -> usize {
        self.levels.iter().filter(|l| l.is_available()).count()
    }
}
