//! Current versus baseline volatility per instrument

use crate::config::StrategyConfig;
use crate::data::{MarketDataFeed, Timeframe};
use crate::indicators::calculate_atr;
use crate::strategy::Direction;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Stops are never widened by more than this factor
pub const MAX_STOP_WIDENING: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilitySnapshot {
    /// Short-period ATR
    pub current: f64,
    /// Long-period ATR
    pub baseline: f64,
    pub refreshed_at: DateTime<Utc>,
}

impl VolatilitySnapshot {
    pub fn ratio(&self) -> Option<f64> {
        if self.baseline > 0.0 && self.current.is_finite() {
            Some(self.current / self.baseline)
        } else {
            None
        }
    }
}

/// Tracks ATR(current) / ATR(baseline) per symbol.
///
/// Anything missing reads as normal volatility: no snapshot means
/// `is_high_volatility` is false and stops pass through unchanged.
#[derive(Debug, Clone)]
pub struct VolatilityTracker {
    timeframe: Timeframe,
    current_period: usize,
    baseline_period: usize,
    refresh_interval: Duration,
    snapshots: HashMap<String, VolatilitySnapshot>,
}

impl VolatilityTracker {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            timeframe: config.volatility_timeframe,
            current_period: config.volatility_current_period,
            baseline_period: config.volatility_baseline_period,
            refresh_interval: Duration::hours(1),
            snapshots: HashMap::new(),
        }
    }

    /// Recompute unless the stored snapshot is younger than the refresh interval
    pub fn refresh(&mut self, feed: &dyn MarketDataFeed, symbol: &str, now: DateTime<Utc>) {
        if let Some(snapshot) = self.snapshots.get(symbol) {
            if now - snapshot.refreshed_at < self.refresh_interval {
                return;
            }
        }

        let count = self.baseline_period * 2;
        let readings = feed.bars(symbol, self.timeframe, count).and_then(|bars| {
            let current = calculate_atr(&bars, self.current_period).ok().flatten()?;
            let baseline = calculate_atr(&bars, self.baseline_period).ok().flatten()?;
            Some((current, baseline))
        });

        match readings {
            Some((current, baseline)) => {
                let snapshot = VolatilitySnapshot {
                    current,
                    baseline,
                    refreshed_at: now,
                };
                debug!(symbol, current, baseline, ratio = ?snapshot.ratio(), "volatility refreshed");
                self.snapshots.insert(symbol.to_string(), snapshot);
            }
            None => {
                if self.snapshots.remove(symbol).is_some() {
                    warn!(symbol, "volatility data unavailable, treating as normal");
                }
            }
        }
    }

    pub fn set_snapshot(&mut self, symbol: &str, snapshot: VolatilitySnapshot) {
        self.snapshots.insert(symbol.to_string(), snapshot);
    }

    pub fn snapshot(&self, symbol: &str) -> Option<&VolatilitySnapshot> {
        self.snapshots.get(symbol)
    }

    pub fn ratio(&self, symbol: &str) -> Option<f64> {
        self.snapshots.get(symbol).and_then(|s| s.ratio())
    }

    pub fn is_high_volatility(&self, symbol: &str, multiplier: f64) -> bool {
        self.ratio(symbol).map_or(false, |ratio| ratio > multiplier)
    }

    /// Widen the stop distance by the volatility ratio, capped at
    /// [`MAX_STOP_WIDENING`]. Calm or unknown volatility leaves `stop` as is.
    pub fn volatility_adjusted_stop(
        &self,
        symbol: &str,
        stop: f64,
        entry: f64,
        direction: Direction,
    ) -> f64 {
        match self.ratio(symbol) {
            Some(ratio) if ratio > 1.0 => {
                let distance = (entry - stop).abs() * ratio.min(MAX_STOP_WIDENING);
                entry - direction.sign() * distance
            }
            _ => stop,
        }
    }
}
