//! Higher-timeframe market context

use crate::config::StrategyConfig;
use crate::data::{closes, Candle, MarketDataFeed, NewBarGate, Timeframe};
use crate::indicators::{calculate_atr, calculate_sma, last_value, EMA};
use crate::strategy::Direction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Weight of vote alignment in a timeframe's strength
const ALIGNMENT_WEIGHT: f64 = 0.6;
/// Weight of MA separation (in ATRs) in a timeframe's strength
const SEPARATION_WEIGHT: f64 = 0.4;
/// Share of strength kept when only the primary timeframe has a trend
const PRIMARY_ONLY_FACTOR: f64 = 0.7;
/// Share of strength kept when only the secondary timeframe has a trend
const SECONDARY_ONLY_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Bullish,
    Bearish,
    Undefined,
}

impl Trend {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Trend::Bullish => Some(Direction::Long),
            Trend::Bearish => Some(Direction::Short),
            Trend::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        *self != Trend::Undefined
    }

    fn from_sign(sign: f64) -> Trend {
        if sign > 0.0 {
            Trend::Bullish
        } else if sign < 0.0 {
            Trend::Bearish
        } else {
            Trend::Undefined
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trend::Bullish => "bullish",
            Trend::Bearish => "bearish",
            Trend::Undefined => "undefined",
        };
        f.write_str(s)
    }
}

/// Trend reading of a single timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeframeTrend {
    pub timeframe: Timeframe,
    pub trend: Trend,
    /// In [0, 1]
    pub strength: f64,
}

impl TimeframeTrend {
    pub fn undefined(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            trend: Trend::Undefined,
            strength: 0.0,
        }
    }
}

/// Combined higher-timeframe bias gating every entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketContext {
    pub trend: Trend,
    pub strength: f64,
    /// Current/baseline volatility ratio when known
    pub volatility: Option<f64>,
    pub valid: bool,
    pub computed_at: DateTime<Utc>,
    pub primary: TimeframeTrend,
    pub secondary: TimeframeTrend,
}

impl MarketContext {
    /// Merge the two higher timeframes.
    ///
    /// Agreement averages the strengths, disagreement is undefined, and a
    /// lone defined timeframe keeps a reduced share of its strength.
    pub fn combine(
        primary: TimeframeTrend,
        secondary: TimeframeTrend,
        min_strength: f64,
        volatility: Option<f64>,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let (trend, strength) = match (primary.trend, secondary.trend) {
            (p, s) if p.is_defined() && p == s => (p, (primary.strength + secondary.strength) / 2.0),
            (p, Trend::Undefined) if p.is_defined() => (p, primary.strength * PRIMARY_ONLY_FACTOR),
            (Trend::Undefined, s) if s.is_defined() => {
                (s, secondary.strength * SECONDARY_ONLY_FACTOR)
            }
            _ => (Trend::Undefined, 0.0),
        };
        let strength = strength.clamp(0.0, 1.0);

        Self {
            trend,
            strength,
            volatility,
            valid: trend.is_defined() && strength >= min_strength,
            computed_at,
            primary,
            secondary,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        if self.valid {
            self.trend.direction()
        } else {
            None
        }
    }
}

/// Computes [`MarketContext`] from the primary and secondary timeframes
#[derive(Debug, Clone)]
pub struct ContextAnalyzer {
    primary: Timeframe,
    secondary: Timeframe,
    fast_period: usize,
    slow_period: usize,
    long_period: usize,
    slope_lookback: usize,
    atr_period: usize,
    min_strength: f64,
    gate: NewBarGate,
    current: Option<MarketContext>,
}

impl ContextAnalyzer {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            primary: config.primary_timeframe,
            secondary: config.secondary_timeframe,
            fast_period: config.fast_ma_period,
            slow_period: config.slow_ma_period,
            long_period: config.long_ma_period,
            slope_lookback: config.slope_lookback,
            atr_period: config.atr_period,
            min_strength: config.min_context_strength,
            gate: NewBarGate::new(),
            current: None,
        }
    }

    /// Bars required for a defined trend
    pub fn history(&self) -> usize {
        self.long_period + self.slope_lookback
    }

    /// Trend and strength of one timeframe from its closed bars
    pub fn trend_for(&self, timeframe: Timeframe, bars: &[Candle]) -> TimeframeTrend {
        if bars.len() < self.history() {
            return TimeframeTrend::undefined(timeframe);
        }
        let closes = closes(bars);
        let last_close = closes[closes.len() - 1];

        let fast = EMA::new(self.fast_period)
            .ok()
            .and_then(|ema| last_value(ema, &closes));
        let slow = EMA::new(self.slow_period)
            .ok()
            .and_then(|ema| last_value(ema, &closes));
        let long = calculate_sma(&closes, self.long_period).unwrap_or_default();

        let (Some(fast), Some(slow)) = (fast, slow) else {
            return TimeframeTrend::undefined(timeframe);
        };
        let long_now = long.last().copied().flatten();
        let long_then = long
            .len()
            .checked_sub(1 + self.slope_lookback)
            .and_then(|i| long[i]);
        let (Some(long_now), Some(long_then)) = (long_now, long_then) else {
            return TimeframeTrend::undefined(timeframe);
        };

        let trend = Trend::from_sign(fast - slow);
        if !trend.is_defined() {
            return TimeframeTrend::undefined(timeframe);
        }
        let votes = [
            Trend::from_sign(last_close - long_now),
            Trend::from_sign(long_now - long_then),
        ];
        let agreeing = 1 + votes.iter().filter(|v| **v == trend).count();
        if agreeing < 2 {
            return TimeframeTrend::undefined(timeframe);
        }

        let alignment = agreeing as f64 / 3.0;
        let separation = match calculate_atr(bars, self.atr_period).ok().flatten() {
            Some(atr) if atr > 0.0 => ((fast - slow).abs() / atr).min(1.0),
            _ => 0.0,
        };
        let strength = (ALIGNMENT_WEIGHT * alignment + SEPARATION_WEIGHT * separation).clamp(0.0, 1.0);

        TimeframeTrend {
            timeframe,
            trend,
            strength,
        }
    }

    /// Compute a fresh context from the feed
    pub fn analyze_context(
        &mut self,
        feed: &dyn MarketDataFeed,
        symbol: &str,
        now: DateTime<Utc>,
        volatility: Option<f64>,
    ) -> &MarketContext {
        let count = self.history() * 2;
        let primary = feed
            .bars(symbol, self.primary, count)
            .map(|bars| self.trend_for(self.primary, &bars))
            .unwrap_or_else(|| TimeframeTrend::undefined(self.primary));
        let secondary = feed
            .bars(symbol, self.secondary, count)
            .map(|bars| self.trend_for(self.secondary, &bars))
            .unwrap_or_else(|| TimeframeTrend::undefined(self.secondary));

        let context = MarketContext::combine(primary, secondary, self.min_strength, volatility, now);
        if context.valid {
            info!(
                symbol,
                trend = %context.trend,
                strength = context.strength,
                "market context updated"
            );
        } else {
            debug!(
                symbol,
                primary = %primary.trend,
                secondary = %secondary.trend,
                strength = context.strength,
                "market context not tradable"
            );
        }
        self.current.insert(context)
    }

    /// Recompute when either higher timeframe closed a new bar; returns
    /// whether it did.
    pub fn refresh(
        &mut self,
        feed: &dyn MarketDataFeed,
        symbol: &str,
        now: DateTime<Utc>,
        volatility: Option<f64>,
    ) -> bool {
        // both gates must observe the bar, so no short-circuit
        let primary_new = self
            .gate
            .is_new_bar(self.primary, feed.latest_bar_time(symbol, self.primary));
        let secondary_new = self
            .gate
            .is_new_bar(self.secondary, feed.latest_bar_time(symbol, self.secondary));
        if primary_new || secondary_new {
            self.analyze_context(feed, symbol, now, volatility);
            return true;
        }
        false
    }

    pub fn current(&self) -> Option<&MarketContext> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryFeed;
    use chrono::{Duration, TimeZone};

    fn trend(timeframe: Timeframe, trend: Trend, strength: f64) -> TimeframeTrend {
        TimeframeTrend {
            timeframe,
            trend,
            strength,
        }
    }

    fn trending_bars(timeframe: Timeframe, n: usize, step: f64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 2000.0 + step * i as f64;
                Candle::new(
                    close - step / 2.0,
                    close + 1.0,
                    close - 1.0,
                    close,
                    1.0,
                    base + timeframe.duration() * i as i32,
                    "XAUUSD".to_string(),
                    timeframe,
                )
            })
            .collect()
    }

    #[test]
    fn test_combine_rules() {
        let now = Utc::now();
        let both = MarketContext::combine(
            trend(Timeframe::H4, Trend::Bullish, 0.8),
            trend(Timeframe::D1, Trend::Bullish, 0.6),
            0.5,
            None,
            now,
        );
        assert_eq!(both.trend, Trend::Bullish);
        assert!((both.strength - 0.7).abs() < 1e-12);
        assert!(both.valid);

        let primary_only = MarketContext::combine(
            trend(Timeframe::H4, Trend::Bearish, 0.8),
            TimeframeTrend::undefined(Timeframe::D1),
            0.5,
            None,
            now,
        );
        assert_eq!(primary_only.trend, Trend::Bearish);
        assert!((primary_only.strength - 0.56).abs() < 1e-12);
        assert!(primary_only.valid);

        let secondary_only = MarketContext::combine(
            TimeframeTrend::undefined(Timeframe::H4),
            trend(Timeframe::D1, Trend::Bullish, 0.9),
            0.5,
            None,
            now,
        );
        assert!((secondary_only.strength - 0.45).abs() < 1e-12);
        assert!(!secondary_only.valid);
    }

    #[test]
    fn test_disagreement_is_undefined() {
        let context = MarketContext::combine(
            trend(Timeframe::H4, Trend::Bullish, 1.0),
            trend(Timeframe::D1, Trend::Bearish, 1.0),
            0.5,
            None,
            Utc::now(),
        );
        assert_eq!(context.trend, Trend::Undefined);
        assert_eq!(context.strength, 0.0);
        assert!(!context.valid);
        assert_eq!(context.direction(), None);
    }

    #[test]
    fn test_trend_for_steady_rise() {
        let analyzer = ContextAnalyzer::new(&StrategyConfig::default());
        let bars = trending_bars(Timeframe::H4, 300, 1.0);
        let reading = analyzer.trend_for(Timeframe::H4, &bars);

        assert_eq!(reading.trend, Trend::Bullish);
        // every vote agrees and the averages are many ATRs apart
        assert!((reading.strength - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_for_short_history_is_undefined() {
        let analyzer = ContextAnalyzer::new(&StrategyConfig::default());
        let bars = trending_bars(Timeframe::H4, 100, 1.0);
        assert_eq!(analyzer.trend_for(Timeframe::H4, &bars).trend, Trend::Undefined);
    }

    #[test]
    fn test_history_is_exactly_enough() {
        let analyzer = ContextAnalyzer::new(&StrategyConfig::default());
        let needed = analyzer.history();
        let bars = trending_bars(Timeframe::H4, needed, 1.0);

        assert_eq!(analyzer.trend_for(Timeframe::H4, &bars).trend, Trend::Bullish);
        assert_eq!(
            analyzer.trend_for(Timeframe::H4, &bars[1..]).trend,
            Trend::Undefined
        );
    }

    #[test]
    fn test_refresh_only_on_new_bars() {
        let mut feed = InMemoryFeed::new();
        feed.add_candles(trending_bars(Timeframe::H4, 300, 1.0));
        feed.add_candles(trending_bars(Timeframe::D1, 300, -1.0));

        let mut analyzer = ContextAnalyzer::new(&StrategyConfig::default());
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert!(analyzer.refresh(&feed, "XAUUSD", now, None));
        assert!(!analyzer.refresh(&feed, "XAUUSD", now + Duration::minutes(5), None));

        // H4 up, D1 down
        let context = analyzer.current().unwrap();
        assert_eq!(context.primary.trend, Trend::Bullish);
        assert_eq!(context.secondary.trend, Trend::Bearish);
        assert_eq!(context.trend, Trend::Undefined);
        assert!(!context.valid);
    }
}
