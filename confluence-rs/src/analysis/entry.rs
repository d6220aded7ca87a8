//! Lower-timeframe entry confirmation

use crate::analysis::MarketContext;
use crate::config::StrategyConfig;
use crate::data::{closes, Candle, MarketDataFeed, Timeframe};
use crate::indicators::{calculate_atr, last_value, RSI};
use crate::patterns::{swing_points, ExtremumKind};
use crate::strategy::{Direction, EntrySignal, RejectReason};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// RSI midline separating bullish from bearish momentum
const RSI_MIDLINE: f64 = 50.0;

/// Which checks passed on one timeframe
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Confirmation {
    pub candle_direction: bool,
    pub structure_break: bool,
    pub swing_structure: bool,
    pub momentum: bool,
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        self.candle_direction && (self.structure_break || self.swing_structure) && self.momentum
    }
}

/// Turns a tradable context into a priced [`EntrySignal`]
#[derive(Debug, Clone)]
pub struct EntryAnalyzer {
    timeframes: Vec<Timeframe>,
    atr_period: usize,
    stop_atr_multiplier: f64,
    rsi_period: usize,
    structure_lookback: usize,
    swing_order: usize,
    tp_ratios: [f64; 3],
    history: usize,
}

impl EntryAnalyzer {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            timeframes: config.entry_timeframes.clone(),
            atr_period: config.atr_period,
            stop_atr_multiplier: config.stop_atr_multiplier,
            rsi_period: config.rsi_period,
            structure_lookback: config.structure_lookback,
            swing_order: config.swing_order,
            tp_ratios: config.tp_ratios,
            history: config.entry_history(),
        }
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Evaluate the entry timeframes in order; the first one that confirms
    /// the context direction produces the signal.
    pub fn analyze_entry(
        &self,
        context: &MarketContext,
        feed: &dyn MarketDataFeed,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<EntrySignal, RejectReason> {
        let Some(direction) = context.direction() else {
            return Err(RejectReason::InvalidContext);
        };
        let quote = feed.bid_ask(symbol).ok_or(RejectReason::NoQuote)?;

        let mut saw_data = false;
        for &timeframe in &self.timeframes {
            let Some(bars) = feed.bars(symbol, timeframe, self.history) else {
                continue;
            };
            if bars.len() <= self.structure_lookback.max(self.rsi_period) {
                continue;
            }
            saw_data = true;

            let confirmation = self.confirm(&bars, direction);
            if !confirmation.is_confirmed() {
                debug!(symbol, %timeframe, ?confirmation, "entry not confirmed");
                continue;
            }
            let Some(atr) = calculate_atr(&bars, self.atr_period).ok().flatten() else {
                continue;
            };
            if atr <= 0.0 {
                continue;
            }

            let entry = quote.entry_price(direction);
            let stop = entry - direction.sign() * atr * self.stop_atr_multiplier;
            let signal = EntrySignal::from_risk_multiples(
                symbol,
                direction,
                entry,
                stop,
                self.tp_ratios,
                now,
                timeframe,
            )
            .map_err(|_| RejectReason::InvalidLevels)?;

            info!(
                symbol,
                %timeframe,
                direction = %direction,
                entry,
                stop,
                tp1 = signal.tp1,
                "entry candidate"
            );
            return Ok(signal);
        }

        if saw_data {
            Err(RejectReason::NoConfirmation)
        } else {
            Err(RejectReason::NoMarketData)
        }
    }

    /// Run every confirmation check against the latest closed bar
    pub fn confirm(&self, bars: &[Candle], direction: Direction) -> Confirmation {
        let Some((last, prior)) = bars.split_last() else {
            return Confirmation::default();
        };

        let candle_direction = match direction {
            Direction::Long => last.is_bullish(),
            Direction::Short => last.is_bearish(),
        };

        let window = &prior[prior.len().saturating_sub(self.structure_lookback)..];
        let structure_break = match direction {
            Direction::Long => window
                .iter()
                .map(|c| c.high)
                .fold(None, |m: Option<f64>, h| Some(m.map_or(h, |m| m.max(h))))
                .map_or(false, |high| last.close > high),
            Direction::Short => window
                .iter()
                .map(|c| c.low)
                .fold(None, |m: Option<f64>, l| Some(m.map_or(l, |m| m.min(l))))
                .map_or(false, |low| last.close < low),
        };

        let swing_structure = self.swing_structure(bars, direction);

        let momentum = RSI::new(self.rsi_period)
            .ok()
            .and_then(|rsi| last_value(rsi, &closes(bars)))
            .map_or(false, |rsi| match direction {
                Direction::Long => rsi > RSI_MIDLINE,
                Direction::Short => rsi < RSI_MIDLINE,
            });

        Confirmation {
            candle_direction,
            structure_break,
            swing_structure,
            momentum,
        }
    }

    /// Higher low for longs, lower high for shorts, from the last two swings
    fn swing_structure(&self, bars: &[Candle], direction: Direction) -> bool {
        let kind = match direction {
            Direction::Long => ExtremumKind::Low,
            Direction::Short => ExtremumKind::High,
        };
        let points: Vec<f64> = swing_points(bars, self.swing_order)
            .into_iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.price)
            .collect();
        match points.as_slice() {
            [.., earlier, later] => direction.is_beyond(*later, *earlier),
            _ => false,
        }
    }
}
