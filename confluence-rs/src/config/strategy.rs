//! Strategy configuration

use crate::data::Timeframe;
use serde::{Deserialize, Serialize};

/// Which pattern models take part in confluence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelToggles {
    pub liquidity: bool,
    pub retracement: bool,
    pub turning_points: bool,
    pub institutional: bool,
}

impl Default for ModelToggles {
    fn default() -> Self {
        Self {
            liquidity: true,
            retracement: true,
            turning_points: true,
            institutional: true,
        }
    }
}

impl ModelToggles {
    pub fn any_enabled(&self) -> bool {
        self.liquidity || self.retracement || self.turning_points || self.institutional
    }
}

/// Strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Traded instrument (e.g., "XAUUSD")
    pub symbol: String,
    /// Higher timeframe weighted most in the context
    pub primary_timeframe: Timeframe,
    pub secondary_timeframe: Timeframe,
    /// Lower timeframes scanned for confirmation, in priority order
    pub entry_timeframes: Vec<Timeframe>,
    pub fast_ma_period: usize,
    pub slow_ma_period: usize,
    pub long_ma_period: usize,
    /// Bars over which the long average slope is measured
    pub slope_lookback: usize,
    /// Minimum combined strength for a tradable context
    pub min_context_strength: f64,
    pub atr_period: usize,
    /// Stop distance in ATRs
    pub stop_atr_multiplier: f64,
    pub rsi_period: usize,
    /// Bars defining the range a structure break must clear
    pub structure_lookback: usize,
    /// Extremum order for higher-low / lower-high detection on entry frames
    pub swing_order: usize,
    /// Take-profit distances in multiples of the stop distance
    pub tp_ratios: [f64; 3],
    pub volatility_timeframe: Timeframe,
    pub volatility_current_period: usize,
    pub volatility_baseline_period: usize,
    /// Current/baseline ATR ratio above which volatility counts as high
    pub volatility_multiplier: f64,
    pub models: ModelToggles,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "XAUUSD".to_string(),
            primary_timeframe: Timeframe::H4,
            secondary_timeframe: Timeframe::D1,
            entry_timeframes: vec![Timeframe::M15, Timeframe::M5],
            fast_ma_period: 20,
            slow_ma_period: 50,
            long_ma_period: 200,
            slope_lookback: 10,
            min_context_strength: 0.5,
            atr_period: 14,
            stop_atr_multiplier: 1.5,
            rsi_period: 14,
            structure_lookback: 10,
            swing_order: 2,
            tp_ratios: [1.0, 2.0, 3.0],
            volatility_timeframe: Timeframe::H1,
            volatility_current_period: 14,
            volatility_baseline_period: 50,
            volatility_multiplier: 1.5,
            models: ModelToggles::default(),
        }
    }
}

impl StrategyConfig {
    /// Bars needed for an entry reading on one timeframe
    pub fn entry_history(&self) -> usize {
        (self.atr_period.max(self.rsi_period) + 1)
            .max(self.structure_lookback + 2)
            .max(self.swing_order * 2 + 3)
            * 3
    }
}
