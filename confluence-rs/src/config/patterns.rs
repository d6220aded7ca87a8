//! Pattern detector configuration

use crate::data::Timeframe;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    pub timeframe: Timeframe,
    pub lookback: usize,
    pub order: usize,
    /// Wick must exceed the level by this fraction to count as a sweep
    pub sweep_tolerance: f64,
    /// Bars after a close beyond the level in which price may still reclaim it
    pub reversal_bars: usize,
    /// Unswept opposing liquidity this close to entry blocks the signal
    pub near_band: f64,
    /// Swept level must be this close to entry to confirm
    pub proximity_band: f64,
    pub max_sweep_age_hours: i64,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::H1,
            lookback: 120,
            order: 3,
            sweep_tolerance: 0.0005,
            reversal_bars: 3,
            near_band: 0.002,
            proximity_band: 0.004,
            max_sweep_age_hours: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetracementConfig {
    pub timeframe: Timeframe,
    pub lookback: usize,
    pub order: usize,
    /// Relative slack around the 0.5 / 0.618 band edges
    pub band_tolerance: f64,
}

impl Default for RetracementConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::H1,
            lookback: 120,
            order: 3,
            band_tolerance: 0.0005,
        }
    }
}

/// One timeframe scanned for turning points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurningFrame {
    pub timeframe: Timeframe,
    pub order: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurningPointConfig {
    pub frames: Vec<TurningFrame>,
    pub lookback: usize,
    /// Minimum count of dominated neighbours
    pub min_strength: u32,
    /// Bars each side examined when scoring strength
    pub strength_window: usize,
    pub max_age_hours: i64,
    pub proximity_band: f64,
}

impl Default for TurningPointConfig {
    fn default() -> Self {
        Self {
            frames: vec![
                TurningFrame {
                    timeframe: Timeframe::H1,
                    order: 5,
                },
                TurningFrame {
                    timeframe: Timeframe::M15,
                    order: 5,
                },
            ],
            lookback: 150,
            min_strength: 12,
            strength_window: 10,
            max_age_hours: 24,
            proximity_band: 0.004,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstitutionalConfig {
    pub timeframe: Timeframe,
    pub lookback: usize,
    /// Body share of range for an impulse bar
    pub min_body_ratio: f64,
    /// Following closes that must continue the impulse direction
    pub continuation_bars: usize,
    pub proximity_band: f64,
}

impl Default for InstitutionalConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::H1,
            lookback: 120,
            min_body_ratio: 0.7,
            continuation_bars: 1,
            proximity_band: 0.004,
        }
    }
}

/// Parameters shared by every detector plus one section per model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Candidates older than this are pruned
    pub retention_hours: i64,
    /// Upper bound of candidates a detector keeps
    pub capacity: usize,
    pub liquidity: LiquidityConfig,
    pub retracement: RetracementConfig,
    pub turning_points: TurningPointConfig,
    pub institutional: InstitutionalConfig,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            retention_hours: 168,
            capacity: 256,
            liquidity: LiquidityConfig::default(),
            retracement: RetracementConfig::default(),
            turning_points: TurningPointConfig::default(),
            institutional: InstitutionalConfig::default(),
        }
    }
}
