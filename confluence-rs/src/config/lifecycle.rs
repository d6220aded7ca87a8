//! Partial-exit lifecycle configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Share of the current volume closed at TP1
    pub tp1_close_fraction: f64,
    /// Share of the remaining volume closed at TP2 when a third tier follows
    pub tp2_close_fraction: f64,
    /// Breakeven offset as a fraction of the original risk distance
    pub breakeven_buffer_r: f64,
    pub move_sl_to_tp2: bool,
    pub use_tp3: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            tp1_close_fraction: 0.33,
            tp2_close_fraction: 0.5,
            breakeven_buffer_r: 0.1,
            move_sl_to_tp2: true,
            use_tp3: true,
        }
    }
}
