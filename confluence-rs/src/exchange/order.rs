//! Order, position and instrument types exchanged with the venue

use crate::strategy::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Venue identifier of an open position
pub type Ticket = u64;

/// Market order request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    /// Lots
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Free text, usually the credited model
    pub comment: String,
}

/// Venue view of an open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    /// Remaining lots
    pub volume: f64,
    pub open_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Floating profit in account currency
    pub profit: f64,
    pub opened_at: DateTime<Utc>,
}

/// Trading constraints of one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    /// Smallest price increment
    pub tick_size: f64,
    /// Account-currency value of one tick for one lot
    pub tick_value: f64,
    pub margin_per_lot: f64,
}

impl InstrumentSpec {
    /// Spot gold with 100 oz lots
    pub fn xauusd() -> Self {
        Self {
            symbol: "XAUUSD".to_string(),
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
            tick_size: 0.01,
            tick_value: 1.0,
            margin_per_lot: 1000.0,
        }
    }

    /// Account-currency value of a one-point price move for one lot
    pub fn value_per_point(&self) -> f64 {
        if self.tick_size > 0.0 {
            self.tick_value / self.tick_size
        } else {
            0.0
        }
    }

    /// Round down to the volume step
    pub fn round_down(&self, volume: f64) -> f64 {
        if self.volume_step <= 0.0 {
            return volume;
        }
        let steps = (volume / self.volume_step + 1e-9).floor();
        round_lots(steps * self.volume_step)
    }

    /// Step-aligned volume clamped to the maximum, or 0.0 below the minimum
    pub fn normalize_volume(&self, volume: f64) -> f64 {
        let volume = self.round_down(volume).min(self.volume_max);
        if volume + 1e-9 < self.volume_min {
            0.0
        } else {
            volume
        }
    }

    pub fn margin_required(&self, volume: f64) -> f64 {
        self.margin_per_lot * volume
    }
}

/// Strip float noise from lot arithmetic
pub fn round_lots(volume: f64) -> f64 {
    (volume * 1e8).round() / 1e8
}
