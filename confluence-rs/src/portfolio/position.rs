//! Position tracking

use crate::exchange::Ticket;
use crate::strategy::{Direction, EntrySignal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle stage, derived from the hit flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStage {
    Open,
    PartialTp1,
    PartialTp2,
    Closed,
}

/// Which target a partial close was sent for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetTier {
    Tp1,
    Tp2,
    Tp3,
}

/// Close request whose outcome is not yet known
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingClose {
    pub tier: TargetTier,
    pub volume: f64,
    /// Remaining volume before the request
    pub before: f64,
    /// Exit-side price when the request was sent
    pub price: f64,
}

/// Ledger row for one open venue position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    /// Model credited with the entry
    pub model: String,
    pub entry_price: f64,
    pub original_stop: f64,
    pub current_stop: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    /// Target currently set at the venue
    pub current_tp: f64,
    /// Volume at open
    pub volume: f64,
    pub remaining_volume: f64,
    pub tp1_hit: bool,
    pub tp2_hit: bool,
    pub tp3_hit: bool,
    /// Partial close for TP1 confirmed (or skipped below minimum volume)
    pub tp1_closed: bool,
    /// Stop at breakeven and target promoted to TP2
    pub breakeven_set: bool,
    pub tp2_closed: bool,
    /// Stop and target updated after TP2
    pub tp2_modified: bool,
    pub sl_moved_to_tp2: bool,
    pub pending_close: Option<PendingClose>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    /// Last exit-side price seen
    pub last_price: f64,
    pub active: bool,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TrackedPosition {
    /// Row for a fill of `volume` lots on `signal`
    pub fn from_signal(ticket: Ticket, signal: &EntrySignal, volume: f64, opened_at: DateTime<Utc>) -> Self {
        Self {
            ticket,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            model: signal.model_name.clone(),
            entry_price: signal.entry_price,
            original_stop: signal.stop_loss,
            current_stop: signal.stop_loss,
            tp1: signal.tp1,
            tp2: signal.tp2,
            tp3: signal.tp3,
            current_tp: signal.tp1,
            volume,
            remaining_volume: volume,
            tp1_hit: false,
            tp2_hit: false,
            tp3_hit: false,
            tp1_closed: false,
            breakeven_set: false,
            tp2_closed: false,
            tp2_modified: false,
            sl_moved_to_tp2: false,
            pending_close: None,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            last_price: signal.entry_price,
            active: true,
            opened_at,
            closed_at: None,
        }
    }

    pub fn stage(&self) -> PositionStage {
        if !self.active {
            PositionStage::Closed
        } else if self.tp2_hit {
            PositionStage::PartialTp2
        } else if self.tp1_hit {
            PositionStage::PartialTp1
        } else {
            PositionStage::Open
        }
    }

    /// Entry-to-original-stop distance
    pub fn risk_distance(&self) -> f64 {
        (self.entry_price - self.original_stop).abs()
    }

    /// Stop price locking in `buffer_r` of the original risk
    pub fn breakeven_stop(&self, buffer_r: f64) -> f64 {
        self.entry_price + self.direction.sign() * buffer_r * self.risk_distance()
    }

    /// Profit of `volume` lots exited at `price`
    pub fn pnl_at(&self, price: f64, volume: f64, value_per_point: f64) -> f64 {
        (price - self.entry_price) * self.direction.sign() * volume * value_per_point
    }

    /// Whether `candidate` is a tighter stop than the current one by more than `tick`
    pub fn is_tighter_stop(&self, candidate: f64, tick: f64) -> bool {
        self.direction.sign() * (candidate - self.current_stop) > tick
    }
}
