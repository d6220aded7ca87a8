//! Risk sizing and trade gating

use crate::config::RiskConfig;
use crate::exchange::InstrumentSpec;
use crate::portfolio::{AccountSnapshot, SessionTracker};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Session risk counter.
///
/// `current_risk` only moves down the ladder until [`RiskState::reset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub initial_risk: f64,
    pub current_risk: f64,
    pub min_risk: f64,
    pub auto_adjust: bool,
}

impl RiskState {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            initial_risk: config.risk_percent,
            current_risk: config.risk_percent,
            min_risk: config.min_risk_percent,
            auto_adjust: config.auto_adjust,
        }
    }

    pub fn reset(&mut self) {
        self.current_risk = self.initial_risk;
    }

    /// Move to the next rung below the current risk, never under `min_risk`.
    /// Returns the new risk, or `None` when already at the floor.
    pub fn step_down(&mut self, ladder: &[f64]) -> Option<f64> {
        if self.current_risk <= self.min_risk {
            return None;
        }
        let next = ladder
            .iter()
            .copied()
            .find(|&rung| rung < self.current_risk)
            .unwrap_or(self.min_risk)
            .max(self.min_risk);
        self.current_risk = next;
        Some(next)
    }
}

/// Non-fatal outcomes of a sizing attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RiskEvent {
    SteppedDown { from: f64, to: f64 },
    CannotTrade { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizingResult {
    /// Lots to trade; 0.0 means do not trade
    pub volume: f64,
    /// Risk percent the volume was sized at
    pub risk_percent: f64,
    pub events: Vec<RiskEvent>,
}

/// Converts risk percent and stop distance into a venue-valid volume
#[derive(Debug, Clone)]
pub struct RiskSizer {
    config: RiskConfig,
    state: RiskState,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Self {
        let state = RiskState::new(&config);
        Self { config, state }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn reset(&mut self) {
        if self.state.current_risk != self.state.initial_risk {
            info!(risk = self.state.initial_risk, "risk reset");
        }
        self.state.reset();
    }

    /// Lots for risking the current percent of balance over `|entry - stop|`.
    ///
    /// The volume must leave the margin level at or above the configured
    /// minimum and take no more than the allowed share of free margin. When
    /// it does not, risk steps down the ladder (if auto-adjust is on) and
    /// sizing is retried once per rung.
    pub fn calculate_lot_size(
        &mut self,
        entry: f64,
        stop: f64,
        account: &AccountSnapshot,
        instrument: &InstrumentSpec,
    ) -> SizingResult {
        let mut events = Vec::new();
        let loss_per_lot = (entry - stop).abs() * instrument.value_per_point();
        if !loss_per_lot.is_finite() || loss_per_lot <= 0.0 {
            return self.cannot_trade(events, "zero stop distance".to_string());
        }

        loop {
            let risk = self.state.current_risk;
            let raw = account.balance * risk / 100.0 / loss_per_lot;
            let volume = instrument.normalize_volume(raw);
            if volume <= 0.0 {
                return self.cannot_trade(
                    events,
                    format!("{raw:.4} lots at {risk}% is below the minimum volume"),
                );
            }

            let required = instrument.margin_required(volume);
            if self.margin_ok(account, required) {
                debug!(volume, risk, required, "position sized");
                return SizingResult {
                    volume,
                    risk_percent: risk,
                    events,
                };
            }

            if !self.state.auto_adjust {
                return self.cannot_trade(events, format!("insufficient margin at {risk}%"));
            }
            match self.state.step_down(&self.config.risk_ladder) {
                Some(to) => {
                    warn!(from = risk, to, required, "margin shortfall, stepping risk down");
                    events.push(RiskEvent::SteppedDown { from: risk, to });
                }
                None => {
                    return self.cannot_trade(
                        events,
                        format!("insufficient margin at minimum risk {risk}%"),
                    );
                }
            }
        }
    }

    fn margin_ok(&self, account: &AccountSnapshot, required: f64) -> bool {
        let level_ok = account
            .margin_level_after(required)
            .map_or(true, |level| level >= self.config.min_margin_level);
        level_ok && account.can_afford(required, self.config.max_margin_usage)
    }

    fn cannot_trade(&self, mut events: Vec<RiskEvent>, reason: String) -> SizingResult {
        warn!(%reason, "cannot trade");
        events.push(RiskEvent::CannotTrade { reason });
        SizingResult {
            volume: 0.0,
            risk_percent: self.state.current_risk,
            events,
        }
    }

    /// Check if another position may be opened
    pub fn can_open_position(&self, current_positions: usize) -> bool {
        current_positions < self.config.max_open_positions
    }

    /// Check if daily loss limit is exceeded
    pub fn is_daily_loss_exceeded(&self, starting_balance: f64, current_balance: f64) -> bool {
        if starting_balance <= 0.0 {
            return false;
        }
        let loss = (starting_balance - current_balance) / starting_balance;
        loss > self.config.max_daily_loss
    }

    /// Check if drawdown limit is exceeded
    pub fn is_drawdown_exceeded(&self, peak_equity: f64, current_equity: f64) -> bool {
        if peak_equity <= 0.0 {
            return false;
        }
        let drawdown = (peak_equity - current_equity) / peak_equity;
        drawdown > self.config.max_drawdown
    }

    /// First gate that blocks a new entry, if any
    pub fn entry_blocked(
        &self,
        session: &SessionTracker,
        account: &AccountSnapshot,
        open_positions: usize,
    ) -> Option<&'static str> {
        if !self.can_open_position(open_positions) {
            Some("max open positions")
        } else if self.is_daily_loss_exceeded(session.start_balance(), account.equity) {
            Some("daily loss limit")
        } else if self.is_drawdown_exceeded(session.peak_equity(), account.equity) {
            Some("max drawdown")
        } else {
            None
        }
    }
}
