//! Risk management configuration

use serde::{Deserialize, Serialize};

/// Risk management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Risk per trade as percent of balance (e.g., 10.0 = 10%)
    pub risk_percent: f64,
    /// Floor the step-down ladder never goes below
    pub min_risk_percent: f64,
    /// Descending risk rungs tried on margin shortfall
    pub risk_ladder: Vec<f64>,
    /// Step down the ladder instead of refusing outright
    pub auto_adjust: bool,
    /// Minimum post-trade margin level in percent
    pub min_margin_level: f64,
    /// Largest share of free margin a new trade may take
    pub max_margin_usage: f64,
    /// Maximum number of open positions
    pub max_open_positions: usize,
    /// Maximum daily loss (as fraction, e.g., 0.05 = 5%)
    pub max_daily_loss: f64,
    /// Maximum drawdown (as fraction, e.g., 0.20 = 20%)
    pub max_drawdown: f64,
    /// IANA zone whose calendar day defines a session
    pub session_timezone: String,
    /// Restore the initial risk at each session rollover
    pub reset_risk_each_session: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_percent: 10.0,
            min_risk_percent: 1.0,
            risk_ladder: vec![10.0, 5.0, 2.0, 1.0],
            auto_adjust: true,
            min_margin_level: 200.0,
            max_margin_usage: 0.8,
            max_open_positions: 3,
            max_daily_loss: 0.05, // 5%
            max_drawdown: 0.20,   // 20%
            session_timezone: "UTC".to_string(),
            reset_risk_each_session: false,
        }
    }
}
