//! Configuration module
//!
//! [`EngineConfig`] is immutable once the engine is built. It loads from JSON,
//! from the environment (with an optional `.env` file), or from defaults, and
//! must pass [`EngineConfig::validate`] before use.

mod lifecycle;
mod patterns;
mod risk;
mod strategy;

pub use lifecycle::*;
pub use patterns::*;
pub use risk::*;
pub use strategy::*;

use crate::data::Timeframe;
use crate::error::EngineError;
use anyhow::Context;
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub patterns: PatternConfig,
    pub lifecycle: LifecycleConfig,
}

impl EngineConfig {
    /// Parse from a JSON document; omitted fields take their defaults
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing engine config JSON")?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Load from the environment.
    ///
    /// `CONFLUENCE_CONFIG` optionally names a JSON file used as the base; the
    /// remaining variables override single fields on top of it.
    pub fn from_env() -> crate::Result<Self> {
        dotenv().ok();

        let mut config = match std::env::var("CONFLUENCE_CONFIG") {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(symbol) = std::env::var("SYMBOL") {
            config.strategy.symbol = symbol;
        }
        if let Some(v) = env_parse::<f64>("RISK_PERCENT")? {
            config.risk.risk_percent = v;
        }
        if let Some(v) = env_parse::<f64>("MIN_RISK_PERCENT")? {
            config.risk.min_risk_percent = v;
        }
        if let Some(v) = env_parse::<bool>("AUTO_ADJUST_RISK")? {
            config.risk.auto_adjust = v;
        }
        if let Some(v) = env_parse::<f64>("VOLATILITY_MULTIPLIER")? {
            config.strategy.volatility_multiplier = v;
        }
        if let Some(v) = env_parse::<bool>("USE_TP3")? {
            config.lifecycle.use_tp3 = v;
        }
        if let Some(v) = env_parse::<bool>("MOVE_SL_TO_TP2")? {
            config.lifecycle.move_sl_to_tp2 = v;
        }
        if let Ok(tz) = std::env::var("SESSION_TIMEZONE") {
            config.risk.session_timezone = tz;
        }

        Ok(config)
    }

    /// Every timeframe some component reads, shortest first
    pub fn timeframes(&self) -> Vec<Timeframe> {
        let s = &self.strategy;
        let p = &self.patterns;
        let mut all = vec![s.primary_timeframe, s.secondary_timeframe, s.volatility_timeframe];
        all.extend(s.entry_timeframes.iter().copied());
        all.push(p.liquidity.timeframe);
        all.push(p.retracement.timeframe);
        all.push(p.institutional.timeframe);
        all.extend(p.turning_points.frames.iter().map(|f| f.timeframe));
        all.sort();
        all.dedup();
        all
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), EngineError> {
        let s = &self.strategy;
        let r = &self.risk;
        let l = &self.lifecycle;

        if s.symbol.trim().is_empty() {
            return Err(invalid("symbol must not be empty"));
        }
        if !(r.risk_percent > 0.0 && r.risk_percent <= 50.0) {
            return Err(invalid(format!(
                "risk_percent {} outside (0, 50]",
                r.risk_percent
            )));
        }
        if !(r.min_risk_percent > 0.0 && r.min_risk_percent <= r.risk_percent) {
            return Err(invalid(format!(
                "min_risk_percent {} must be in (0, risk_percent]",
                r.min_risk_percent
            )));
        }
        if r.risk_ladder.windows(2).any(|w| w[1] >= w[0]) {
            return Err(invalid("risk_ladder must be strictly descending"));
        }
        if r.risk_ladder.iter().any(|rung| *rung <= 0.0) {
            return Err(invalid("risk_ladder rungs must be positive"));
        }
        if r.min_margin_level <= 0.0 || !(r.max_margin_usage > 0.0 && r.max_margin_usage <= 1.0) {
            return Err(invalid("margin thresholds out of range"));
        }
        if r.max_open_positions == 0 {
            return Err(invalid("max_open_positions must be at least 1"));
        }
        chrono_tz::Tz::from_str(&r.session_timezone)
            .map_err(|e| invalid(format!("session_timezone: {}", e)))?;

        if s.tp_ratios[0] <= 0.0 || s.tp_ratios.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid("tp_ratios must be positive and strictly increasing"));
        }
        if s.stop_atr_multiplier <= 0.0 {
            return Err(invalid("stop_atr_multiplier must be positive"));
        }
        if s.primary_timeframe == s.secondary_timeframe {
            return Err(invalid("primary and secondary timeframes must differ"));
        }
        if s.entry_timeframes.is_empty() {
            return Err(invalid("at least one entry timeframe is required"));
        }
        if let Some(tf) = s
            .entry_timeframes
            .iter()
            .find(|tf| **tf >= s.primary_timeframe)
        {
            return Err(invalid(format!(
                "entry timeframe {} is not below the primary timeframe {}",
                tf, s.primary_timeframe
            )));
        }
        if s.fast_ma_period == 0 || s.fast_ma_period >= s.slow_ma_period {
            return Err(invalid("fast_ma_period must be positive and below slow_ma_period"));
        }
        if s.slope_lookback == 0 || s.structure_lookback == 0 || s.swing_order == 0 {
            return Err(invalid("lookbacks and swing order must be positive"));
        }
        if s.volatility_multiplier <= 0.0 {
            return Err(invalid("volatility_multiplier must be positive"));
        }
        if !s.models.any_enabled() {
            return Err(invalid("at least one pattern model must be enabled"));
        }

        for (name, fraction) in [
            ("tp1_close_fraction", l.tp1_close_fraction),
            ("tp2_close_fraction", l.tp2_close_fraction),
        ] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(invalid(format!("{} {} outside (0, 1]", name, fraction)));
            }
        }
        if l.breakeven_buffer_r < 0.0 {
            return Err(invalid("breakeven_buffer_r must not be negative"));
        }

        if self.patterns.capacity == 0 || self.patterns.retention_hours <= 0 {
            return Err(invalid("pattern capacity and retention must be positive"));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidConfig(msg.into())
}

fn env_parse<T>(key: &str) -> crate::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("parsing {}={}", key, raw))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}
