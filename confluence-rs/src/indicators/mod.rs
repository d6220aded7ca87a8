//! Technical indicators module
//!
//! Thin stateful wrappers over the `ta` crate, warming up before they report.

pub mod atr;
pub mod ema;
pub mod rsi;
pub mod sma;

pub use atr::*;
pub use ema::*;
pub use rsi::*;
pub use sma::*;

use crate::error::EngineError;

/// Indicator trait for all indicators
pub trait Indicator {
    /// Get the name of the indicator
    fn name(&self) -> &str;

    /// Update indicator with new value
    fn update(&mut self, value: f64);

    /// Get current indicator value
    fn value(&self) -> Option<f64>;

    /// Check if indicator is ready (has enough data)
    fn is_ready(&self) -> bool;
}

pub(crate) fn ta_error<E: std::fmt::Debug>(name: &str, period: usize, err: E) -> EngineError {
    EngineError::Indicator(format!("{}({}): {:?}", name, period, err))
}

/// Feed every value and return the final reading
pub fn last_value<I: Indicator>(mut indicator: I, values: &[f64]) -> Option<f64> {
    for &value in values {
        indicator.update(value);
    }
    indicator.value()
}
