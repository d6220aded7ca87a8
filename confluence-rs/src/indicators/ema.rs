//! EMA (Exponential Moving Average) indicator

use crate::error::EngineError;
use crate::indicators::{ta_error, Indicator};
use ta::indicators::ExponentialMovingAverage;
use ta::Next;

/// EMA indicator wrapper
#[derive(Debug, Clone)]
pub struct EMA {
    inner: ExponentialMovingAverage,
    period: usize,
    update_count: usize,
    last_value: Option<f64>,
}

impl EMA {
    /// Create new EMA indicator
    pub fn new(period: usize) -> Result<Self, EngineError> {
        Ok(Self {
            inner: ExponentialMovingAverage::new(period)
                .map_err(|e| ta_error("EMA", period, e))?,
            period,
            update_count: 0,
            last_value: None,
        })
    }

    /// Get EMA period
    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for EMA {
    fn name(&self) -> &str {
        "EMA"
    }

    fn update(&mut self, value: f64) {
        let ema_value = self.inner.next(value);
        self.update_count += 1;
        if self.update_count >= self.period {
            self.last_value = Some(ema_value);
        }
    }

    fn value(&self) -> Option<f64> {
        self.last_value
    }

    fn is_ready(&self) -> bool {
        self.update_count >= self.period
    }
}

/// Calculate EMA from a series of values
pub fn calculate_ema(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, EngineError> {
    let mut ema = EMA::new(period)?;
    Ok(values
        .iter()
        .map(|&value| {
            ema.update(value);
            ema.value()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_tracks_rising_series() {
        let values: Vec<f64> = (1..=30).map(|v| v as f64).collect();
        let out = calculate_ema(&values, 5).unwrap();
        assert!(out[3].is_none());
        let last = out[29].unwrap();
        // lags the series but stays close on a steady ramp
        assert!(last < 30.0 && last > 25.0);
    }
}
