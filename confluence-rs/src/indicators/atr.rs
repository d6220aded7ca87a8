//! ATR (Average True Range) indicator

use crate::data::Candle;
use crate::error::EngineError;
use crate::indicators::ta_error;
use ta::indicators::AverageTrueRange;
use ta::Next;

/// ATR over candles. Unlike the close-only indicators this consumes whole bars.
#[derive(Debug, Clone)]
pub struct ATR {
    inner: AverageTrueRange,
    period: usize,
    update_count: usize,
    last_value: Option<f64>,
}

impl ATR {
    pub fn new(period: usize) -> Result<Self, EngineError> {
        Ok(Self {
            inner: AverageTrueRange::new(period).map_err(|e| ta_error("ATR", period, e))?,
            period,
            update_count: 0,
            last_value: None,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn update(&mut self, candle: &Candle) {
        let value = self.inner.next(candle);
        self.update_count += 1;
        if self.update_count >= self.period {
            self.last_value = Some(value);
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.last_value
    }

    pub fn is_ready(&self) -> bool {
        self.update_count >= self.period
    }
}

/// ATR reading after the last of `candles`, `None` until warmed up
pub fn calculate_atr(candles: &[Candle], period: usize) -> Result<Option<f64>, EngineError> {
    let mut atr = ATR::new(period)?;
    for candle in candles {
        atr.update(candle);
    }
    Ok(atr.value())
}
