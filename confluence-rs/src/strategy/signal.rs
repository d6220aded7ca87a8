//! Trade direction, entry signals and rejection reasons

use crate::data::Timeframe;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Whether `price` has reached `level` moving in this direction
    pub fn reached(&self, price: f64, level: f64) -> bool {
        match self {
            Direction::Long => price >= level,
            Direction::Short => price <= level,
        }
    }

    /// Whether `candidate` is strictly further in this direction than `reference`
    pub fn is_beyond(&self, candidate: f64, reference: f64) -> bool {
        match self {
            Direction::Long => candidate > reference,
            Direction::Short => candidate < reference,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

/// Why no signal came out of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum RejectReason {
    #[error("higher-timeframe context is not tradable")]
    InvalidContext,
    #[error("no entry timeframe confirmed")]
    NoConfirmation,
    #[error("not enough market data")]
    NoMarketData,
    #[error("no quote available")]
    NoQuote,
    #[error("stop or target levels are inconsistent")]
    InvalidLevels,
    #[error("no pattern model confirmed the signal")]
    NoPatternConfluence,
}

/// A validated trade candidate.
///
/// Constructing one enforces the level ordering: the stop sits on the losing
/// side of entry and the three targets move strictly away from entry in the
/// trade direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySignal {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    /// Model credited with the trade
    pub model_name: String,
    /// Every model that confirmed the signal
    pub confirmations: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
}

impl EntrySignal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: f64,
        stop_loss: f64,
        tp1: f64,
        tp2: f64,
        tp3: f64,
        timestamp: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Result<Self, EngineError> {
        let finite = [entry_price, stop_loss, tp1, tp2, tp3]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(EngineError::InvalidLevels("non-finite price".to_string()));
        }
        if !direction.is_beyond(entry_price, stop_loss) {
            return Err(EngineError::InvalidLevels(format!(
                "{} stop {} is not on the losing side of entry {}",
                direction, stop_loss, entry_price
            )));
        }
        let ordered = direction.is_beyond(tp1, entry_price)
            && direction.is_beyond(tp2, tp1)
            && direction.is_beyond(tp3, tp2);
        if !ordered {
            return Err(EngineError::InvalidLevels(format!(
                "{} targets {} / {} / {} are not ordered away from entry {}",
                direction, tp1, tp2, tp3, entry_price
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            direction,
            entry_price,
            stop_loss,
            tp1,
            tp2,
            tp3,
            model_name: String::new(),
            confirmations: Vec::new(),
            timestamp,
            timeframe,
        })
    }

    /// Build targets at `ratios` multiples of the stop distance
    pub fn from_risk_multiples(
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: f64,
        stop_loss: f64,
        ratios: [f64; 3],
        timestamp: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Result<Self, EngineError> {
        let risk = (entry_price - stop_loss).abs();
        let target = |ratio: f64| entry_price + direction.sign() * risk * ratio;
        Self::new(
            symbol,
            direction,
            entry_price,
            stop_loss,
            target(ratios[0]),
            target(ratios[1]),
            target(ratios[2]),
            timestamp,
            timeframe,
        )
    }

    /// Distance between entry and stop
    pub fn risk_distance(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }

    /// Record the confirming models; the first is credited with the trade
    pub fn with_confirmations(mut self, confirmations: Vec<String>) -> Self {
        if let Some(first) = confirmations.first() {
            self.model_name = first.clone();
        }
        self.confirmations = confirmations;
        self
    }
}
