//! Strict symmetric local extrema

use crate::data::Candle;
use crate::strategy::Direction;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumKind {
    High,
    Low,
}

impl ExtremumKind {
    /// Reaction expected from price returning to the extremum
    pub fn bias(&self) -> Direction {
        match self {
            ExtremumKind::High => Direction::Short,
            ExtremumKind::Low => Direction::Long,
        }
    }

    pub fn price(&self, candle: &Candle) -> f64 {
        match self {
            ExtremumKind::High => candle.high,
            ExtremumKind::Low => candle.low,
        }
    }

    /// `a` is strictly more extreme than `b`
    fn dominates(&self, a: f64, b: f64) -> bool {
        match self {
            ExtremumKind::High => a > b,
            ExtremumKind::Low => a < b,
        }
    }
}

/// A confirmed swing high or low
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    /// Position in the slice it was found in
    pub index: usize,
    pub kind: ExtremumKind,
    pub price: f64,
    pub time: DateTime<Utc>,
}

/// True when bar `idx` is strictly more extreme than each of the `order`
/// bars on both sides. Ties disqualify, as do bars too close to either edge.
pub fn is_extremum(bars: &[Candle], idx: usize, order: usize, kind: ExtremumKind) -> bool {
    if order == 0 || idx < order || idx + order >= bars.len() {
        return false;
    }
    let pivot = kind.price(&bars[idx]);
    (idx - order..=idx + order)
        .filter(|&j| j != idx)
        .all(|j| kind.dominates(pivot, kind.price(&bars[j])))
}

pub fn is_swing_high(bars: &[Candle], idx: usize, order: usize) -> bool {
    is_extremum(bars, idx, order, ExtremumKind::High)
}

pub fn is_swing_low(bars: &[Candle], idx: usize, order: usize) -> bool {
    is_extremum(bars, idx, order, ExtremumKind::Low)
}

/// Every swing high and low of `order`, by index
pub fn swing_points(bars: &[Candle], order: usize) -> Vec<SwingPoint> {
    let mut points = Vec::new();
    for idx in 0..bars.len() {
        for kind in [ExtremumKind::High, ExtremumKind::Low] {
            if is_extremum(bars, idx, order, kind) {
                points.push(SwingPoint {
                    index: idx,
                    kind,
                    price: kind.price(&bars[idx]),
                    time: bars[idx].timestamp,
                });
            }
        }
    }
    points
}

/// Number of bars within `window` on each side that bar `idx` strictly dominates
pub fn dominated_neighbours(bars: &[Candle], idx: usize, kind: ExtremumKind, window: usize) -> u32 {
    let Some(pivot) = bars.get(idx).map(|c| kind.price(c)) else {
        return 0;
    };
    let start = idx.saturating_sub(window);
    let end = (idx + window).min(bars.len().saturating_sub(1));
    (start..=end)
        .filter(|&j| j != idx && kind.dominates(pivot, kind.price(&bars[j])))
        .count() as u32
}
