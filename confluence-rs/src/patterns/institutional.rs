//! Institutional zone model
//!
//! The range of a strong-bodied bar followed by continuation is a zone that
//! stays virgin until a later bar trades back into it.

use crate::config::{InstitutionalConfig, PatternConfig};
use crate::data::{Candle, MarketDataFeed, NewBarGate};
use crate::patterns::levels::{Anchored, LevelBook};
use crate::patterns::PatternDetector;
use crate::strategy::{Direction, EntrySignal};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstitutionalZone {
    pub low: f64,
    pub high: f64,
    pub origin_time: DateTime<Utc>,
    /// Long for a bullish impulse (demand), short for bearish (supply)
    pub bias: Direction,
    pub virgin: bool,
    /// Last bar already checked for overlap
    pub checked_through: DateTime<Utc>,
}

impl InstitutionalZone {
    /// Edge facing the trade: top of demand, bottom of supply
    pub fn near_edge(&self) -> f64 {
        match self.bias {
            Direction::Long => self.high,
            Direction::Short => self.low,
        }
    }

    /// Distance from the near edge of the zone to `price`, relative to that edge
    fn gap_ratio(&self, price: f64) -> f64 {
        let edge = self.near_edge();
        if edge == 0.0 {
            return f64::INFINITY;
        }
        (price - edge).abs() / edge
    }
}

impl Anchored for InstitutionalZone {
    fn origin_time(&self) -> DateTime<Utc> {
        self.origin_time
    }

    fn same_origin(&self, other: &Self) -> bool {
        self.origin_time == other.origin_time
    }
}

/// Zone formed by `bars[idx]`, if it is an impulse followed by continuation
pub fn zone_at(bars: &[Candle], idx: usize, config: &InstitutionalConfig) -> Option<InstitutionalZone> {
    let impulse = bars.get(idx)?;
    if impulse.body_ratio() < config.min_body_ratio {
        return None;
    }
    let bias = if impulse.is_bullish() {
        Direction::Long
    } else if impulse.is_bearish() {
        Direction::Short
    } else {
        return None;
    };

    let follow = bars.get(idx + 1..=idx + config.continuation_bars)?;
    let mut previous_close = impulse.close;
    for bar in follow {
        if !bias.is_beyond(bar.close, previous_close) {
            return None;
        }
        previous_close = bar.close;
    }

    let last = follow.last().unwrap_or(impulse);
    Some(InstitutionalZone {
        low: impulse.low,
        high: impulse.high,
        origin_time: impulse.timestamp,
        bias,
        virgin: true,
        checked_through: last.timestamp,
    })
}

pub struct InstitutionalZones {
    config: InstitutionalConfig,
    zones: LevelBook<InstitutionalZone>,
    gate: NewBarGate,
}

impl InstitutionalZones {
    pub fn new(config: InstitutionalConfig, patterns: &PatternConfig) -> Self {
        Self {
            config,
            zones: LevelBook::new(patterns.capacity, Duration::hours(patterns.retention_hours)),
            gate: NewBarGate::new(),
        }
    }

    pub fn zones(&self) -> &LevelBook<InstitutionalZone> {
        &self.zones
    }

    /// Check only bars newer than each zone's watermark
    fn update_virginity(&mut self, bars: &[Candle]) {
        for zone in self.zones.iter_mut().filter(|z| z.virgin) {
            let since = zone.checked_through;
            for bar in bars.iter().filter(|b| b.timestamp > since) {
                zone.checked_through = bar.timestamp;
                if bar.overlaps(zone.low, zone.high) {
                    zone.virgin = false;
                    break;
                }
            }
        }
    }
}

impl PatternDetector for InstitutionalZones {
    fn name(&self) -> &'static str {
        "institutional"
    }

    fn rescan(&mut self, feed: &dyn MarketDataFeed, symbol: &str, now: DateTime<Utc>) {
        let tf = self.config.timeframe;
        if self.gate.is_new_bar(tf, feed.latest_bar_time(symbol, tf)) {
            if let Some(bars) = feed.bars(symbol, tf, self.config.lookback) {
                for idx in 0..bars.len() {
                    if let Some(zone) = zone_at(&bars, idx, &self.config) {
                        self.zones.insert(zone);
                    }
                }
                self.update_virginity(&bars);
            }
        }
        self.zones.prune(now);
    }

    fn validate(&self, signal: &EntrySignal) -> bool {
        let proximity = self.config.proximity_band;
        self.zones.iter().rev().any(|zone| {
            zone.virgin
                && zone.bias == signal.direction
                && signal.direction.is_beyond(signal.entry_price, zone.near_edge())
                && zone.gap_ratio(signal.entry_price) <= proximity
        })
    }

    fn candidate_count(&self) -> usize {
        self.zones.iter().filter(|z| z.virgin).count()
    }
}
