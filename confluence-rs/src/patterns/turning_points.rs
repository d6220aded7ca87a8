//! Turning point model
//!
//! Strict extrema per configured timeframe, scored by how many neighbours
//! they dominate. Longs need a fresh turning low below entry, shorts a fresh
//! turning high above it.

use crate::config::{PatternConfig, TurningFrame, TurningPointConfig};
use crate::data::{MarketDataFeed, NewBarGate};
use crate::patterns::extrema::{dominated_neighbours, swing_points};
use crate::patterns::levels::{CandidateLevel, LevelBook};
use crate::patterns::PatternDetector;
use crate::strategy::EntrySignal;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

struct FrameBook {
    frame: TurningFrame,
    points: LevelBook<CandidateLevel>,
    gate: NewBarGate,
}

/// Age, strength and proximity limits a point must meet to confirm
#[derive(Debug, Clone, Copy)]
struct MatchRule {
    max_age: Duration,
    min_strength: u32,
    proximity: f64,
}

impl MatchRule {
    fn admits(&self, level: &CandidateLevel, signal: &EntrySignal) -> bool {
        level.is_available()
            && level.bias == signal.direction
            && signal.timestamp - level.origin_time < self.max_age
            && level.strength >= self.min_strength
            && signal.direction.is_beyond(signal.entry_price, level.price)
            && level.distance_ratio(signal.entry_price) <= self.proximity
    }
}

pub struct TurningPoints {
    config: TurningPointConfig,
    frames: Vec<FrameBook>,
}

impl TurningPoints {
    pub fn new(config: TurningPointConfig, patterns: &PatternConfig) -> Self {
        let retention = Duration::hours(patterns.retention_hours);
        let frames = config
            .frames
            .iter()
            .map(|frame| FrameBook {
                frame: *frame,
                points: LevelBook::new(patterns.capacity, retention),
                gate: NewBarGate::new(),
            })
            .collect();
        Self { config, frames }
    }

    fn rule(&self) -> MatchRule {
        MatchRule {
            max_age: Duration::hours(self.config.max_age_hours),
            min_strength: self.config.min_strength,
            proximity: self.config.proximity_band,
        }
    }

    /// Turning points currently held for one timeframe
    pub fn points(&self, index: usize) -> Option<&LevelBook<CandidateLevel>> {
        self.frames.get(index).map(|f| &f.points)
    }
}

impl PatternDetector for TurningPoints {
    fn name(&self) -> &'static str {
        "turning_points"
    }

    fn rescan(&mut self, feed: &dyn MarketDataFeed, symbol: &str, now: DateTime<Utc>) {
        let window = self.config.strength_window;
        let lookback = self.config.lookback;

        for book in &mut self.frames {
            let tf = book.frame.timeframe;
            if book.gate.is_new_bar(tf, feed.latest_bar_time(symbol, tf)) {
                if let Some(bars) = feed.bars(symbol, tf, lookback) {
                    for point in swing_points(&bars, book.frame.order) {
                        let strength = dominated_neighbours(&bars, point.index, point.kind, window);
                        let level = CandidateLevel::new(point.price, point.time, point.kind.bias())
                            .with_strength(strength);
                        // right-hand neighbours keep arriving, so strength may grow
                        book.points.upsert(level, |stored, fresh| {
                            stored.strength = stored.strength.max(fresh.strength);
                        });
                    }

                    for level in book.points.iter_mut().filter(|l| l.is_available()) {
                        let broken = bars.iter().any(|b| {
                            b.timestamp > level.origin_time
                                && level.bias.opposite().is_beyond(b.close, level.price)
                        });
                        if broken {
                            level.consume();
                        }
                    }
                }
            }
            book.points.prune(now);
        }
    }

    fn validate(&self, signal: &EntrySignal) -> bool {
        let rule = self.rule();
        self.frames
            .iter()
            .any(|book| book.points.iter().any(|l| rule.admits(l, signal)))
    }

    fn commit(&mut self, signal: &EntrySignal) {
        let rule = self.rule();
        for book in &mut self.frames {
            let matched = book.points.iter_mut().rev().find(|l| rule.admits(l, signal));
            if let Some(level) = matched {
                debug!(
                    timeframe = %book.frame.timeframe,
                    price = level.price,
                    strength = level.strength,
                    "turning point used"
                );
                level.consume();
                return;
            }
        }
    }

    fn candidate_count(&self) -> usize {
        self.frames
            .iter()
            .map(|f| f.points.iter().filter(|l| l.is_available()).count())
            .sum()
    }
}
