//! Pattern models
//!
//! Each detector keeps its own rolling candidates, refreshes them on
//! `rescan` and answers `validate` for a candidate signal. Detectors never
//! fail: missing data simply leaves them with nothing to confirm.

pub mod extrema;
pub mod institutional;
pub mod levels;
pub mod liquidity;
pub mod retracement;
pub mod turning_points;

pub use extrema::*;
pub use institutional::*;
pub use levels::*;
pub use liquidity::*;
pub use retracement::*;
pub use turning_points::*;

use crate::config::{ModelToggles, PatternConfig};
use crate::data::MarketDataFeed;
use crate::strategy::EntrySignal;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Common contract of the pattern models
pub trait PatternDetector {
    /// Stable model name, credited on confirmed signals
    fn name(&self) -> &'static str;

    /// Refresh candidates from the feed and prune past retention.
    ///
    /// Detectors gate themselves on new bars of their own timeframes, so this
    /// may be called on every tick.
    fn rescan(&mut self, feed: &dyn MarketDataFeed, symbol: &str, now: DateTime<Utc>);

    /// Whether the signal is confirmed. Never changes candidate state.
    fn validate(&self, signal: &EntrySignal) -> bool;

    /// The signal was traded: use up the candidate that confirmed it.
    fn commit(&mut self, _signal: &EntrySignal) {}

    /// Candidates still able to confirm a signal
    fn candidate_count(&self) -> usize;
}

/// The enabled detectors, consulted together
#[derive(Default)]
pub struct PatternLibrary {
    detectors: Vec<Box<dyn PatternDetector>>,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PatternConfig, models: &ModelToggles) -> Self {
        let mut library = Self::new();
        if models.liquidity {
            library.push(Box::new(LiquidityZones::new(config.liquidity.clone(), config)));
        }
        if models.retracement {
            library.push(Box::new(RetracementLevels::new(config.retracement.clone(), config)));
        }
        if models.turning_points {
            library.push(Box::new(TurningPoints::new(config.turning_points.clone(), config)));
        }
        if models.institutional {
            library.push(Box::new(InstitutionalZones::new(config.institutional.clone(), config)));
        }
        library
    }

    pub fn push(&mut self, detector: Box<dyn PatternDetector>) {
        self.detectors.push(detector);
    }

    pub fn rescan(&mut self, feed: &dyn MarketDataFeed, symbol: &str, now: DateTime<Utc>) {
        for detector in &mut self.detectors {
            detector.rescan(feed, symbol, now);
        }
    }

    /// Names of every detector that confirms `signal`.
    ///
    /// All detectors are asked, not just until the first yes.
    pub fn confirmations(&self, signal: &EntrySignal) -> Vec<String> {
        let mut confirmed = Vec::new();
        for detector in &self.detectors {
            if detector.validate(signal) {
                confirmed.push(detector.name().to_string());
            } else {
                debug!(model = detector.name(), "model did not confirm");
            }
        }
        confirmed
    }

    /// Consume the candidates of every model credited on `signal`
    pub fn commit(&mut self, signal: &EntrySignal) {
        for detector in &mut self.detectors {
            if signal.confirmations.iter().any(|name| name == detector.name()) {
                detector.commit(signal);
            }
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn candidate_count(&self) -> usize {
        self.detectors.iter().map(|d| d.candidate_count()).sum()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}
