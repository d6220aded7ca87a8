//! Candidate levels and the bounded book detectors keep them in

use crate::strategy::Direction;
use chrono::{DateTime, Duration, Utc};

/// Anything stored in a [`LevelBook`]
pub trait Anchored {
    /// Time of the bar the candidate was derived from
    fn origin_time(&self) -> DateTime<Utc>;

    /// Whether `other` describes the same candidate found on an earlier rescan
    fn same_origin(&self, other: &Self) -> bool;
}

/// A price level with the reaction it is expected to produce
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLevel {
    pub price: f64,
    pub origin_time: DateTime<Utc>,
    /// Direction a signal must have to use this level
    pub bias: Direction,
    pub strength: u32,
    /// When price first swept or tested the level
    pub tested_at: Option<DateTime<Utc>>,
    /// Used up by a signal or invalidated by price
    pub consumed: bool,
}

impl CandidateLevel {
    pub fn new(price: f64, origin_time: DateTime<Utc>, bias: Direction) -> Self {
        Self {
            price,
            origin_time,
            bias,
            strength: 0,
            tested_at: None,
            consumed: false,
        }
    }

    pub fn with_strength(mut self, strength: u32) -> Self {
        self.strength = strength;
        self
    }

    pub fn is_tested(&self) -> bool {
        self.tested_at.is_some()
    }

    /// Record the first test only; returns whether this call set it
    pub fn mark_tested(&mut self, at: DateTime<Utc>) -> bool {
        if self.tested_at.is_some() {
            return false;
        }
        self.tested_at = Some(at);
        true
    }

    pub fn consume(&mut self) {
        self.consumed = true;
    }

    pub fn is_available(&self) -> bool {
        !self.consumed
    }

    /// Relative distance from `price` to the level
    pub fn distance_ratio(&self, price: f64) -> f64 {
        if self.price == 0.0 {
            return f64::INFINITY;
        }
        (price - self.price).abs() / self.price
    }
}

impl Anchored for CandidateLevel {
    fn origin_time(&self) -> DateTime<Utc> {
        self.origin_time
    }

    fn same_origin(&self, other: &Self) -> bool {
        self.origin_time == other.origin_time && self.bias == other.bias
    }
}

/// Candidates ordered by origin time, bounded by count and age.
///
/// Re-inserting a candidate found on an earlier rescan keeps the stored copy,
/// so tested/consumed state survives rescans.
#[derive(Debug, Clone)]
pub struct LevelBook<T> {
    items: Vec<T>,
    capacity: usize,
    retention: Duration,
}

impl<T: Anchored> LevelBook<T> {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            items: Vec::new(),
            capacity: capacity.max(1),
            retention,
        }
    }

    /// Insert unless already present; returns whether it was added
    pub fn insert(&mut self, item: T) -> bool {
        self.upsert(item, |_, _| {})
    }

    /// Insert, or hand the stored copy and the fresh one to `merge`
    pub fn upsert(&mut self, item: T, merge: impl FnOnce(&mut T, T)) -> bool {
        if let Some(existing) = self.items.iter_mut().find(|c| c.same_origin(&item)) {
            merge(existing, item);
            return false;
        }
        let at = self
            .items
            .partition_point(|c| c.origin_time() <= item.origin_time());
        self.items.insert(at, item);
        if self.items.len() > self.capacity {
            let excess = self.items.len() - self.capacity;
            self.items.drain(..excess);
        }
        true
    }

    /// Drop everything past retention; returns how many went
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.items.len();
        let cutoff = now - self.retention;
        self.items.retain(|c| c.origin_time() >= cutoff);
        before - self.items.len()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn newest_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    #[test]
    fn test_insert_orders_and_dedupes() {
        let mut book = LevelBook::new(10, Duration::days(7));
        assert!(book.insert(CandidateLevel::new(10.0, at(5), Direction::Long)));
        assert!(book.insert(CandidateLevel::new(12.0, at(1), Direction::Short)));

        let mut swept = CandidateLevel::new(10.0, at(5), Direction::Long);
        swept.mark_tested(at(6));
        book.iter_mut().last().unwrap().mark_tested(at(6));

        // same origin again keeps the stored state
        assert!(!book.insert(CandidateLevel::new(10.0, at(5), Direction::Long)));
        assert_eq!(book.len(), 2);
        assert_eq!(book.newest().unwrap(), &swept);
        assert_eq!(book.iter().next().unwrap().price, 12.0);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut book = LevelBook::new(2, Duration::days(7));
        for hour in 0..4 {
            book.insert(CandidateLevel::new(hour as f64, at(hour), Direction::Long));
        }
        let prices: Vec<f64> = book.iter().map(|c| c.price).collect();
        assert_eq!(prices, vec![2.0, 3.0]);
    }

    #[test]
    fn test_prune_by_retention() {
        let mut book = LevelBook::new(10, Duration::hours(24));
        book.insert(CandidateLevel::new(1.0, at(0), Direction::Long));
        book.insert(CandidateLevel::new(2.0, at(20), Direction::Long));

        assert_eq!(book.prune(at(30)), 1);
        assert_eq!(book.len(), 1);
        assert_eq!(book.newest().unwrap().price, 2.0);
    }

    #[test]
    fn test_mark_tested_once() {
        let mut level = CandidateLevel::new(1.0, at(0), Direction::Short);
        assert!(level.mark_tested(at(1)));
        assert!(!level.mark_tested(at(2)));
        assert_eq!(level.tested_at, Some(at(1)));
    }
}
