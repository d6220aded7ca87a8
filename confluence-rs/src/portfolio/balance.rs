//! Account metrics and session bookkeeping

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Account metrics as reported by the venue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Realized balance
    pub balance: f64,
    /// Balance plus floating profit
    pub equity: f64,
    /// Margin held by open positions
    pub margin: f64,
    pub free_margin: f64,
}

impl AccountSnapshot {
    /// Flat account with no open positions
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            equity: balance,
            margin: 0.0,
            free_margin: balance,
        }
    }

    /// Equity over used margin in percent; `None` with no margin in use
    pub fn margin_level(&self) -> Option<f64> {
        if self.margin > 0.0 {
            Some(self.equity / self.margin * 100.0)
        } else {
            None
        }
    }

    /// Margin level once `additional` margin is committed
    pub fn margin_level_after(&self, additional: f64) -> Option<f64> {
        let margin = self.margin + additional;
        if margin > 0.0 {
            Some(self.equity / margin * 100.0)
        } else {
            None
        }
    }

    /// Check if `margin` fits in the given share of free margin
    pub fn can_afford(&self, margin: f64, max_usage: f64) -> bool {
        margin <= self.free_margin * max_usage
    }
}

/// Calendar-day session in a configured timezone.
///
/// Keeps the balance the session started with and the peak equity seen,
/// for the daily loss and drawdown gates.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    timezone: Tz,
    day: Option<NaiveDate>,
    start_balance: f64,
    peak_equity: f64,
}

impl SessionTracker {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            day: None,
            start_balance: 0.0,
            peak_equity: 0.0,
        }
    }

    /// Track `account` at `now`; returns true when a new session began
    pub fn observe(&mut self, now: DateTime<Utc>, account: &AccountSnapshot) -> bool {
        let today = now.with_timezone(&self.timezone).date_naive();
        self.peak_equity = self.peak_equity.max(account.equity);

        if self.day == Some(today) {
            return false;
        }
        let first = self.day.is_none();
        self.day = Some(today);
        self.start_balance = account.balance;
        if first {
            self.peak_equity = account.equity;
        }
        info!(session = %today, start_balance = account.balance, "session started");
        true
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.day
    }

    pub fn start_balance(&self) -> f64 {
        self.start_balance
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_margin_level() {
        let mut account = AccountSnapshot::new(10_000.0);
        assert_eq!(account.margin_level(), None);
        assert_eq!(account.margin_level_after(500.0), Some(2000.0));
        account.margin = 2_000.0;
        account.free_margin = 8_000.0;
        assert_eq!(account.margin_level(), Some(500.0));
        assert!(account.can_afford(6_400.0, 0.8));
        assert!(!account.can_afford(6_401.0, 0.8));
    }

    #[test]
    fn test_session_rolls_over_in_local_day() {
        let mut session = SessionTracker::new(chrono_tz::America::New_York);
        let account = AccountSnapshot::new(10_000.0);

        // 2024-01-02 03:00 UTC is still Jan 1 in New York
        let night = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        assert!(session.observe(night, &account));
        assert_eq!(session.day(), NaiveDate::from_ymd_opt(2024, 1, 1));

        let later = Utc.with_ymd_and_hms(2024, 1, 2, 4, 0, 0).unwrap();
        assert!(!session.observe(later, &AccountSnapshot::new(9_500.0)));
        assert_eq!(session.start_balance(), 10_000.0);

        let morning = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap();
        assert!(session.observe(morning, &AccountSnapshot::new(9_500.0)));
        assert_eq!(session.start_balance(), 9_500.0);
        assert_eq!(session.peak_equity(), 10_000.0);
    }
}
