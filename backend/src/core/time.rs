//! Time management for the ledger
//!
//! The ledger operates on UTC calendar days. Yield and penalty idempotency is
//! keyed per account per day, so every engine asks a [`Clock`] for "today"
//! instead of reading the system time directly. Tests and replays use
//! [`FixedClock`] to pin or advance the date deterministically.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;

/// Source of the current instant
///
/// # Example
/// ```
/// use btz_ledger_core::core::time::{Clock, FixedClock};
/// use chrono::NaiveDate;
///
/// let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
/// assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
/// ```
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC calendar day
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
///
/// Starts at a given instant and only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Create a clock frozen at midnight UTC of `date`
    pub fn at_date(date: NaiveDate) -> Self {
        Self::new(start_of_day(date))
    }

    /// Move the clock to `now`
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move the clock to midnight UTC of `date`
    pub fn set_date(&self, date: NaiveDate) {
        self.set(start_of_day(date));
    }

    /// Advance the clock by whole days
    ///
    /// # Example
    /// ```
    /// use btz_ledger_core::core::time::{Clock, FixedClock};
    /// use chrono::NaiveDate;
    ///
    /// let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
    /// clock.advance_days(2);
    /// assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    /// ```
    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.lock();
        *now += Duration::days(days);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Whole calendar days from `from` to `to` (negative if `to` is earlier)
///
/// # Example
/// ```
/// use btz_ledger_core::core::time::days_between;
/// use chrono::NaiveDate;
///
/// let a = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
/// let b = NaiveDate::from_ymd_opt(2024, 2, 2).unwrap();
/// assert_eq!(days_between(a, b), 3);
/// ```
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}
