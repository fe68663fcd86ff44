//! Injectable time source.
//!
//! Every day-boundary decision (streaks, daily tasks, weekly resets) goes through a [`Clock`]
//! and compares normalized calendar dates, never formatted strings.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Supplies the current instant and calendar dates.
///
/// `today` and `date_of` must agree on one calendar, so stored timestamps and the current day
/// are always compared in the same timezone.
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date of `at` in this clock's timezone
    fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.date_naive()
    }

    /// Current calendar date with the time of day stripped
    fn today(&self) -> NaiveDate {
        self.date_of(self.now())
    }
}

/// Wall clock. Calendar days follow the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&Local).date_naive()
    }
}

/// Clock that only moves when told to. Calendar days follow a fixed UTC offset.
#[derive(Debug)]
pub struct ManualClock {
    epoch_seconds: AtomicI64,
    offset: FixedOffset,
}

impl ManualClock {
    /// Creates a clock frozen at `at` whose days are UTC days.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self::with_offset(at, Utc.fix())
    }

    /// Creates a clock frozen at `at` whose days follow `offset`.
    #[must_use]
    pub fn with_offset(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            epoch_seconds: AtomicI64::new(at.timestamp()),
            offset,
        }
    }

    /// Jumps to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        self.epoch_seconds.store(at.timestamp(), Ordering::SeqCst);
    }

    /// Moves the clock forward by whole days.
    pub fn advance_days(&self, days: i64) {
        self.epoch_seconds.fetch_add(days * 86_400, Ordering::SeqCst);
    }

    /// Moves the clock forward by seconds.
    pub fn advance_seconds(&self, seconds: i64) {
        self.epoch_seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.epoch_seconds.load(Ordering::SeqCst), 0).unwrap_or_default()
    }

    fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}

/// Whole calendar days from `earlier` to `later`. Negative when `later` precedes `earlier`.
#[must_use]
pub fn day_diff(later: NaiveDate, earlier: NaiveDate) -> i64 {
    later.signed_duration_since(earlier).num_days()
}

/// Whole calendar days elapsed between the date of `timestamp` and today, both in the
/// calendar of `clock`.
#[must_use]
pub fn days_since(clock: &dyn Clock, timestamp: DateTime<Utc>) -> i64 {
    day_diff(clock.today(), clock.date_of(timestamp))
}
