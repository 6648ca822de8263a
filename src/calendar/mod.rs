//! Market clock and trading-session calendar
//!
//! Maps wall time to a session tag, classifies days (regular, half, holiday,
//! weekend), and resolves trading-day arithmetic. Everything is a pure
//! function of exchange-local date-time plus the injected holiday and
//! half-day sets, so the same instant always classifies the same way.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use std::collections::HashSet;

use crate::types::Session;

/// Minute-of-day for the regular 16:00 close
const REGULAR_CLOSE_MIN: u32 = 960;
/// Minute-of-day for the 13:00 half-day close
const HALF_DAY_CLOSE_MIN: u32 = 780;
/// Minute-of-day for the 9:30 open
const OPEN_MIN: u32 = 570;
/// Pre-market starts at 4:00
const PRE_MARKET_MIN: u32 = 240;

/// Exchange calendar with injected holiday and half-day sets
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    tz: Tz,
    holidays: HashSet<NaiveDate>,
    half_days: HashSet<NaiveDate>,
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::new(default_holidays(), default_half_days())
    }
}

impl MarketCalendar {
    pub fn new(holidays: HashSet<NaiveDate>, half_days: HashSet<NaiveDate>) -> Self {
        Self {
            tz: New_York,
            holidays,
            half_days,
        }
    }

    /// Session tag for the current instant
    pub fn session(&self) -> Session {
        self.session_at(Utc::now())
    }

    /// Session tag for an arbitrary instant
    pub fn session_at(&self, at: DateTime<Utc>) -> Session {
        let local = at.with_timezone(&self.tz);
        let date = local.date_naive();

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return Session::ClosedWeekend;
        }
        if self.holidays.contains(&date) {
            return Session::ClosedHoliday;
        }

        let close = self.close_minute(date);
        let m = local.hour() * 60 + local.minute();

        if m < PRE_MARKET_MIN || m >= close {
            Session::Closed
        } else if m < OPEN_MIN {
            Session::PreMarket
        } else if m < 600.min(close) {
            Session::OpeningRange
        } else if m < 720.min(close) {
            Session::Morning
        } else if m < HALF_DAY_CLOSE_MIN.min(close) {
            Session::Afternoon
        } else {
            Session::PowerHour
        }
    }

    /// Regular-hours close minute for a date
    fn close_minute(&self, date: NaiveDate) -> u32 {
        if self.half_days.contains(&date) {
            HALF_DAY_CLOSE_MIN
        } else {
            REGULAR_CLOSE_MIN
        }
    }

    /// True if the exchange opens at all on this date
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// First trading day strictly after `date`
    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        self.add_trading_days(date, 1)
    }

    /// Advance `n` trading days, skipping weekends and holidays
    pub fn add_trading_days(&self, date: NaiveDate, n: u32) -> NaiveDate {
        let mut d = date;
        let mut remaining = n;
        while remaining > 0 {
            d += Duration::days(1);
            if self.is_trading_day(d) {
                remaining -= 1;
            }
        }
        d
    }

    /// Minutes elapsed since the 9:30 open (negative before the open)
    pub fn minutes_since_open(&self, at: DateTime<Utc>) -> i64 {
        let local = at.with_timezone(&self.tz);
        let m = (local.hour() * 60 + local.minute()) as i64;
        m - OPEN_MIN as i64
    }

    /// Minutes until today's close (negative after the close)
    pub fn minutes_to_close(&self, at: DateTime<Utc>) -> i64 {
        let local = at.with_timezone(&self.tz);
        let close = self.close_minute(local.date_naive()) as i64;
        let m = (local.hour() * 60 + local.minute()) as i64;
        close - m
    }

    /// Exchange-local date for an instant
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// Start of the exchange-local day containing `at`, as a UTC instant
    pub fn local_midnight_utc(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = self.local_date(at).and_hms_opt(0, 0, 0).expect("valid midnight");
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(at)
    }

    /// True when the exchange-local day is a Friday
    pub fn is_friday(&self, at: DateTime<Utc>) -> bool {
        at.with_timezone(&self.tz).weekday() == Weekday::Fri
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("static calendar date")
}

/// Default NYSE full-closure table, 2024 through 2026
pub fn default_holidays() -> HashSet<NaiveDate> {
    [
        // 2024
        d(2024, 1, 1),
        d(2024, 1, 15),
        d(2024, 2, 19),
        d(2024, 3, 29),
        d(2024, 5, 27),
        d(2024, 6, 19),
        d(2024, 7, 4),
        d(2024, 9, 2),
        d(2024, 11, 28),
        d(2024, 12, 25),
        // 2025
        d(2025, 1, 1),
        d(2025, 1, 20),
        d(2025, 2, 17),
        d(2025, 4, 18),
        d(2025, 5, 26),
        d(2025, 6, 19),
        d(2025, 7, 4),
        d(2025, 9, 1),
        d(2025, 11, 27),
        d(2025, 12, 25),
        // 2026
        d(2026, 1, 1),
        d(2026, 1, 19),
        d(2026, 2, 16),
        d(2026, 4, 3),
        d(2026, 5, 25),
        d(2026, 6, 19),
        d(2026, 7, 3),
        d(2026, 9, 7),
        d(2026, 11, 26),
        d(2026, 12, 25),
    ]
    .into_iter()
    .collect()
}

/// Default NYSE early-close (13:00) table, 2024 through 2026
pub fn default_half_days() -> HashSet<NaiveDate> {
    [
        d(2024, 7, 3),
        d(2024, 11, 29),
        d(2024, 12, 24),
        d(2025, 7, 3),
        d(2025, 11, 28),
        d(2025, 12, 24),
        d(2026, 11, 27),
        d(2026, 12, 24),
    ]
    .into_iter()
    .collect()
}
