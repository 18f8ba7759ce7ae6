//! Time-of-day discharge window.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone};

use crate::{core::interval::Interval, prelude::*};

#[derive(Debug, thiserror::Error)]
#[error("`{value}` is not a valid time of day, expected `HH:MM`")]
pub struct TimeFormatError {
    value: String,

    #[source]
    source: chrono::ParseError,
}

/// Hours and minutes without a date.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct TimeOfDay(NaiveTime);

impl FromStr for TimeOfDay {
    type Err = TimeFormatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .map(Self)
            .map_err(|source| TimeFormatError { value: value.to_owned(), source })
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DischargeWindow {
    pub start: TimeOfDay,
    pub stop: TimeOfDay,
}

impl DischargeWindow {
    pub fn parse(start: &str, stop: &str) -> Result<Self, TimeFormatError> {
        Ok(Self { start: start.parse()?, stop: stop.parse()? })
    }

    /// Window like `22:00..06:00` which stops on the next day.
    #[must_use]
    pub fn wraps_midnight(self) -> bool {
        self.start > self.stop
    }

    /// The window occurrence which starts on the specified date.
    fn occurrence(self, on: NaiveDate) -> Interval {
        let start = on.and_time(self.start.0);
        let mut stop = on.and_time(self.stop.0);
        if self.wraps_midnight() {
            stop += TimeDelta::days(1);
        }
        Interval::new(start, stop)
    }

    /// Check whether `now` falls into today's occurrence of the window,
    /// or into yesterday's one which may still be running past midnight.
    #[must_use]
    pub fn contains<Tz: TimeZone>(self, now: &DateTime<Tz>) -> bool {
        let now = now.naive_local();
        let today = now.date();
        self.occurrence(today).contains(now)
            || today
                .checked_sub_days(Days::new(1))
                .is_some_and(|yesterday| self.occurrence(yesterday).contains(now))
    }
}

impl Display for DischargeWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.stop)
    }
}

/// Fail-closed window check: a malformed time means «not time to discharge».
pub fn is_within_window<Tz: TimeZone>(now: &DateTime<Tz>, start: &str, stop: &str) -> bool {
    match DischargeWindow::parse(start, stop) {
        Ok(window) => window.contains(now),
        Err(error) => {
            debug!(start, stop, "not time to discharge: {error}");
            false
        }
    }
}
