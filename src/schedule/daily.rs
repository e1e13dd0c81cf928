//! Daily Schedule - Fixed-time daily trigger for dispatch runs
//!
//! Parses an "HH:MM" wall-clock time (UTC) and computes the next firing
//! instant. The runner sleeps until that instant, invokes the dispatch
//! callback, then rearms for the following day.

use crate::core::error::DispatchError;
use chrono::{DateTime, Days, NaiveTime, Utc};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Daily firing time in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    time: NaiveTime,
}

impl DailySchedule {
    /// Parse an "HH:MM" wall-clock time
    ///
    /// # Examples
    ///
    /// ```
    /// use release_dispatcher::schedule::DailySchedule;
    ///
    /// let schedule = DailySchedule::parse("07:59").unwrap();
    /// assert_eq!(schedule.to_string(), "07:59");
    ///
    /// assert!(DailySchedule::parse("25:00").is_err());
    /// ```
    pub fn parse(value: &str) -> Result<Self, DispatchError> {
        let time = NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| {
            DispatchError::InvalidScheduleTime {
                value: value.to_string(),
            }
        })?;
        Ok(Self { time })
    }

    /// Scheduled wall-clock time
    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// Next firing instant strictly after `now`
    ///
    /// Today's occurrence when it is still ahead, otherwise tomorrow's.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.time).and_utc();
        if today > now {
            today
        } else {
            (now.date_naive() + Days::new(1)).and_time(self.time).and_utc()
        }
    }

    /// Time remaining until the next firing instant
    pub fn until_next(&self, now: DateTime<Utc>) -> Duration {
        let next = self.next_fire_after(now);
        (next - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.format("%H:%M"))
    }
}

/// Drives a callback once per day at the scheduled time
pub struct ScheduleRunner {
    schedule: DailySchedule,
}

impl ScheduleRunner {
    /// Create a runner for the given schedule
    pub fn new(schedule: DailySchedule) -> Self {
        Self { schedule }
    }

    /// Run until the process is stopped, invoking `task` at each firing time
    ///
    /// The firing instant is passed to the callback. A slow callback delays
    /// the next firing but never skips ahead: rearming happens after the
    /// callback returns.
    pub async fn run<F, Fut>(&self, mut task: F)
    where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let now = Utc::now();
            let next = self.schedule.next_fire_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            println!("⏰ 次回の実行予定: {} UTC", next.format("%Y-%m-%d %H:%M"));
            sleep(wait).await;

            task(next).await;
        }
    }
}
