use std::sync::Mutex;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use flowchain::runlog::Clock;

/// Clock that starts at a fixed instant and advances by `step` on every
/// reading, so consecutive log records get distinct, predictable times.
#[derive(Debug)]
pub struct StepClock {
    next: Mutex<NaiveDateTime>,
    step: Duration,
}

impl StepClock {
    pub fn new(start: NaiveDateTime, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }

    /// 2026-10-17 09:00:00, one second per reading: the monthly trigger
    /// firing on the 17th.
    pub fn monthly_run() -> Self {
        let start = NaiveDate::from_ymd_opt(2026, 10, 17)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("valid start time");
        Self::new(start, Duration::seconds(1))
    }
}

impl Clock for StepClock {
    fn now(&self) -> NaiveDateTime {
        let mut next = self.next.lock().unwrap();
        let now = *next;
        *next = now + self.step;
        now
    }
}
