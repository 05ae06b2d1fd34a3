// src/runlog/clock.rs

use std::fmt::Debug;

use chrono::{Local, NaiveDateTime};

/// Source of wall-clock timestamps for log records and leases.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> NaiveDateTime;
}

/// Local time of the host, matching what operators see in the scheduler UI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
