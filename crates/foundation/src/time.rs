use chrono::{DateTime, FixedOffset, Local};

/// Wall-clock instant in the viewer's local offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub DateTime<FixedOffset>);

impl Timestamp {
    /// `HH:MM` label used on reply entries, in the instant's own offset.
    pub fn label(self) -> String {
        self.0.format("%H:%M").to_string()
    }
}

/// Source of timestamps, injectable so reply threads stay testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Reads the system clock in the local timezone.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(Local::now().fixed_offset())
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Copy, Clone)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
