use chrono::{DateTime, Utc};

/// Wall-clock source. Remaining time is always recomputed from an absolute
/// deadline, so every time-dependent read goes through this trait and tests
/// can substitute a manually advanced clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub struct ManualClock {
    now_ms: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(epoch_ms: i64) -> Self {
        Self {
            now_ms: std::sync::atomic::AtomicI64::new(epoch_ms),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs * 1000);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.now_ms.load(std::sync::atomic::Ordering::SeqCst);
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }
}
