use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

use crate::session::clock::Clock;

pub const POLL_INTERVAL_MS: u64 = 250; // Recompute remaining from the deadline four times a second

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Remaining whole seconds, recomputed from the deadline.
    Tick(u32),
    /// Sent exactly once, after the final `Tick(0)`.
    Expired,
}

pub type TimerSender = mpsc::UnboundedSender<TimerEvent>;
pub type TimerReceiver = mpsc::UnboundedReceiver<TimerEvent>;

pub fn create_timer_channel() -> (TimerSender, TimerReceiver) {
    mpsc::unbounded_channel()
}

/// Remaining whole seconds until `deadline` as the display should show it.
/// Never negative: a process that slept past the deadline lands on 0 on its
/// first poll.
pub fn remaining_at(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let ms = (deadline - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        ((ms as f64) / 1000.0).round() as u32
    }
}

/// Drives wall-clock elapse into tick and expiry events. Holds the one
/// polling task as an abortable handle; starting always cancels the previous
/// task first, so at most one poller is ever alive.
pub struct Countdown {
    poll_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new(poll_interval_ms: u64) -> Self {
        Countdown {
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            handle: None,
        }
    }

    /// Start polling toward `now + remaining_seconds`. The deadline is fixed
    /// here; each poll recomputes remaining from it rather than counting
    /// down, so callback jitter cannot accumulate.
    pub fn start(&mut self, remaining_seconds: u32, clock: Arc<dyn Clock>, events: TimerSender) {
        self.cancel();
        let deadline = clock.now() + chrono::Duration::seconds(remaining_seconds as i64);
        let poll_interval = self.poll_interval;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            loop {
                ticker.tick().await;
                let remaining = remaining_at(deadline, clock.now());
                if events.send(TimerEvent::Tick(remaining)).is_err() {
                    break;
                }
                if remaining == 0 {
                    let _ = events.send(TimerEvent::Expired);
                    break;
                }
            }
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}
