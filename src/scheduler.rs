//! Timers and clocks
//!
//! Every time-driven part of the engine (poll ticks, retention sweeps,
//! concealment expiry, the delayed paste keystroke) goes through the
//! [`Scheduler`] trait so tests can drive time by hand.
//!
//! Timer tasks never touch engine state directly. They post a message to the
//! owning context and return.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// A one-shot task run by a timer.
pub type OnceTask = Box<dyn FnOnce() + Send + 'static>;

/// A repeating task run on every tick of a periodic timer.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Source of wall-clock time in epoch milliseconds (UTC).
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Creates cancellable timers.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn after(&self, delay: Duration, task: OnceTask) -> TimerHandle;

    /// Run `task` every `interval`. `tolerance` is how late a tick may be
    /// delivered before the scheduler treats it as drift.
    fn every(&self, interval: Duration, tolerance: Duration, task: RepeatingTask) -> TimerHandle;
}

#[derive(Debug, Default)]
struct TimerState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Handle to a scheduled timer.
///
/// Dropping the handle does NOT cancel the timer; call [`TimerHandle::cancel`].
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    state: Arc<TimerState>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the timer. Idempotent; a task already running is not interrupted.
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Block until `deadline` or cancellation. Returns true if cancelled.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            if self
                .state
                .wake
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *cancelled
    }
}

/// [`Scheduler`] that parks one thread per timer.
///
/// The engine holds at most a handful of long-lived timers plus one per
/// concealed item, so a thread each is affordable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for ThreadScheduler {
    fn after(&self, delay: Duration, task: OnceTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();
        let deadline = Instant::now() + delay;

        let spawned = thread::Builder::new()
            .name("clipkeep-timer".to_string())
            .spawn(move || {
                if timer.wait_until(deadline) {
                    trace!("One-shot timer cancelled before firing");
                    return;
                }
                task();
            });

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn timer thread");
            handle.cancel();
        }
        handle
    }

    fn every(&self, interval: Duration, tolerance: Duration, mut task: RepeatingTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();

        let spawned = thread::Builder::new()
            .name("clipkeep-interval".to_string())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                loop {
                    if timer.wait_until(next) {
                        debug!(interval_ms = interval.as_millis() as u64, "Interval timer stopped");
                        return;
                    }
                    task();

                    let now = Instant::now();
                    next += interval;
                    if now > next + tolerance {
                        // Fell behind (system sleep, long task): skip missed ticks.
                        debug!(
                            late_ms = (now - next).as_millis() as u64,
                            "Interval timer drifted, resynchronizing"
                        );
                        next = now + interval;
                    }
                }
            });

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn interval timer thread");
            handle.cancel();
        }
        handle
    }
}
