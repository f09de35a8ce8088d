//! Fakes for the engine's boundaries, shared by the unit tests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use super::asset_worker::AssetCleaner;
use super::monitor::SourceAppProvider;
use super::paste::{InputSynthesizer, PermissionBoundary, PresentingSurface};
use super::types::SourceApp;
use crate::scheduler::{Clock, OnceTask, RepeatingTask, Scheduler, TimerHandle};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

enum ManualTask {
    Once(OnceTask),
    Repeat {
        interval: Duration,
        task: RepeatingTask,
    },
}

struct ManualTimer {
    due: Duration,
    seq: u64,
    handle: TimerHandle,
    task: ManualTask,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    timers: Vec<ManualTimer>,
    tolerances: Vec<Duration>,
}

/// Scheduler driven by [`ManualScheduler::advance`]. Due tasks run on the
/// calling thread in deadline order.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, delay: Duration, task: ManualTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.timers.push(ManualTimer {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }

    /// Live timers that have not been cancelled.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .timers
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// Tolerances passed to `every`, in registration order.
    pub fn tolerances(&self) -> Vec<Duration> {
        self.state.lock().tolerances.clone()
    }

    /// Move time forward by `by`, running every task that comes due.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;
        loop {
            let next = {
                let mut state = self.state.lock();
                state.timers.retain(|t| !t.handle.is_cancelled());
                let position = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.seq))
                    .map(|(i, _)| i);
                match position {
                    Some(i) => {
                        let timer = state.timers.swap_remove(i);
                        state.now = timer.due;
                        Some(timer)
                    }
                    None => None,
                }
            };

            let Some(timer) = next else {
                break;
            };

            match timer.task {
                ManualTask::Once(task) => task(),
                ManualTask::Repeat { interval, mut task } => {
                    task();
                    if !timer.handle.is_cancelled() {
                        let mut state = self.state.lock();
                        let seq = state.next_seq;
                        state.next_seq += 1;
                        state.timers.push(ManualTimer {
                            due: timer.due + interval,
                            seq,
                            handle: timer.handle,
                            task: ManualTask::Repeat { interval, task },
                        });
                    }
                }
            }
        }
        self.state.lock().now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: OnceTask) -> TimerHandle {
        self.push(delay, ManualTask::Once(task))
    }

    fn every(&self, interval: Duration, tolerance: Duration, task: RepeatingTask) -> TimerHandle {
        self.state.lock().tolerances.push(tolerance);
        self.push(interval, ManualTask::Repeat { interval, task })
    }
}

#[derive(Debug)]
pub struct FakePermissions {
    permitted: AtomicBool,
    secure_input: AtomicBool,
    queries: AtomicUsize,
}

impl FakePermissions {
    pub fn granted() -> Self {
        Self {
            permitted: AtomicBool::new(true),
            secure_input: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    pub fn set_secure_input(&self, active: bool) {
        self.secure_input.store(active, Ordering::SeqCst);
    }

    pub fn permission_queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl PermissionBoundary for FakePermissions {
    fn is_input_synthesis_permitted(&self) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.permitted.load(Ordering::SeqCst)
    }

    fn is_secure_input_active(&self) -> bool {
        self.secure_input.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct RecordingSynthesizer {
    pastes: AtomicUsize,
}

impl RecordingSynthesizer {
    pub fn count(&self) -> usize {
        self.pastes.load(Ordering::SeqCst)
    }
}

impl InputSynthesizer for RecordingSynthesizer {
    fn synthesize_paste(&self) -> anyhow::Result<()> {
        self.pastes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSurface {
    hides: AtomicUsize,
}

impl RecordingSurface {
    pub fn hide_count(&self) -> usize {
        self.hides.load(Ordering::SeqCst)
    }
}

impl PresentingSurface for RecordingSurface {
    fn hide(&self) {
        self.hides.fetch_add(1, Ordering::SeqCst);
    }
}

/// Always reports the same frontmost app.
#[derive(Debug, Default)]
pub struct StaticSourceApp(pub Option<SourceApp>);

impl SourceAppProvider for StaticSourceApp {
    fn frontmost_app(&self) -> Option<SourceApp> {
        self.0.clone()
    }
}

/// Collects released asset names instead of deleting files.
#[derive(Debug, Default)]
pub struct RecordingCleaner {
    released: Mutex<Vec<String>>,
}

impl RecordingCleaner {
    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }
}

impl AssetCleaner for RecordingCleaner {
    fn release(&self, assets: Vec<String>) {
        self.released.lock().extend(assets);
    }
}
