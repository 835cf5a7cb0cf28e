//! SyncScheduler - polls while push notifications are unavailable
//!
//! The scheduler is a two-state machine driven by the push registration flag:
//!
//! ```text
//!              start(false) / push lost
//!   ┌──────┐ ─────────────────────────────▶ ┌─────────┐
//!   │ Idle │                                │ Polling │──▶ request_sync every interval
//!   └──────┘ ◀───────────────────────────── └─────────┘
//!              push registered / stop()
//! ```
//!
//! Each tick spawns its own pass, so cancelling the timer never aborts a
//! pipeline mid-flight. Overlapping ticks are absorbed by the orchestrator's
//! overlap guard.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::orchestrator::SyncOrchestrator;
use crate::config::SyncConfig;

/// Whether the scheduler is currently polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer running
    Idle,
    /// Timer running, one sync request per interval
    Polling,
}

#[derive(Default)]
struct SchedulerInner {
    started: bool,
    push_registered: bool,
    timer: Option<JoinHandle<()>>,
}

/// Drives periodic sync requests while push is not registered
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    inner: Mutex<SchedulerInner>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, config: &SyncConfig) -> Self {
        Self {
            orchestrator,
            interval: config.poll_interval,
            inner: Mutex::new(SchedulerInner::default()),
        }
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        if self.inner.lock().timer.is_some() {
            SchedulerState::Polling
        } else {
            SchedulerState::Idle
        }
    }

    /// Polling interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start reacting to push registration.
    ///
    /// Begins polling immediately if push is not registered. The first
    /// request fires one interval after this call. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self, push_registered: bool) {
        let mut inner = self.inner.lock();
        inner.started = true;
        inner.push_registered = push_registered;
        info!(push_registered, "Scheduler started");
        self.apply(&mut inner);
    }

    /// Record a change in push registration.
    ///
    /// Only takes effect while started; a stopped scheduler stays idle.
    pub fn set_push_registered(&self, registered: bool) {
        let mut inner = self.inner.lock();
        inner.push_registered = registered;
        if inner.started {
            self.apply(&mut inner);
        }
    }

    /// Cancel the timer and go idle. Passes already running finish normally.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.started = false;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
            info!("Scheduler stopped");
        }
    }

    /// Feed push registration changes from a watch channel.
    ///
    /// The task ends when the sender is dropped or the scheduler is gone.
    pub fn follow_push_registration(
        self: &Arc<Self>,
        mut registered: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let scheduler: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while registered.changed().await.is_ok() {
                let value = *registered.borrow_and_update();
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                scheduler.set_push_registered(value);
            }
            debug!("Push registration feed closed");
        })
    }

    fn apply(&self, inner: &mut SchedulerInner) {
        if inner.push_registered {
            if let Some(timer) = inner.timer.take() {
                timer.abort();
                info!("Push registered, polling stopped");
            }
        } else if inner.timer.is_none() {
            info!(interval = ?self.interval, "Push unavailable, polling");
            inner.timer = Some(self.spawn_timer());
        }
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let period = self.interval;
        let first_tick = Instant::now() + period;
        tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("Poll tick");
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator.request_sync().await;
                });
            }
        })
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.get_mut().timer.take() {
            timer.abort();
        }
    }
}
