//! ⏲️ TriggerScheduler: one recurring job per (document type, trigger kind).
//!
//! 🎬 *[two rollover loops for the same index walk into a bar. only one walks out. the map has one seat per key.]*
//!
//! ```text
//!   Unregistered ──start──▶ Scheduled ──stop / stop_all──▶ Cancelled
//!                              │
//!                              └──start (same key)──▶ Replaced (old cancelled, new Scheduled)
//! ```
//!
//! 🧠 Knowledge graph:
//! - Jobs live in a `DashMap<TriggerKey, ScheduledJob>`. `start` cancels any job under the same
//!   key while holding that key's entry, then installs the new one, so the old job can never
//!   begin another firing once the new job is registered.
//! - Cancellation is a `CancellationToken`. The loop only checks it between firings, so a
//!   firing in progress runs to completion. Nobody waits for it either.
//! - Jobs run on the tokio runtime handed to [`TriggerScheduler::new`], not on whatever task
//!   happens to call `start`.
//! - Dropping the scheduler cancels everything it still holds.

use std::fmt::{self, Debug};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub mod schedule;

pub use schedule::Schedule;

/// 🏷️ Which implementation a trigger is. Part of the registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKind(&'static str);

impl TriggerKind {
    pub const ROLLOVER: TriggerKind = TriggerKind("rollover");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// 🔑 (document type, trigger kind). At most one job per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKey {
    pub document_type: String,
    pub kind: TriggerKind,
}

impl TriggerKey {
    pub fn new(document_type: impl Into<String>, kind: TriggerKind) -> Self {
        Self {
            document_type: document_type.into(),
            kind,
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_type, self.kind)
    }
}

/// 🔫 Something worth doing on a schedule.
///
/// `fire` swallows its own failures. A trigger that errors logs it and waits for the next tick.
#[async_trait]
pub trait Trigger: Send + Sync + Debug {
    fn document_type(&self) -> &str;
    fn kind(&self) -> TriggerKind;
    fn schedule(&self) -> Schedule;
    async fn fire(&self);

    fn key(&self) -> TriggerKey {
        TriggerKey::new(self.document_type(), self.kind())
    }
}

#[derive(Debug)]
struct ScheduledJob {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct TriggerScheduler {
    runtime: Handle,
    jobs: DashMap<TriggerKey, ScheduledJob>,
}

impl TriggerScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            jobs: DashMap::new(),
        }
    }

    /// 🧵 A scheduler bound to the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current()
            .context("💀 The trigger scheduler needs a tokio runtime to live on, and there isn't one here.")?;
        Ok(Self::new(runtime))
    }

    /// 🚀 Schedule `trigger`, replacing whatever already runs under the same key.
    pub fn start(&self, trigger: Arc<dyn Trigger>) -> TriggerKey {
        let key = trigger.key();
        let schedule = trigger.schedule();
        match self.jobs.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get().token.cancel();
                occupied.insert(self.spawn(trigger, schedule.clone()));
                info!("🔁 Replaced trigger {key}, now {schedule}");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.spawn(trigger, schedule.clone()));
                info!("⏰ Started trigger {key}, {schedule}");
            }
        }
        key
    }

    /// 🛑 Cancel the job under `key`. Returns whether there was one.
    pub fn stop(&self, key: &TriggerKey) -> bool {
        match self.jobs.remove(key) {
            Some((_, job)) => {
                job.token.cancel();
                info!("🛑 Cancelled trigger {key}");
                true
            }
            None => false,
        }
    }

    /// 🧹 Cancel every job. Safe to call any number of times; returns how many it cancelled.
    pub fn stop_all(&self) -> usize {
        let mut cancelled = 0;
        self.jobs.retain(|key, job| {
            job.token.cancel();
            debug!("🛑 Cancelled trigger {key}");
            cancelled += 1;
            false
        });
        if cancelled > 0 {
            info!("🧹 Cancelled {cancelled} trigger(s)");
        }
        cancelled
    }

    pub fn is_registered(&self, key: &TriggerKey) -> bool {
        self.jobs.contains_key(key)
    }

    /// Registered jobs whose loop is still alive.
    pub fn active_count(&self) -> usize {
        self.jobs.iter().filter(|job| !job.handle.is_finished()).count()
    }

    pub fn keys(&self) -> Vec<TriggerKey> {
        let mut keys: Vec<TriggerKey> = self.jobs.iter().map(|job| job.key().clone()).collect();
        keys.sort();
        keys
    }

    fn spawn(&self, trigger: Arc<dyn Trigger>, schedule: Schedule) -> ScheduledJob {
        let token = CancellationToken::new();
        let handle = self.runtime.spawn(run(trigger, schedule, token.clone()));
        ScheduledJob { token, handle }
    }
}

impl Drop for TriggerScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// ⏱️ What a job loop waits on between firings.
enum Ticker {
    /// Fixed interval, on tokio's clock.
    Interval(Interval),
    /// Cron: sleep until the next wall-clock instant the expression names.
    Calendar { schedule: Schedule, fired: bool },
}

impl Ticker {
    fn new(schedule: &Schedule) -> Self {
        match schedule.interval() {
            Some(period) => {
                let first = schedule.first_delay(Utc::now()).unwrap_or(period);
                let mut interval = tokio::time::interval_at(Instant::now() + first, period);
                // 🐢 a slow firing pushes the next one back instead of causing a burst
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Ticker::Interval(interval)
            }
            None => Ticker::Calendar {
                schedule: schedule.clone(),
                fired: false,
            },
        }
    }

    /// Resolves when the next firing is due. `false` means there will never be another one.
    async fn tick(&mut self) -> bool {
        match self {
            Ticker::Interval(interval) => {
                interval.tick().await;
                true
            }
            Ticker::Calendar { schedule, fired } => {
                let now = Utc::now();
                let delay = if *fired {
                    schedule.delay_after(now)
                } else {
                    schedule.first_delay(now)
                };
                let Some(delay) = delay else {
                    return false;
                };
                tokio::time::sleep(delay).await;
                *fired = true;
                true
            }
        }
    }
}

async fn run(trigger: Arc<dyn Trigger>, schedule: Schedule, token: CancellationToken) {
    let mut ticker = Ticker::new(&schedule);

    loop {
        let due = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            due = ticker.tick() => due,
        };
        if !due {
            info!("🏁 Trigger {} has no firings left on {}", trigger.key(), schedule);
            break;
        }
        if token.is_cancelled() {
            break;
        }
        // 💥 a panicking trigger loses this tick, not its schedule
        if AssertUnwindSafe(trigger.fire()).catch_unwind().await.is_err() {
            error!("💥 Trigger {} panicked while firing. Next tick will try again.", trigger.key());
        }
    }
    debug!("👋 Trigger loop for {} has left the building", trigger.key());
}
