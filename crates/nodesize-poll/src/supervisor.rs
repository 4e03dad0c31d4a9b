//! Polling supervisor: fetch, transform, publish, repeat.
//!
//! ```text
//! Idle → Fetching ─┬─ ok ──→ Publishing → Idle   (wait interval)
//!                  └─ err ─→ BackingOff → Idle   (wait backoff)
//! any state ── stop ──→ Stopped
//! ```
//!
//! One supervisor is one task: at most one fetch is ever in flight. The
//! stop signal is raced against both the fetch and the delay, so stopping
//! abandons an in-flight fetch and releases the timer.

use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use nodesize_core::{PollSettings, PublishPolicy};

use crate::backoff::{FailureTracker, PollHealth};
use crate::fetch::Fetcher;
use crate::registry::{SubscriberRegistry, Subscription, SubscriptionId};

/// Transforms a raw fetch result into the published snapshot.
pub type Transform<R, T> = Box<dyn Fn(R) -> T + Send + Sync>;

/// Supervisor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay between successful cycles.
    pub interval: Duration,
    /// Cap for the failure backoff.
    pub max_backoff: Duration,
    /// Consecutive failures before reporting `Degraded`. Zero disables it.
    pub degraded_threshold: u32,
    pub publish: PublishPolicy,
    /// Send the last snapshot to new subscribers immediately.
    pub replay_last: bool,
    /// Per-subscriber channel capacity.
    pub subscriber_buffer: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
            degraded_threshold: 5,
            publish: PublishPolicy::EveryCycle,
            replay_last: false,
            subscriber_buffer: 16,
        }
    }
}

impl From<&PollSettings> for PollConfig {
    fn from(s: &PollSettings) -> Self {
        Self {
            interval: s.interval,
            max_backoff: s.max_backoff,
            degraded_threshold: s.degraded_threshold,
            publish: s.publish,
            replay_last: s.replay_last,
            subscriber_buffer: s.subscriber_buffer,
        }
    }
}

/// Where the supervisor is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Idle,
    Fetching,
    Publishing,
    BackingOff,
    Stopped,
}

/// Observable supervisor state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollStatus {
    pub phase: PollPhase,
    pub health: PollHealth,
    pub consecutive_failures: u32,
    pub successful_cycles: u64,
    pub last_success: Option<SystemTime>,
}

impl PollStatus {
    fn new() -> Self {
        Self {
            phase: PollPhase::Idle,
            health: PollHealth::Unknown,
            consecutive_failures: 0,
            successful_cycles: 0,
            last_success: None,
        }
    }
}

/// What one fetch cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new snapshot went out to this many subscribers.
    Published { subscribers: usize },
    /// The snapshot matched the last one and `OnChange` suppressed it.
    Unchanged,
    /// The fetch failed.
    FetchFailed { consecutive_failures: u32 },
}

/// Drives one monitored resource on an interval.
pub struct PollSupervisor<F: Fetcher, T> {
    name: String,
    fetcher: F,
    transform: Transform<F::Output, T>,
    config: PollConfig,
    tracker: FailureTracker,
    registry: SubscriberRegistry<T>,
    status: watch::Sender<PollStatus>,
    /// Last published snapshot.
    last_published: Option<T>,
}

impl<F, T> PollSupervisor<F, T>
where
    F: Fetcher,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        fetcher: F,
        transform: Transform<F::Output, T>,
        config: PollConfig,
    ) -> Self {
        let tracker = FailureTracker::new(
            config.interval,
            config.max_backoff,
            config.degraded_threshold,
        );
        let registry = SubscriberRegistry::new(config.subscriber_buffer, config.replay_last);
        let (status, _) = watch::channel(PollStatus::new());

        Self {
            name: name.into(),
            fetcher,
            transform,
            config,
            tracker,
            registry,
            status,
            last_published: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> Subscription<T> {
        self.registry.subscribe()
    }

    /// A handle to the registry, usable after the supervisor is spawned.
    pub fn registry(&self) -> SubscriberRegistry<T> {
        self.registry.clone()
    }

    pub fn status(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    /// The most recently published snapshot, if any.
    pub fn last_snapshot(&self) -> Option<&T> {
        self.last_published.as_ref()
    }

    /// Run exactly one fetch cycle without waiting.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        self.set_phase(PollPhase::Fetching);
        let result = self.fetcher.fetch().await;
        self.complete_cycle(result)
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.name,
            interval_ms = self.config.interval.as_millis() as u64,
            "poll supervisor started"
        );

        'cycle: loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            self.set_phase(PollPhase::Fetching);
            let result = {
                let fetch = self.fetcher.fetch();
                tokio::pin!(fetch);
                loop {
                    tokio::select! {
                        result = &mut fetch => break Some(result),
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow_and_update() {
                                break None;
                            }
                        }
                    }
                }
            };
            let Some(result) = result else {
                debug!(queue = %self.name, "abandoning in-flight fetch");
                break;
            };
            self.complete_cycle(result);

            let sleep = tokio::time::sleep(self.tracker.next_interval());
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow_and_update() {
                            break 'cycle;
                        }
                    }
                }
            }
        }

        self.set_phase(PollPhase::Stopped);
        info!(queue = %self.name, "poll supervisor stopped");
    }

    /// Run on a dedicated task.
    pub fn spawn(self) -> SupervisorHandle<T> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let name = self.name.clone();
        let registry = self.registry.clone();
        let status = self.status.subscribe();
        let task = tokio::spawn(self.run(shutdown_rx));

        SupervisorHandle {
            name,
            registry,
            status,
            shutdown_tx,
            task,
        }
    }

    fn complete_cycle(&mut self, result: anyhow::Result<F::Output>) -> CycleOutcome {
        let prev_health = self.tracker.health();

        match result {
            Ok(raw) => {
                let health = self.tracker.record_success();
                if prev_health == PollHealth::Degraded {
                    info!(queue = %self.name, "fetch recovered");
                }

                self.set_phase(PollPhase::Publishing);
                let snapshot = (self.transform)(raw);
                let outcome = self.publish(snapshot);

                self.status.send_modify(|s| {
                    s.phase = PollPhase::Idle;
                    s.health = health;
                    s.consecutive_failures = 0;
                    s.successful_cycles += 1;
                    s.last_success = Some(SystemTime::now());
                });
                outcome
            }
            Err(e) => {
                let health = self.tracker.record_failure();
                let failures = self.tracker.consecutive_failures();
                warn!(
                    queue = %self.name,
                    failures,
                    retry_in_ms = self.tracker.next_interval().as_millis() as u64,
                    error = %format!("{e:#}"),
                    "fetch failed"
                );
                if health == PollHealth::Degraded && prev_health != PollHealth::Degraded {
                    warn!(
                        queue = %self.name,
                        failures,
                        threshold = self.config.degraded_threshold,
                        "fetch persistently failing, supervisor degraded"
                    );
                }

                self.status.send_modify(|s| {
                    s.phase = PollPhase::BackingOff;
                    s.health = health;
                    s.consecutive_failures = failures;
                });
                CycleOutcome::FetchFailed {
                    consecutive_failures: failures,
                }
            }
        }
    }

    fn publish(&mut self, snapshot: T) -> CycleOutcome {
        if self.config.publish == PublishPolicy::OnChange
            && self.last_published.as_ref() == Some(&snapshot)
        {
            debug!(queue = %self.name, "snapshot unchanged, not publishing");
            return CycleOutcome::Unchanged;
        }
        self.last_published = Some(snapshot.clone());

        let subscribers = self.registry.publish(snapshot);
        debug!(queue = %self.name, subscribers, "published snapshot");
        CycleOutcome::Published { subscribers }
    }

    fn set_phase(&self, phase: PollPhase) {
        self.status.send_modify(|s| s.phase = phase);
    }
}

/// Handle to a spawned supervisor.
///
/// Dropping the handle also stops the supervisor.
pub struct SupervisorHandle<T> {
    name: String,
    registry: SubscriberRegistry<T>,
    status: watch::Receiver<PollStatus>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<T: Clone + Send + 'static> SupervisorHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> Subscription<T> {
        self.registry.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    pub fn status(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the supervisor to stop and wait until it has.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(queue = %self.name, error = %e, "poll supervisor task failed");
        }
    }
}
