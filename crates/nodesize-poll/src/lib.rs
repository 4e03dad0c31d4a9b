//! nodesize-poll: keeps derived demand fresh.
//!
//! A [`PollSupervisor`] periodically calls a [`Fetcher`], transforms the
//! raw result (typically through the server calculator), and fans the
//! snapshot out to subscribers through a [`SubscriberRegistry`].
//!
//! # Architecture
//!
//! ```text
//! PollSupervisor (one task per monitored queue)
//!   ├── Fetcher::fetch()          → raw queue, or error
//!   ├── FailureTracker            (consecutive failures, backoff, health)
//!   ├── transform(raw)            → snapshot
//!   ├── SubscriberRegistry        (bounded mpsc per subscriber)
//!   └── watch::Sender<PollStatus> (phase, health, counters)
//! ```
//!
//! Fetch failures never stop the loop. They double the delay up to
//! `max_backoff` and, past `degraded_threshold`, flip the status to
//! `Degraded`. Only an explicit stop ends a supervisor.

pub mod backoff;
pub mod fetch;
pub mod registry;
pub mod source;
pub mod supervisor;

pub use backoff::{FailureTracker, PollHealth};
pub use fetch::{FnFetcher, Fetcher, fetch_fn};
pub use registry::{SubscriberRegistry, Subscription, SubscriptionId};
pub use source::{FileSource, HttpSource, QueueSource, SourceError, parse_queue};
pub use supervisor::{
    CycleOutcome, PollConfig, PollPhase, PollStatus, PollSupervisor, SupervisorHandle, Transform,
};
