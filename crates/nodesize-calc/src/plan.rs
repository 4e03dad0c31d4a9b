//! Demand plans: a snapshot plus the jobs left out of it.

use serde::Serialize;

use nodesize_core::{DemandSnapshot, JobId};

/// Why a job contributed nothing to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unsatisfiable {
    /// No catalog size meets the job's per-node minimums.
    NoSizeFits {
        cores: u32,
        ram_mb: u64,
        scratch_mb: u64,
    },
    /// The job needs more nodes than the ceiling. Without a configured
    /// `max_nodes` the ceiling is the largest per-job slot count, `u32::MAX`.
    ExceedsMaxNodes { requested: u64, max: u32 },
    /// Memory for the job's slots could not be reserved.
    AllocationFailed { requested: u32 },
}

impl std::fmt::Display for Unsatisfiable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unsatisfiable::NoSizeFits {
                cores,
                ram_mb,
                scratch_mb,
            } => write!(
                f,
                "no node size has {cores} cores, {ram_mb} MiB RAM and {scratch_mb} MiB scratch"
            ),
            Unsatisfiable::ExceedsMaxNodes { requested, max } => {
                write!(f, "needs {requested} nodes, ceiling is {max}")
            }
            Unsatisfiable::AllocationFailed { requested } => {
                write!(f, "could not allocate {requested} node slots")
            }
        }
    }
}

/// A job excluded from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedJob {
    pub job_id: JobId,
    #[serde(flatten)]
    pub reason: Unsatisfiable,
}

/// Result of sizing a queue with the dropped jobs reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DemandPlan {
    pub snapshot: DemandSnapshot,
    pub dropped: Vec<DroppedJob>,
}

impl DemandPlan {
    pub fn into_snapshot(self) -> DemandSnapshot {
        self.snapshot
    }
}
