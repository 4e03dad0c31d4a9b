//! nodesize-calc: how many nodes of which sizes the queue needs.
//!
//! # Selection
//!
//! ```text
//! for job in queue (in order):
//!     count = min_nodes (absent, zero, negative, non-numeric → 1)
//!     size  = first catalog size (cheapest first) with
//!             cores ≥ min_cores_per_node,
//!             ram_mb ≥ min_ram_mb_per_node,
//!             scratch_mb ≥ min_scratch_mb_per_node
//!     if no size or count > max_nodes (u32::MAX when unset):
//!         drop job
//!     else:
//!         emit size × count
//! ```
//!
//! Selection is deterministic: the catalog is sorted by cost, then cores,
//! RAM and scratch, then configured order.

pub mod calculator;
pub mod plan;

pub use calculator::{ServerCalculator, servers_for_queue};
pub use plan::{DemandPlan, DroppedJob, Unsatisfiable};
