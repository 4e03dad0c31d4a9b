//! Server calculator: turns a job queue into a list of node slots.
//!
//! Each job is sized independently, in queue order:
//! 1. Coerce `min_nodes` (absent or malformed → 1)
//! 2. Pick the first catalog size meeting every per-node minimum
//! 3. Drop the job if no size fits or it needs more than `max_nodes`
//! 4. Otherwise emit the chosen size `min_nodes` times
//!
//! A job is never partially satisfied: a count above the ceiling drops
//! the whole job instead of truncating it.

use std::sync::Arc;

use tracing::{debug, warn};

use nodesize_core::{
    DemandSnapshot, NodeSize, QueuedJob, RuntimeConstraints, SizeCatalog, UnsatisfiablePolicy,
};

use crate::plan::{DemandPlan, DroppedJob, Unsatisfiable};

/// Maps job queues onto the catalog.
///
/// Holds no mutable state; one calculator can be shared by any number of
/// supervisors.
#[derive(Debug, Clone)]
pub struct ServerCalculator {
    catalog: Arc<SizeCatalog>,
    max_nodes: Option<u32>,
    policy: UnsatisfiablePolicy,
}

impl ServerCalculator {
    /// Create a calculator with no node ceiling.
    pub fn new(catalog: Arc<SizeCatalog>) -> Self {
        Self {
            catalog,
            max_nodes: None,
            policy: UnsatisfiablePolicy::default(),
        }
    }

    /// Drop jobs that need more than `max_nodes` nodes.
    pub fn with_max_nodes(mut self, max_nodes: u32) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    /// Set how dropped jobs are logged.
    pub fn with_unsatisfiable_policy(mut self, policy: UnsatisfiablePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn catalog(&self) -> &SizeCatalog {
        &self.catalog
    }

    pub fn max_nodes(&self) -> Option<u32> {
        self.max_nodes
    }

    /// The cheapest catalog size meeting every per-node minimum.
    pub fn size_for(&self, constraints: &RuntimeConstraints) -> Option<&NodeSize> {
        self.catalog.iter().find(|size| size.satisfies(constraints))
    }

    /// Node slots needed for `jobs`, one entry per slot.
    pub fn servers_for_queue(&self, jobs: &[QueuedJob]) -> DemandSnapshot {
        self.plan(jobs).into_snapshot()
    }

    /// Size `jobs` and report every job that was dropped.
    pub fn plan(&self, jobs: &[QueuedJob]) -> DemandPlan {
        plan_jobs(jobs, &self.catalog, self.max_nodes, self.policy)
    }
}

/// Size a queue against a catalog in one call.
///
/// Same selection as [`ServerCalculator::servers_for_queue`] with the given
/// ceiling. Dropped jobs are not logged.
pub fn servers_for_queue(
    jobs: &[QueuedJob],
    catalog: &SizeCatalog,
    max_nodes: Option<u32>,
) -> DemandSnapshot {
    plan_jobs(jobs, catalog, max_nodes, UnsatisfiablePolicy::Ignore).into_snapshot()
}

fn plan_jobs(
    jobs: &[QueuedJob],
    catalog: &SizeCatalog,
    max_nodes: Option<u32>,
    policy: UnsatisfiablePolicy,
) -> DemandPlan {
    let mut plan = DemandPlan::default();

    for job in jobs {
        let sized = size_job(catalog, max_nodes, &job.runtime_constraints).and_then(
            |(size, count)| {
                plan.snapshot
                    .try_push_slots(size, count)
                    .map_err(|_| Unsatisfiable::AllocationFailed { requested: count })
            },
        );
        if let Err(reason) = sized {
            report(policy, &job.id, &reason);
            plan.dropped.push(DroppedJob {
                job_id: job.id.clone(),
                reason,
            });
        }
    }

    debug!(
        jobs = jobs.len(),
        slots = plan.snapshot.len(),
        dropped = plan.dropped.len(),
        "sized job queue"
    );
    plan
}

/// Pick the size and slot count for one job.
///
/// The count must fit under the ceiling; without `max_nodes` that is the
/// largest slot count one job may emit.
fn size_job<'a>(
    catalog: &'a SizeCatalog,
    max_nodes: Option<u32>,
    constraints: &RuntimeConstraints,
) -> Result<(&'a NodeSize, u32), Unsatisfiable> {
    let size = catalog
        .iter()
        .find(|size| size.satisfies(constraints))
        .ok_or(Unsatisfiable::NoSizeFits {
            cores: constraints.cores_per_node(),
            ram_mb: constraints.ram_mb_per_node(),
            scratch_mb: constraints.scratch_mb_per_node(),
        })?;

    let requested = constraints.node_count();
    let max = max_nodes.unwrap_or(u32::MAX);
    match u32::try_from(requested) {
        Ok(count) if count <= max => Ok((size, count)),
        _ => Err(Unsatisfiable::ExceedsMaxNodes { requested, max }),
    }
}

fn report(policy: UnsatisfiablePolicy, job_id: &str, reason: &Unsatisfiable) {
    match policy {
        UnsatisfiablePolicy::Ignore => {}
        UnsatisfiablePolicy::Debug => {
            debug!(job = %job_id, %reason, "dropping unsatisfiable job");
        }
        UnsatisfiablePolicy::Warn => {
            warn!(job = %job_id, %reason, "dropping unsatisfiable job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn size(id: &str, cores: u32, ram_mb: u64, scratch_mb: u64, cost: f64) -> NodeSize {
        NodeSize {
            id: id.to_string(),
            cores,
            ram_mb,
            scratch_mb,
            cost,
        }
    }

    /// Catalog of single-core sizes, one per core count in `factors`.
    fn make_calculator(factors: &[u32]) -> ServerCalculator {
        let sizes = factors
            .iter()
            .map(|&n| size(&format!("size-{n}"), n, 128 * u64::from(n), 100 * u64::from(n), f64::from(n)))
            .collect();
        ServerCalculator::new(Arc::new(SizeCatalog::new(sizes).unwrap()))
    }

    fn queue(constraints: &[Value]) -> Vec<QueuedJob> {
        constraints
            .iter()
            .enumerate()
            .map(|(i, c)| {
                serde_json::from_value(json!({
                    "id": format!("job-{i}"),
                    "runtime_constraints": c,
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn empty_queue_needs_no_servers() {
        let calc = make_calculator(&[1]);
        assert!(calc.servers_for_queue(&[]).is_empty());
    }

    #[test]
    fn easy_server_count() {
        let calc = make_calculator(&[1]);
        let snap = calc.servers_for_queue(&queue(&[json!({"min_nodes": 3})]));
        assert_eq!(snap.len(), 3);
        assert!(snap.iter().all(|s| s.id == "size-1"));
    }

    #[test]
    fn implicit_server_count() {
        let calc = make_calculator(&[1]);
        let snap = calc.servers_for_queue(&queue(&[json!({}), json!({"min_nodes": 3})]));
        assert_eq!(snap.len(), 4);
    }

    #[test]
    fn bad_min_nodes_override() {
        let calc = make_calculator(&[1]);
        let snap = calc.servers_for_queue(&queue(&[
            json!({"min_nodes": -2}),
            json!({"min_nodes": "foo"}),
        ]));
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn ignore_unsatisfiable_jobs() {
        let calc = make_calculator(&[1]).with_max_nodes(9);
        let jobs = queue(&[
            json!({"min_cores_per_node": 2}),
            json!({"min_ram_mb_per_node": 256}),
            json!({"min_nodes": 6}),
            json!({"min_nodes": 12}),
            json!({"min_scratch_mb_per_node": 200}),
        ]);

        let plan = calc.plan(&jobs);
        assert_eq!(plan.snapshot.len(), 6);

        let dropped: Vec<&str> = plan.dropped.iter().map(|d| d.job_id.as_str()).collect();
        assert_eq!(dropped, vec!["job-0", "job-1", "job-3", "job-4"]);
        assert_eq!(
            plan.dropped[2].reason,
            Unsatisfiable::ExceedsMaxNodes {
                requested: 12,
                max: 9
            }
        );
        assert!(matches!(
            plan.dropped[0].reason,
            Unsatisfiable::NoSizeFits { cores: 2, .. }
        ));
    }

    #[test]
    fn count_at_ceiling_is_kept() {
        let calc = make_calculator(&[1]).with_max_nodes(9);
        let snap = calc.servers_for_queue(&queue(&[json!({"min_nodes": 9})]));
        assert_eq!(snap.len(), 9);
    }

    #[test]
    fn oversized_count_is_dropped_not_truncated() {
        let jobs = queue(&[
            json!({}),
            json!({"min_nodes": 10_000_000_000u64}),
            json!({"min_nodes": 2}),
        ]);

        // No ceiling configured: the slot limit still applies.
        let plan = make_calculator(&[1]).plan(&jobs);
        assert_eq!(plan.snapshot.len(), 3);
        assert_eq!(
            plan.dropped,
            vec![DroppedJob {
                job_id: "job-1".to_string(),
                reason: Unsatisfiable::ExceedsMaxNodes {
                    requested: 10_000_000_000,
                    max: u32::MAX,
                },
            }]
        );

        let plan = make_calculator(&[1]).with_max_nodes(u32::MAX).plan(&jobs);
        assert_eq!(plan.snapshot.len(), 3);
        assert_eq!(plan.dropped.len(), 1);

        let catalog = make_calculator(&[1]).catalog().clone();
        assert_eq!(servers_for_queue(&jobs, &catalog, None).len(), 3);
    }

    #[test]
    fn picks_smallest_qualifying_size() {
        let calc = make_calculator(&[8, 1, 4, 2]);
        let snap = calc.servers_for_queue(&queue(&[
            json!({"min_cores_per_node": 3}),
            json!({}),
            json!({"min_ram_mb_per_node": 200, "min_nodes": 2}),
        ]));
        assert_eq!(snap.ids(), vec!["size-4", "size-1", "size-2", "size-2"]);
    }

    #[test]
    fn cheapest_size_wins_over_smaller_but_pricier() {
        let catalog = SizeCatalog::new(vec![
            size("pricey-small", 2, 4_096, 10_000, 0.30),
            size("cheap-big", 4, 8_192, 10_000, 0.10),
        ])
        .unwrap();
        let calc = ServerCalculator::new(Arc::new(catalog));
        let snap = calc.servers_for_queue(&queue(&[json!({"min_cores_per_node": 2})]));
        assert_eq!(snap.ids(), vec!["cheap-big"]);
    }

    #[test]
    fn output_preserves_job_order() {
        let calc = make_calculator(&[1, 2]);
        let snap = calc.servers_for_queue(&queue(&[
            json!({"min_cores_per_node": 2}),
            json!({"min_nodes": 2}),
            json!({"min_cores_per_node": 2}),
        ]));
        assert_eq!(snap.ids(), vec!["size-2", "size-1", "size-1", "size-2"]);
    }

    #[test]
    fn size_for_returns_none_when_nothing_fits() {
        let calc = make_calculator(&[1, 2]);
        let c: RuntimeConstraints = serde_json::from_value(json!({"min_cores_per_node": 16})).unwrap();
        assert!(calc.size_for(&c).is_none());
    }

    #[test]
    fn free_function_matches_calculator() {
        let calc = make_calculator(&[1, 4]).with_max_nodes(5);
        let jobs = queue(&[
            json!({"min_nodes": 3}),
            json!({"min_nodes": 6}),
            json!({"min_cores_per_node": 3, "min_nodes": "2"}),
            json!({"min_cores_per_node": 5}),
        ]);
        assert_eq!(
            servers_for_queue(&jobs, calc.catalog(), calc.max_nodes()),
            calc.servers_for_queue(&jobs)
        );
    }

    #[test]
    fn repeated_calls_are_identical() {
        let calc = make_calculator(&[1, 2, 4]);
        let jobs = queue(&[
            json!({"min_nodes": 2, "min_cores_per_node": 2}),
            json!({"min_nodes": "x"}),
            json!({"min_cores_per_node": 4}),
        ]);
        let first = calc.servers_for_queue(&jobs);
        for _ in 0..10 {
            assert_eq!(calc.servers_for_queue(&jobs), first);
        }
    }

    #[tokio::test]
    async fn concurrent_calls_are_identical() {
        let calc = Arc::new(make_calculator(&[1, 2, 4]));
        let jobs = Arc::new(queue(&[
            json!({"min_nodes": 3}),
            json!({"min_cores_per_node": 2}),
            json!({"min_cores_per_node": 4, "min_nodes": 2}),
        ]));
        let expected = calc.servers_for_queue(&jobs);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let calc = Arc::clone(&calc);
                let jobs = Arc::clone(&jobs);
                tokio::spawn(async move { calc.servers_for_queue(&jobs) })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), expected);
        }
    }

    #[test]
    fn plan_serializes_dropped_reasons() {
        let calc = make_calculator(&[1]).with_max_nodes(2);
        let plan = calc.plan(&queue(&[json!({"min_nodes": 3})]));
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["snapshot"], json!([]));
        assert_eq!(
            value["dropped"][0],
            json!({"job_id": "job-0", "reason": "exceeds_max_nodes", "requested": 3, "max": 2})
        );
    }
}
