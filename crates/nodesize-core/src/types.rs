//! Domain types for node sizing.
//!
//! Job records arrive from an external scheduler with loosely typed
//! constraint fields. They are decoded through a single lenient coercion
//! rule (see [`coerce_int`]) so that deserializing a job never fails.

use std::collections::TryReserveError;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Identifier of a node size in the catalog.
pub type SizeId = String;

/// Identifier of a queued job.
pub type JobId = String;

// ── Node sizes ─────────────────────────────────────────────────────

/// A named capacity tier offered by the compute provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSize {
    pub id: SizeId,
    pub cores: u32,
    pub ram_mb: u64,
    pub scratch_mb: u64,
    /// Relative cost; only the ordering between sizes matters.
    pub cost: f64,
}

impl NodeSize {
    /// Whether a node of this size meets every per-node minimum.
    pub fn satisfies(&self, constraints: &RuntimeConstraints) -> bool {
        self.cores >= constraints.cores_per_node()
            && self.ram_mb >= constraints.ram_mb_per_node()
            && self.scratch_mb >= constraints.scratch_mb_per_node()
    }
}

// ── Runtime constraints ────────────────────────────────────────────

/// Per-job minimum resource requirements.
///
/// Fields hold the already-coerced values; `None` means the field was
/// absent or malformed on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_nodes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_cores_per_node: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ram_mb_per_node: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_scratch_mb_per_node: Option<u64>,
}

impl RuntimeConstraints {
    /// Number of nodes the job needs. Always at least 1, never capped.
    pub fn node_count(&self) -> u64 {
        self.min_nodes.filter(|n| *n > 0).unwrap_or(1)
    }

    pub fn cores_per_node(&self) -> u32 {
        self.min_cores_per_node.unwrap_or(0)
    }

    pub fn ram_mb_per_node(&self) -> u64 {
        self.min_ram_mb_per_node.unwrap_or(0)
    }

    pub fn scratch_mb_per_node(&self) -> u64 {
        self.min_scratch_mb_per_node.unwrap_or(0)
    }

    /// Decode constraints from an arbitrary JSON value.
    ///
    /// Anything other than an object yields all-absent constraints.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let field = |name: &str| obj.get(name).and_then(coerce_int);

        Self {
            // Zero and negative node counts are treated as absent.
            min_nodes: field("min_nodes")
                .filter(|n| *n > 0)
                .map(|n| u64::try_from(n).unwrap_or(u64::MAX)),
            min_cores_per_node: field("min_cores_per_node")
                .filter(|n| *n >= 0)
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX)),
            min_ram_mb_per_node: field("min_ram_mb_per_node")
                .filter(|n| *n >= 0)
                .map(|n| u64::try_from(n).unwrap_or(u64::MAX)),
            min_scratch_mb_per_node: field("min_scratch_mb_per_node")
                .filter(|n| *n >= 0)
                .map(|n| u64::try_from(n).unwrap_or(u64::MAX)),
        }
    }
}

impl<'de> Deserialize<'de> for RuntimeConstraints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Coerce a loosely typed JSON value into an integer.
///
/// Integers pass through, floats truncate toward zero, strings are trimmed
/// and parsed as base-10 integers. Everything else is malformed and yields
/// `None`. The full `u64` range is kept exactly.
pub fn coerce_int(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i128)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

// ── Queued jobs ────────────────────────────────────────────────────

/// A job waiting in the external queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub runtime_constraints: RuntimeConstraints,
}

impl QueuedJob {
    pub fn new(id: impl Into<JobId>, runtime_constraints: RuntimeConstraints) -> Self {
        Self {
            id: id.into(),
            runtime_constraints,
        }
    }

    /// Decode a job record. Never fails: a missing id becomes the empty
    /// string and missing or malformed constraints become all-absent.
    pub fn from_value(value: &Value) -> Self {
        let id = value
            .get("id")
            .or_else(|| value.get("uuid"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let runtime_constraints = value
            .get("runtime_constraints")
            .map(RuntimeConstraints::from_value)
            .unwrap_or_default();

        Self {
            id,
            runtime_constraints,
        }
    }
}

impl<'de> Deserialize<'de> for QueuedJob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

// ── Demand snapshot ────────────────────────────────────────────────

/// Node slots currently needed, one entry per slot, in job order.
///
/// Serializes as the list of size identifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemandSnapshot {
    slots: Vec<NodeSize>,
}

impl DemandSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `count` slots of `size`.
    ///
    /// Reserves the slots up front and returns an error, leaving the
    /// snapshot unchanged, when they cannot be allocated.
    pub fn try_push_slots(&mut self, size: &NodeSize, count: u32) -> Result<(), TryReserveError> {
        let count = count as usize;
        self.slots.try_reserve(count)?;
        self.slots.extend(std::iter::repeat_n(size, count).cloned());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeSize> {
        self.slots.iter()
    }

    pub fn as_slice(&self) -> &[NodeSize] {
        &self.slots
    }

    /// Size identifiers, one per slot.
    pub fn ids(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.id.as_str()).collect()
    }

    /// Slot count per size, in order of first appearance.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for slot in &self.slots {
            match counts.iter_mut().find(|(id, _)| *id == slot.id) {
                Some((_, n)) => *n += 1,
                None => counts.push((slot.id.as_str(), 1)),
            }
        }
        counts
    }
}

impl From<Vec<NodeSize>> for DemandSnapshot {
    fn from(slots: Vec<NodeSize>) -> Self {
        Self { slots }
    }
}

impl<'a> IntoIterator for &'a DemandSnapshot {
    type Item = &'a NodeSize;
    type IntoIter = std::slice::Iter<'a, NodeSize>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}

impl Serialize for DemandSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.slots.iter().map(|s| s.id.as_str()))
    }
}

// ── Policies ───────────────────────────────────────────────────────

/// How the calculator reports jobs it drops as unsatisfiable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsatisfiablePolicy {
    /// Drop silently.
    Ignore,
    /// Log each dropped job at debug level.
    Debug,
    /// Log each dropped job at warn level.
    #[default]
    Warn,
}

/// When a supervisor publishes a freshly computed snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Publish after every successful fetch.
    #[default]
    EveryCycle,
    /// Publish only when the snapshot differs from the last published one.
    OnChange,
}
