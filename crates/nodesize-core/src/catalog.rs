//! The node size catalog.
//!
//! Built once at startup and never mutated afterwards. Calculators share it
//! behind an `Arc`.

use std::collections::HashSet;

use crate::error::{CatalogError, CatalogResult};
use crate::types::NodeSize;

/// Immutable list of node sizes, cheapest first.
///
/// Sizes are ordered by cost, then cores, then RAM, then scratch space.
/// Sizes that compare equal on all four keep their configured order.
#[derive(Debug, Clone)]
pub struct SizeCatalog {
    sizes: Vec<NodeSize>,
}

impl SizeCatalog {
    /// Build a catalog from the configured sizes.
    pub fn new(mut sizes: Vec<NodeSize>) -> CatalogResult<Self> {
        if sizes.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for size in &sizes {
            if !seen.insert(size.id.as_str()) {
                return Err(CatalogError::DuplicateSize(size.id.clone()));
            }
            if !size.cost.is_finite() || size.cost < 0.0 {
                return Err(CatalogError::InvalidCost {
                    id: size.id.clone(),
                    cost: size.cost,
                });
            }
        }

        // Stable sort keeps configured order as the final tie-break.
        sizes.sort_by(|a, b| {
            a.cost
                .total_cmp(&b.cost)
                .then(a.cores.cmp(&b.cores))
                .then(a.ram_mb.cmp(&b.ram_mb))
                .then(a.scratch_mb.cmp(&b.scratch_mb))
        });

        Ok(Self { sizes })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeSize> {
        self.sizes.iter()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Look up a size by identifier.
    pub fn get(&self, id: &str) -> Option<&NodeSize> {
        self.sizes.iter().find(|s| s.id == id)
    }
}

impl<'a> IntoIterator for &'a SizeCatalog {
    type Item = &'a NodeSize;
    type IntoIter = std::slice::Iter<'a, NodeSize>;

    fn into_iter(self) -> Self::IntoIter {
        self.sizes.iter()
    }
}
