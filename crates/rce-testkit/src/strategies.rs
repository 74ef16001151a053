//! Property test strategies

use proptest::prelude::*;

pub use proptest;

/// Short lowercase tags
pub fn arb_tag() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

/// Cluster of machines with one shared capacity: `(machine count, capacity)`
pub fn arb_uniform_cluster() -> impl Strategy<Value = (usize, usize)> {
    (1usize..8, 1usize..6)
}

/// Cluster with per-machine capacities
pub fn arb_capacities() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..8, 1..8)
}
