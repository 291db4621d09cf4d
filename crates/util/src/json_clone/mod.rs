//! Cycle-safe cloning.
//!
//! `serde_json::Value` is a strict tree, so it can never alias. Documents that
//! do alias (the same container reachable from two parents, or from itself)
//! are modelled with [`SharedNode`], and [`deep_clone`] copies them while
//! keeping that topology.

mod shared;

pub use shared::{deep_clone, SharedMap, SharedNode, SharedSeq};
