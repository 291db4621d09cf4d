//! json-magic-util - Utility functions for json-magic
//!
//! Tree helpers shared by the json-magic crates: an aliasing-aware node graph
//! with a cycle-safe deep clone, and structural equality for JSON values.

pub mod json_clone;
pub mod json_equal;

pub use json_clone::{deep_clone, SharedNode};
pub use json_equal::deep_equal;
