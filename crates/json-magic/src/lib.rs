//! json-magic: reference-aware tooling for JSON and YAML documents.
//!
//! Resolves `$ref` pointers without recursing forever on cycles, bundles
//! external documents into a single self-contained tree, diffs and merges
//! trees, migrates versioned data and writes edited views back to their
//! source documents.

pub mod document;
pub mod location;
pub mod reference;

pub mod bundle;
pub mod diff;
pub mod migrate;
pub mod reconcile;
pub mod workspace;

pub mod json_cli;

mod error;

pub use error::{Error, Result};
