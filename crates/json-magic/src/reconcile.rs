//! Writing an edited, resolved view back into its source document.
//!
//! Editors work on a dereferenced copy of a document. [`reconcile_into`] copies
//! their changes back while leaving every Reference Node of the source, and
//! the externally sourced namespaces, untouched.
//!
//! ```
//! use json_magic::reconcile::{reconcile_into, ReconcileOptions};
//! use serde_json::json;
//!
//! let original = json!({
//!     "info": {"title": "Old"},
//!     "schema": {"$ref": "#/defs/User"},
//!     "defs": {"User": {"type": "object"}},
//! });
//! let edited = json!({
//!     "info": {"title": "New"},
//!     "schema": {"type": "string"},
//!     "defs": {"User": {"type": "object"}},
//! });
//! let result = reconcile_into(&original, &edited, &ReconcileOptions::default());
//! assert_eq!(result.document["info"]["title"], "New");
//! assert_eq!(result.document["schema"], json!({"$ref": "#/defs/User"}));
//! assert_eq!(result.skipped, vec![vec!["schema".to_string()]]);
//! ```

use json_magic_pointer::{format_pointer, Path};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::bundle::{EXTERNAL_KEY, EXTERNAL_URLS_KEY};
use crate::reference::{is_ref_node, Resolver};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcileOptions {
    /// Root keys whose content came from other documents.
    pub external_keys: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            external_keys: vec![EXTERNAL_KEY.to_string(), EXTERNAL_URLS_KEY.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub document: Value,
    /// Paths where an edit was dropped because the source holds a reference
    /// there or the path is externally sourced.
    pub skipped: Vec<Path>,
}

/// Returns `original` with the changes of `edited` applied.
///
/// Nodes of `original` are inspected raw. Where `original` holds a Reference
/// Node the reference is kept and nothing below it is written; root keys in
/// [`ReconcileOptions::external_keys`] are kept the same way. Everywhere else
/// maps are merged key by key, sequences item by item, and scalars are
/// replaced.
///
/// Removing a map key, shortening a sequence or changing the kind of a node
/// never drops a Reference Node: the outgoing subtree is kept whole when
/// anything inside it is protected, and its path is reported as skipped.
///
/// A kept node is reported in [`Reconciled::skipped`] only when `edited`
/// differs from its resolved value, so writing back an unmodified resolved
/// view reports nothing.
pub fn reconcile_into(original: &Value, edited: &Value, options: &ReconcileOptions) -> Reconciled {
    let mut walk = Walk {
        resolver: Resolver::new(original),
        options,
        skipped: Vec::new(),
    };
    let mut document = original.clone();
    let mut path = Vec::new();
    walk.merge(&mut document, edited, &mut path);
    Reconciled {
        document,
        skipped: walk.skipped,
    }
}

struct Walk<'a> {
    resolver: Resolver<'a>,
    options: &'a ReconcileOptions,
    skipped: Vec<Path>,
}

impl Walk<'_> {
    fn is_protected(&self, node: &Value, path: &[String]) -> bool {
        is_ref_node(node) || (path.len() == 1 && self.options.external_keys.iter().any(|key| *key == path[0]))
    }

    fn skip(&mut self, path: Path) {
        debug!(path = %format_pointer(&path), "Keeping source node");
        self.skipped.push(path);
    }

    fn merge(&mut self, target: &mut Value, edited: &Value, path: &mut Path) {
        if self.is_protected(target, path) {
            let current = self.resolver.get_raw(path).map(|node| self.resolver.resolve_deep(node));
            if *target != *edited && current.as_ref() != Some(edited) {
                self.skip(path.clone());
            }
            return;
        }

        match (target, edited) {
            (Value::Object(target), Value::Object(edited)) => self.merge_maps(target, edited, path),
            (Value::Array(target), Value::Array(edited)) => {
                for (i, item) in edited.iter().enumerate() {
                    path.push(i.to_string());
                    match target.get_mut(i) {
                        Some(existing) => self.merge(existing, item, path),
                        None => target.push(item.clone()),
                    }
                    path.pop();
                }
                let tail = target.split_off(edited.len());
                for (offset, item) in tail.into_iter().enumerate() {
                    path.push((edited.len() + offset).to_string());
                    if self.holds_protected(&item, path) {
                        self.skip(path.clone());
                        target.push(item);
                    }
                    path.pop();
                }
            }
            (target, edited) => {
                if *target == *edited {
                    return;
                }
                if self.holds_protected(target, path) {
                    self.skip(path.clone());
                } else {
                    *target = edited.clone();
                }
            }
        }
    }

    /// Whether `node` or anything below it must survive a write-back.
    fn holds_protected(&self, node: &Value, path: &mut Path) -> bool {
        if self.is_protected(node, path) {
            return true;
        }
        match node {
            Value::Object(map) => map.iter().any(|(key, child)| {
                path.push(key.clone());
                let found = self.holds_protected(child, path);
                path.pop();
                found
            }),
            Value::Array(items) => items.iter().enumerate().any(|(i, child)| {
                path.push(i.to_string());
                let found = self.holds_protected(child, path);
                path.pop();
                found
            }),
            _ => false,
        }
    }

    fn merge_maps(&mut self, target: &mut Map<String, Value>, edited: &Map<String, Value>, path: &mut Path) {
        let mut kept = Vec::new();
        target.retain(|key, value| {
            if edited.contains_key(key) {
                return true;
            }
            let mut child = path.clone();
            child.push(key.clone());
            if self.holds_protected(value, &mut child) {
                kept.push(child);
                return true;
            }
            false
        });
        for child in kept {
            self.skip(child);
        }

        for (key, value) in edited {
            path.push(key.clone());
            match target.get_mut(key) {
                Some(existing) => self.merge(existing, value, path),
                None => {
                    target.insert(key.clone(), value.clone());
                }
            }
            path.pop();
        }
    }
}
