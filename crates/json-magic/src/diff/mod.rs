//! Structural diff of JSON trees.
//!
//! [`diff`] walks two trees in lockstep and reports leaf-level changes in
//! traversal order. Applying the entries to `before` with [`apply`] gives
//! `after` back:
//!
//! ```
//! use json_magic::diff::{apply, diff, DiffKind};
//! use serde_json::json;
//!
//! let before = json!({"info": {"title": "Old", "version": "1.0"}});
//! let after = json!({"info": {"title": "New", "version": "1.0"}, "tags": []});
//!
//! let entries = diff(&before, &after);
//! assert_eq!(entries.len(), 2);
//! assert_eq!(entries[0].kind, DiffKind::Modify);
//! assert_eq!(entries[1].kind, DiffKind::Add);
//! assert_eq!(apply(&before, &entries).unwrap(), after);
//! ```

mod group;
mod merge;
mod rename;

use json_magic_pointer::{format_pointer, get_mut, Path};
use json_magic_util::deep_equal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use group::{by_prefix, group, DiffGroup};
pub use merge::{merge, MergeResult};
pub use rename::coalesce_renames;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("path not found: {path}")]
    PathNotFound { path: String },
    #[error("invalid target at {path}")]
    InvalidTarget { path: String },
    #[error("invalid index at {path}")]
    InvalidIndex { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Add,
    Remove,
    Modify,
}

/// A key renamed inside the map at [`DiffEntry::path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

/// One change between two trees.
///
/// `Add` carries `new_value`, `Remove` carries `old_value` and a plain
/// `Modify` carries both. A rename is a `Modify` whose `path` is the parent
/// map and whose values are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub kind: DiffKind,
    pub path: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<Rename>,
}

impl DiffEntry {
    pub fn add(path: Path, value: Value) -> Self {
        Self {
            kind: DiffKind::Add,
            path,
            old_value: None,
            new_value: Some(value),
            rename: None,
        }
    }

    pub fn remove(path: Path, value: Value) -> Self {
        Self {
            kind: DiffKind::Remove,
            path,
            old_value: Some(value),
            new_value: None,
            rename: None,
        }
    }

    pub fn modify(path: Path, old: Value, new: Value) -> Self {
        Self {
            kind: DiffKind::Modify,
            path,
            old_value: Some(old),
            new_value: Some(new),
            rename: None,
        }
    }

    pub fn renamed(parent: Path, from: String, to: String) -> Self {
        Self {
            kind: DiffKind::Modify,
            path: parent,
            old_value: None,
            new_value: None,
            rename: Some(Rename { from, to }),
        }
    }

    /// The path of the node the entry leaves behind: for a rename, the new
    /// key under the parent; otherwise [`path`](Self::path).
    pub fn target_path(&self) -> Path {
        match &self.rename {
            Some(rename) => {
                let mut path = self.path.clone();
                path.push(rename.to.clone());
                path
            }
            None => self.path.clone(),
        }
    }

    /// Structural equality that compares numbers by value.
    pub fn same_change(&self, other: &DiffEntry) -> bool {
        let values_equal = |a: &Option<Value>, b: &Option<Value>| match (a, b) {
            (Some(a), Some(b)) => deep_equal(a, b),
            (None, None) => true,
            _ => false,
        };
        self.kind == other.kind
            && self.path == other.path
            && self.rename == other.rename
            && values_equal(&self.old_value, &other.old_value)
            && values_equal(&self.new_value, &other.new_value)
    }
}

/// Diffs two trees and collapses renamed keys into single entries.
pub fn diff(before: &Value, after: &Value) -> Vec<DiffEntry> {
    coalesce_renames(diff_raw(before, after))
}

/// Diffs two trees without rename detection.
///
/// Keys of `before` are visited in order (recursing or emitting `Remove`),
/// then keys only in `after` emit `Add`. Sequences recurse over their common
/// prefix, remove surplus items from the end backwards, then add new items in
/// ascending order. Scalars equal by [`deep_equal`] produce no entry.
pub fn diff_raw(before: &Value, after: &Value) -> Vec<DiffEntry> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    walk(before, after, &mut path, &mut out);
    out
}

fn walk(before: &Value, after: &Value, path: &mut Path, out: &mut Vec<DiffEntry>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            for (key, old) in b {
                path.push(key.clone());
                match a.get(key) {
                    Some(new) => walk(old, new, path, out),
                    None => out.push(DiffEntry::remove(path.clone(), old.clone())),
                }
                path.pop();
            }
            for (key, new) in a {
                if !b.contains_key(key) {
                    path.push(key.clone());
                    out.push(DiffEntry::add(path.clone(), new.clone()));
                    path.pop();
                }
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            let common = b.len().min(a.len());
            for i in 0..common {
                path.push(i.to_string());
                walk(&b[i], &a[i], path, out);
                path.pop();
            }
            for i in (common..b.len()).rev() {
                path.push(i.to_string());
                out.push(DiffEntry::remove(path.clone(), b[i].clone()));
                path.pop();
            }
            for (i, new) in a.iter().enumerate().skip(common) {
                path.push(i.to_string());
                out.push(DiffEntry::add(path.clone(), new.clone()));
                path.pop();
            }
        }
        _ => {
            if !deep_equal(before, after) {
                out.push(DiffEntry::modify(path.clone(), before.clone(), after.clone()));
            }
        }
    }
}

// ── Apply ──────────────────────────────────────────────────────────────

/// Applies `entries` in order to a copy of `before`.
pub fn apply(before: &Value, entries: &[DiffEntry]) -> Result<Value, DiffError> {
    let mut doc = before.clone();
    for entry in entries {
        apply_entry(&mut doc, entry)?;
    }
    Ok(doc)
}

fn apply_entry(doc: &mut Value, entry: &DiffEntry) -> Result<(), DiffError> {
    let pointer = || format_pointer(&entry.path);
    let not_found = || DiffError::PathNotFound { path: pointer() };
    let invalid_target = || DiffError::InvalidTarget { path: pointer() };
    let invalid_index = || DiffError::InvalidIndex { path: pointer() };

    if let Some(rename) = &entry.rename {
        let map = get_mut(doc, &entry.path)
            .and_then(Value::as_object_mut)
            .ok_or_else(invalid_target)?;
        if !map.contains_key(&rename.from) || map.contains_key(&rename.to) {
            return Err(invalid_target());
        }
        *map = std::mem::take(map)
            .into_iter()
            .map(|(key, value)| if key == rename.from { (rename.to.clone(), value) } else { (key, value) })
            .collect();
        return Ok(());
    }

    match entry.kind {
        DiffKind::Modify => {
            let value = entry.new_value.clone().ok_or_else(invalid_target)?;
            *get_mut(doc, &entry.path).ok_or_else(not_found)? = value;
        }
        DiffKind::Add => {
            let value = entry.new_value.clone().ok_or_else(invalid_target)?;
            let Some((key, parent)) = entry.path.split_last() else {
                *doc = value;
                return Ok(());
            };
            match get_mut(doc, parent).ok_or_else(not_found)? {
                Value::Object(map) => {
                    map.insert(key.clone(), value);
                }
                Value::Array(arr) => {
                    let idx: usize = key.parse().map_err(|_| invalid_index())?;
                    if idx > arr.len() {
                        return Err(invalid_index());
                    }
                    arr.insert(idx, value);
                }
                _ => return Err(invalid_target()),
            }
        }
        DiffKind::Remove => {
            let Some((key, parent)) = entry.path.split_last() else {
                return Err(invalid_target());
            };
            match get_mut(doc, parent).ok_or_else(not_found)? {
                Value::Object(map) => {
                    if !map.contains_key(key) {
                        return Err(not_found());
                    }
                    map.retain(|k, _| k != key);
                }
                Value::Array(arr) => {
                    let idx: usize = key.parse().map_err(|_| invalid_index())?;
                    if idx >= arr.len() {
                        return Err(invalid_index());
                    }
                    arr.remove(idx);
                }
                _ => return Err(invalid_target()),
            }
        }
    }
    Ok(())
}
