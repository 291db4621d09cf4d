use json_magic_util::deep_equal;
use serde_json::Value;

use super::{diff, DiffEntry, DiffKind};

/// Collapses a `Remove` immediately followed by an `Add` of a sibling key into
/// a rename.
///
/// The pair qualifies when both values are maps that are either both empty or
/// share at least one member with an equal value. The rename entry is
/// followed by the diff of the two values, re-based under the new key.
///
/// ```
/// use json_magic::diff::{coalesce_renames, diff_raw, DiffKind};
/// use serde_json::json;
///
/// let before = json!({"paths": {"/a": {"get": {"summary": "x"}}}});
/// let after = json!({"paths": {"/b": {"get": {"summary": "x"}}}});
/// let entries = coalesce_renames(diff_raw(&before, &after));
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].kind, DiffKind::Modify);
/// assert_eq!(entries[0].rename.as_ref().unwrap().to, "/b");
/// ```
pub fn coalesce_renames(entries: Vec<DiffEntry>) -> Vec<DiffEntry> {
    let mut out = Vec::with_capacity(entries.len());
    let mut iter = entries.into_iter().peekable();
    while let Some(entry) = iter.next() {
        if let Some(next) = iter.peek() {
            if is_rename(&entry, next) {
                if let Some(added) = iter.next() {
                    push_rename(&mut out, entry, added);
                    continue;
                }
            }
        }
        out.push(entry);
    }
    out
}

fn is_rename(removed: &DiffEntry, added: &DiffEntry) -> bool {
    if removed.kind != DiffKind::Remove || added.kind != DiffKind::Add {
        return false;
    }
    let (Some((from, parent)), Some((to, added_parent))) = (removed.path.split_last(), added.path.split_last())
    else {
        return false;
    };
    if parent != added_parent || from == to {
        return false;
    }
    match (&removed.old_value, &added.new_value) {
        (Some(Value::Object(old)), Some(Value::Object(new))) => {
            (old.is_empty() && new.is_empty())
                || old
                    .iter()
                    .any(|(key, value)| new.get(key).is_some_and(|other| deep_equal(value, other)))
        }
        _ => false,
    }
}

fn push_rename(out: &mut Vec<DiffEntry>, removed: DiffEntry, added: DiffEntry) {
    let mut parent = removed.path;
    let from = parent.pop().unwrap_or_default();
    let to = added.path.last().cloned().unwrap_or_default();
    let new_path = added.path;

    out.push(DiffEntry::renamed(parent, from, to));
    if let (Some(old), Some(new)) = (&removed.old_value, &added.new_value) {
        out.extend(diff(old, new).into_iter().map(|mut inner| {
            let mut path = new_path.clone();
            path.append(&mut inner.path);
            inner.path = path;
            inner
        }));
    }
}
