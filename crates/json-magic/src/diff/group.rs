use indexmap::IndexMap;
use json_magic_pointer::Path;
use serde::Serialize;

use super::{DiffEntry, DiffKind};

/// Entries that share a grouping key, e.g. every change under one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffGroup {
    pub key: Path,
    pub kind: DiffKind,
    pub entries: Vec<DiffEntry>,
}

/// Key function taking the first `depth` segments of the entry's path.
pub fn by_prefix(depth: usize) -> impl Fn(&[String]) -> Path {
    move |path| path.iter().take(depth).cloned().collect()
}

/// Buckets entries by `key` applied to each entry's target path, keeping
/// first-appearance order.
///
/// A group whose only entry adds or removes the whole unit (its path is no
/// longer than the key) takes that entry's kind; every other group is
/// `Modify`.
///
/// ```
/// use json_magic::diff::{by_prefix, diff, group, DiffKind};
/// use serde_json::json;
///
/// let before = json!({"paths": {"/a": {"get": {}}}});
/// let after = json!({"paths": {"/a": {"get": {}, "post": {}}, "/b": {"get": {}}}});
/// let groups = group(&diff(&before, &after), by_prefix(2));
/// assert_eq!(groups.len(), 2);
/// assert_eq!(groups[0].kind, DiffKind::Modify);
/// assert_eq!(groups[1].kind, DiffKind::Add);
/// ```
pub fn group<F>(entries: &[DiffEntry], key: F) -> Vec<DiffGroup>
where
    F: Fn(&[String]) -> Path,
{
    let mut buckets: IndexMap<Path, Vec<DiffEntry>> = IndexMap::new();
    for entry in entries {
        buckets.entry(key(&entry.target_path())).or_default().push(entry.clone());
    }

    buckets
        .into_iter()
        .map(|(key, entries)| {
            let kind = match entries.as_slice() {
                [only] if only.rename.is_none() && only.path.len() <= key.len() => only.kind,
                _ => DiffKind::Modify,
            };
            DiffGroup { key, kind, entries }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use serde_json::json;

    #[test]
    fn test_groups_by_operation() {
        let before = json!({
            "paths": {
                "/users": {"get": {"summary": "a"}, "delete": {"summary": "drop"}},
            },
        });
        let after = json!({
            "paths": {
                "/users": {"get": {"summary": "b", "description": "d"}, "post": {"summary": "create"}},
            },
        });
        let groups = group(&diff(&before, &after), by_prefix(3));
        let summary: Vec<_> = groups
            .iter()
            .map(|g| (g.key.join("/"), g.kind, g.entries.len()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("paths//users/get".to_string(), DiffKind::Modify, 2),
                ("paths//users/delete".to_string(), DiffKind::Remove, 1),
                ("paths//users/post".to_string(), DiffKind::Add, 1),
            ]
        );
    }

    #[test]
    fn test_deep_single_add_is_modify() {
        let before = json!({"paths": {"/a": {"get": {}}}});
        let after = json!({"paths": {"/a": {"get": {"summary": "x"}}}});
        let groups = group(&diff(&before, &after), by_prefix(2));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kind, DiffKind::Modify);
    }

    #[test]
    fn test_rename_groups_under_new_key() {
        let before = json!({"paths": {"/a": {"get": {}}}});
        let after = json!({"paths": {"/b": {"get": {}}}});
        let groups = group(&diff(&before, &after), by_prefix(2));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, vec!["paths".to_string(), "/b".to_string()]);
        assert_eq!(groups[0].kind, DiffKind::Modify);
    }

    #[test]
    fn test_empty() {
        assert!(group(&[], by_prefix(1)).is_empty());
    }
}
