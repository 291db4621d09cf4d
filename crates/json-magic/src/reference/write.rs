use json_magic_pointer::{build_path, format_pointer, get, JsonPointerError, Pointer};
use serde_json::Value;
use tracing::warn;

use super::{ref_pointer, ResolveError};

/// Writes `value` at `path` in `root`.
///
/// If the node currently at `path` is a local Reference Node, the write lands
/// on the node it points at and the reference itself is kept. A missing parent
/// of the target is created with [`build_path`].
///
/// ```
/// use json_magic::reference::write_through;
/// use serde_json::json;
///
/// let mut doc = json!({"a": {"$ref": "#/defs/a"}, "defs": {"a": 1}});
/// write_through(&mut doc, &["a".into()], json!(2)).unwrap();
/// assert_eq!(doc, json!({"a": {"$ref": "#/defs/a"}, "defs": {"a": 2}}));
/// ```
pub fn write_through(root: &mut Value, path: &[String], value: Value) -> Result<(), ResolveError> {
    let target = match get(root, path).and_then(ref_pointer) {
        Some(pointer) => match Pointer::parse(pointer) {
            Ok(Pointer::Local(target)) => target,
            Ok(Pointer::External { .. }) => {
                return Err(ResolveError::ExternalWrite {
                    pointer: pointer.to_string(),
                })
            }
            Err(source) => {
                return Err(ResolveError::Pointer {
                    pointer: pointer.to_string(),
                    source,
                })
            }
        },
        None => path.to_vec(),
    };

    let Some((key, parent_path)) = target.split_last() else {
        return Err(ResolveError::RootWrite);
    };
    if get(root, parent_path).is_none() {
        warn!(path = %format_pointer(parent_path), "creating missing parent path for write");
    }
    let not_writable = |source| ResolveError::NotWritable {
        path: format_pointer(&target),
        source,
    };
    match build_path(root, parent_path).map_err(not_writable)? {
        Value::Object(map) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        Value::Array(arr) => {
            let idx: usize = key.parse().map_err(|_| not_writable(JsonPointerError::InvalidIndex))?;
            if idx < arr.len() {
                arr[idx] = value;
            } else if idx == arr.len() {
                arr.push(value);
            } else {
                return Err(not_writable(JsonPointerError::InvalidIndex));
            }
            Ok(())
        }
        _ => Err(not_writable(JsonPointerError::NotAContainer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_write() {
        let mut doc = json!({"info": {"title": "old"}});
        write_through(&mut doc, &p(&["info", "title"]), json!("new")).unwrap();
        assert_eq!(doc, json!({"info": {"title": "new"}}));
    }

    #[test]
    fn test_write_creates_missing_target_parent() {
        let mut doc = json!({"a": {"$ref": "#/components/schemas/A"}});
        write_through(&mut doc, &p(&["a"]), json!({"type": "string"})).unwrap();
        assert_eq!(
            doc,
            json!({
                "a": {"$ref": "#/components/schemas/A"},
                "components": {"schemas": {"A": {"type": "string"}}},
            })
        );
    }

    #[test]
    fn test_write_into_sequence() {
        let mut doc = json!({"tags": ["a"], "t": {"$ref": "#/tags/1"}});
        write_through(&mut doc, &p(&["t"]), json!("b")).unwrap();
        assert_eq!(doc["tags"], json!(["a", "b"]));
        assert_eq!(
            write_through(&mut doc, &p(&["tags", "5"]), json!("z")),
            Err(ResolveError::NotWritable {
                path: "#/tags/5".into(),
                source: JsonPointerError::InvalidIndex,
            })
        );
    }

    #[test]
    fn test_root_write_is_rejected() {
        let mut doc = json!({"a": {"$ref": "#"}});
        assert_eq!(write_through(&mut doc, &p(&["a"]), json!(1)), Err(ResolveError::RootWrite));
        assert_eq!(write_through(&mut doc, &[], json!(1)), Err(ResolveError::RootWrite));
    }

    #[test]
    fn test_external_write_is_rejected() {
        let mut doc = json!({"a": {"$ref": "other.json#/x"}});
        assert!(matches!(
            write_through(&mut doc, &p(&["a"]), json!(1)),
            Err(ResolveError::ExternalWrite { .. })
        ));
    }
}
