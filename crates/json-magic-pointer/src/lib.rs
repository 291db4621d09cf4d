//! JSON Pointer utilities for reference-linked documents.
//!
//! Pointers appear in two spellings: the RFC 6901 form (`/a/b`) and the URI
//! fragment form used inside `$ref` values (`#/a/b`). Both parse into the same
//! [`Path`] of unescaped segments.
//!
//! # Example
//!
//! ```
//! use json_magic_pointer::{build_path, format_pointer, get, parse_pointer};
//! use serde_json::json;
//!
//! let path = parse_pointer("#/components/schemas");
//! assert_eq!(path, vec!["components".to_string(), "schemas".to_string()]);
//! assert_eq!(format_pointer(&path), "#/components/schemas");
//!
//! let mut doc = json!({});
//! build_path(&mut doc, &path).unwrap();
//! assert_eq!(get(&doc, &path), Some(&json!({})));
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

pub mod types;
pub use types::{Path, PathStep, Pointer};

pub mod validate;
pub use validate::{validate_path, validate_pointer, MAX_PATH_LENGTH, MAX_POINTER_LENGTH};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JsonPointerError {
    #[error("NOT_FOUND")]
    NotFound,
    #[error("INVALID_INDEX")]
    InvalidIndex,
    #[error("NO_PARENT")]
    NoParent,
    #[error("NOT_A_CONTAINER")]
    NotAContainer,
    #[error("POINTER_INVALID")]
    PointerInvalid,
    #[error("POINTER_TOO_LONG")]
    PointerTooLong,
    #[error("Path too long")]
    PathTooLong,
}

/// Unescapes a pointer component: `~1` becomes `/`, then `~0` becomes `~`.
///
/// ```
/// use json_magic_pointer::unescape_component;
///
/// assert_eq!(unescape_component("a~0b"), "a~b");
/// assert_eq!(unescape_component("c~1d"), "c/d");
/// ```
pub fn unescape_component(component: &str) -> String {
    if !component.contains('~') {
        return component.to_string();
    }
    component.replace("~1", "/").replace("~0", "~")
}

/// Escapes a pointer component: `~` becomes `~0`, then `/` becomes `~1`.
///
/// ```
/// use json_magic_pointer::escape_component;
///
/// assert_eq!(escape_component("a~b"), "a~0b");
/// assert_eq!(escape_component("/users/{id}"), "~1users~1{id}");
/// ```
pub fn escape_component(component: &str) -> String {
    if !component.contains('/') && !component.contains('~') {
        return component.to_string();
    }
    component.replace('~', "~0").replace('/', "~1")
}

/// Parses a pointer in either fragment (`#/a/b`) or RFC 6901 (`/a/b`) form.
///
/// A leading `#` and a leading `/` are stripped; what remains is split on `/`
/// and every segment is unescaped. `""`, `"#"` and `"#/"` all address the
/// root and yield an empty path.
///
/// ```
/// use json_magic_pointer::parse_pointer;
///
/// assert!(parse_pointer("#/").is_empty());
/// assert_eq!(parse_pointer("#/paths/~1pets"), vec!["paths", "/pets"]);
/// assert_eq!(parse_pointer("/a/b"), vec!["a", "b"]);
/// ```
pub fn parse_pointer(pointer: &str) -> Path {
    let rest = pointer.strip_prefix('#').unwrap_or(pointer);
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Vec::new();
    }
    rest.split('/').map(unescape_component).collect()
}

/// Parses a strict RFC 6901 pointer, where `"/"` addresses the empty key.
pub fn parse_json_pointer(pointer: &str) -> Path {
    if pointer.is_empty() {
        return Vec::new();
    }
    let rest = pointer.strip_prefix('/').unwrap_or(pointer);
    rest.split('/').map(unescape_component).collect()
}

/// Formats a path in fragment form. The root formats as `#`.
///
/// ```
/// use json_magic_pointer::format_pointer;
///
/// assert_eq!(format_pointer(&[]), "#");
/// assert_eq!(format_pointer(&["x-ext".into(), "a/b".into()]), "#/x-ext/a~1b");
/// ```
pub fn format_pointer(path: &[String]) -> String {
    let mut out = String::from("#");
    out.push_str(&format_json_pointer(path));
    out
}

/// Formats a path in RFC 6901 form. The root formats as the empty string.
pub fn format_json_pointer(path: &[String]) -> String {
    let mut out = String::new();
    for component in path {
        out.push('/');
        out.push_str(&escape_component(component));
    }
    out
}

pub fn is_root(path: &[String]) -> bool {
    path.is_empty()
}

/// Returns `true` when `child` lies strictly below `parent`.
pub fn is_child(parent: &[String], child: &[String]) -> bool {
    parent.len() < child.len() && child.starts_with(parent)
}

pub fn is_path_equal(p1: &[String], p2: &[String]) -> bool {
    p1 == p2
}

/// Returns the path one level up.
///
/// # Errors
///
/// `JsonPointerError::NoParent` for the root path.
pub fn parent(path: &[String]) -> Result<Path, JsonPointerError> {
    match path.split_last() {
        Some((_, rest)) => Ok(rest.to_vec()),
        None => Err(JsonPointerError::NoParent),
    }
}

/// Checks that a segment is a canonical array index (digits, no leading zero).
pub fn is_valid_index(index: &str) -> bool {
    if index.is_empty() {
        return false;
    }
    let bytes = index.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_digit())
}

/// Checks that a string consists only of ASCII digits.
pub fn is_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Reads the value at `path`, or `None` if any step is missing.
///
/// ```
/// use json_magic_pointer::get;
/// use serde_json::json;
///
/// let doc = json!({"tags": [{"name": "pets"}]});
/// assert_eq!(get(&doc, &["tags".into(), "0".into(), "name".into()]), Some(&json!("pets")));
/// assert_eq!(get(&doc, &["tags".into(), "1".into()]), None);
/// ```
pub fn get<'a>(val: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = val;
    for step in path {
        current = match current {
            Value::Array(arr) => arr.get(step.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(step)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable counterpart of [`get`].
pub fn get_mut<'a>(val: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    let mut current = val;
    for step in path {
        current = match current {
            Value::Array(arr) => arr.get_mut(step.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get_mut(step)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Walks `path` from `root`, creating missing containers along the way, and
/// returns the container at the end of the path.
///
/// A container created for a step is a sequence when the following step is
/// an index and a map otherwise; the container at the end of the path is
/// always created as a map. Existing values are never replaced, so calling
/// this twice with the same arguments leaves the tree unchanged the second
/// time. Indexing past the end of a sequence pads it with `null`.
///
/// # Errors
///
/// - `JsonPointerError::NotAContainer` if the path runs into a scalar.
/// - `JsonPointerError::InvalidIndex` if a sequence is addressed by a
///   non-index segment.
pub fn build_path<'a>(root: &'a mut Value, path: &[String]) -> Result<&'a mut Value, JsonPointerError> {
    let mut current = root;
    for (i, step) in path.iter().enumerate() {
        let next_is_index = path.get(i + 1).is_some_and(|next| is_valid_index(next));
        current = match current {
            Value::Object(map) => map
                .entry(step.clone())
                .or_insert_with(|| empty_container(next_is_index)),
            Value::Array(arr) => {
                if !is_valid_index(step) {
                    return Err(JsonPointerError::InvalidIndex);
                }
                let idx: usize = step.parse().map_err(|_| JsonPointerError::InvalidIndex)?;
                if idx >= arr.len() {
                    arr.resize(idx, Value::Null);
                    arr.push(empty_container(next_is_index));
                }
                &mut arr[idx]
            }
            _ => return Err(JsonPointerError::NotAContainer),
        };
    }
    if current.is_object() || current.is_array() {
        Ok(current)
    } else {
        Err(JsonPointerError::NotAContainer)
    }
}

fn empty_container(sequence: bool) -> Value {
    if sequence {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(segments: &[&str]) -> Path {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unescape_component() {
        assert_eq!(unescape_component("foo"), "foo");
        assert_eq!(unescape_component("a~0b~1c"), "a~b/c");
        assert_eq!(unescape_component("~01"), "~1");
        assert_eq!(unescape_component("~1~1"), "//");
    }

    #[test]
    fn test_escape_component() {
        assert_eq!(escape_component("foo"), "foo");
        assert_eq!(escape_component("a~b/c"), "a~0b~1c");
        assert_eq!(escape_component("~1"), "~01");
    }

    #[test]
    fn test_parse_pointer_root_forms() {
        assert!(parse_pointer("").is_empty());
        assert!(parse_pointer("#").is_empty());
        assert!(parse_pointer("#/").is_empty());
        assert!(parse_pointer("/").is_empty());
    }

    #[test]
    fn test_parse_pointer_fragment() {
        assert_eq!(parse_pointer("#/a/b"), p(&["a", "b"]));
        assert_eq!(parse_pointer("#/paths/~1users~1{id}/get"), p(&["paths", "/users/{id}", "get"]));
        assert_eq!(parse_pointer("#/a/"), p(&["a", ""]));
        assert_eq!(parse_pointer("a/b"), p(&["a", "b"]));
    }

    #[test]
    fn test_parse_json_pointer_keeps_empty_key() {
        assert_eq!(parse_json_pointer("/"), p(&[""]));
        assert_eq!(parse_json_pointer("/a~0b"), p(&["a~b"]));
        assert_eq!(parse_json_pointer("éa/b"), p(&["éa", "b"]));
    }

    #[test]
    fn test_format_roundtrip() {
        let path = p(&["components", "a/b", "c~d"]);
        assert_eq!(format_pointer(&path), "#/components/a~1b/c~0d");
        assert_eq!(parse_pointer(&format_pointer(&path)), path);
        assert_eq!(format_json_pointer(&path), "/components/a~1b/c~0d");
    }

    #[test]
    fn test_path_relations() {
        assert!(is_root(&[]));
        assert!(is_child(&p(&["a"]), &p(&["a", "b"])));
        assert!(!is_child(&p(&["a"]), &p(&["a"])));
        assert!(!is_child(&p(&["a", "b"]), &p(&["a"])));
        assert!(is_path_equal(&p(&["a", "b"]), &p(&["a", "b"])));
        assert_eq!(parent(&p(&["a", "b"])).unwrap(), p(&["a"]));
        assert_eq!(parent(&[]), Err(JsonPointerError::NoParent));
    }

    #[test]
    fn test_is_valid_index() {
        assert!(is_valid_index("0"));
        assert!(is_valid_index("42"));
        assert!(!is_valid_index("01"));
        assert!(!is_valid_index("-1"));
        assert!(!is_valid_index(""));
        assert!(is_integer("01"));
    }

    #[test]
    fn test_get() {
        let doc = json!({"a": {"b": [10, {"c": true}]}});
        assert_eq!(get(&doc, &[]), Some(&doc));
        assert_eq!(get(&doc, &p(&["a", "b", "1", "c"])), Some(&json!(true)));
        assert_eq!(get(&doc, &p(&["a", "b", "x"])), None);
        assert_eq!(get(&doc, &p(&["a", "b", "0", "c"])), None);
    }

    #[test]
    fn test_get_mut() {
        let mut doc = json!({"a": [1, 2]});
        *get_mut(&mut doc, &p(&["a", "1"])).unwrap() = json!(3);
        assert_eq!(doc, json!({"a": [1, 3]}));
    }

    #[test]
    fn test_build_path_creates_maps_and_sequences() {
        let mut doc = json!({});
        let leaf = build_path(&mut doc, &p(&["a", "items", "1", "b"])).unwrap();
        assert_eq!(leaf, &json!({}));
        assert_eq!(doc, json!({"a": {"items": [null, {"b": {}}]}}));
    }

    #[test]
    fn test_build_path_empty_returns_root() {
        let mut doc = json!({"keep": 1});
        let root = build_path(&mut doc, &[]).unwrap();
        assert_eq!(root, &json!({"keep": 1}));
    }

    #[test]
    fn test_build_path_is_idempotent() {
        let mut doc = json!({"a": {"x": 1}});
        let path = p(&["a", "b", "c"]);
        build_path(&mut doc, &path).unwrap();
        let once = doc.clone();
        build_path(&mut doc, &path).unwrap().as_object_mut().unwrap().insert("k".into(), json!(1));
        assert_eq!(get(&doc, &path), Some(&json!({"k": 1})));
        assert_eq!(get(&once, &p(&["a", "x"])), Some(&json!(1)));
        assert_eq!(doc, json!({"a": {"x": 1, "b": {"c": {"k": 1}}}}));
    }

    #[test]
    fn test_build_path_never_overwrites() {
        let mut doc = json!({"a": "scalar"});
        assert_eq!(build_path(&mut doc, &p(&["a", "b"])), Err(JsonPointerError::NotAContainer));
        assert_eq!(doc, json!({"a": "scalar"}));
    }

    #[test]
    fn test_build_path_rejects_key_on_sequence() {
        let mut doc = json!({"a": []});
        assert_eq!(build_path(&mut doc, &p(&["a", "name"])), Err(JsonPointerError::InvalidIndex));
    }
}
