//! Reachability pruning of inlined documents.

use std::collections::{HashMap, HashSet};

use json_magic_pointer::{get, parse_pointer, Path};
use serde_json::Value;

use super::{EXTERNAL_KEY, EXTERNAL_URLS_KEY};
use crate::location::is_local_ref;
use crate::reference::ref_pointer;

/// Subtrees of the namespace that must survive.
#[derive(Debug, Default)]
struct KeepTree {
    all: bool,
    children: HashMap<String, KeepTree>,
}

impl KeepTree {
    /// Marks `path` as kept. Returns `false` if it was already covered.
    fn insert(&mut self, path: &[String]) -> bool {
        let mut node = self;
        for step in path {
            if node.all {
                return false;
            }
            node = node.children.entry(step.clone()).or_default();
        }
        if node.all {
            return false;
        }
        node.all = true;
        node.children.clear();
        true
    }

    fn filter(&self, src: &Value) -> Value {
        if self.all {
            return src.clone();
        }
        match src {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter_map(|(key, child)| {
                        self.children.get(key).map(|keep| (key.clone(), keep.filter(child)))
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Removes inlined content that no local pointer reaches, starting from
/// everything outside the namespace. Returns the number of inlined documents
/// dropped entirely.
///
/// Inside an inlined document only the reached subtrees are kept, with their
/// enclosing maps. A path that crosses a sequence keeps the whole sequence.
/// The namespace and its URL map are removed once nothing in them is reached.
pub fn tree_shake(root: &mut Value) -> usize {
    let Some(Value::Object(namespace)) = root.get(EXTERNAL_KEY) else {
        return 0;
    };
    let total = namespace.len();

    let mut keep = KeepTree::default();
    let mut seen: HashSet<Path> = HashSet::new();
    let mut stack: Vec<Path> = Vec::new();
    collect_local_refs(root, true, &mut stack);

    while let Some(pointer) = stack.pop() {
        if !seen.insert(pointer.clone()) {
            continue;
        }
        if pointer.first().map(String::as_str) != Some(EXTERNAL_KEY) {
            continue;
        }
        if pointer.len() < 2 {
            // The whole namespace is referenced.
            return 0;
        }
        let (kept, redirect) = reach(root, &pointer);
        if let Some(next) = redirect {
            stack.push(next);
        }
        if let Some(kept) = kept {
            if keep.insert(&kept[1..]) {
                if let Some(target) = get(root, &kept) {
                    collect_local_refs(target, false, &mut stack);
                }
            }
        }
    }

    let shaken = keep.filter(&root[EXTERNAL_KEY]);
    let remaining: HashSet<String> = shaken
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    let pruned = total - remaining.len();

    if let Value::Object(map) = root {
        if remaining.is_empty() {
            map.retain(|key, _| key != EXTERNAL_KEY && key != EXTERNAL_URLS_KEY);
        } else {
            map.insert(EXTERNAL_KEY.to_string(), shaken);
            if let Some(Value::Object(urls)) = map.get_mut(EXTERNAL_URLS_KEY) {
                urls.retain(|key, _| remaining.contains(key));
            }
        }
    }
    pruned
}

/// Follows `pointer` from the root as far as it goes without crossing a
/// reference or a sequence inside an inlined document.
///
/// Returns the path to keep (`None` when the target does not exist) and, if a
/// Reference Node was met on the way, the pointer to continue with.
fn reach(root: &Value, pointer: &[String]) -> (Option<Path>, Option<Path>) {
    let mut current = root;
    for (i, step) in pointer.iter().enumerate() {
        if i >= 2 {
            if let Some(target) = ref_pointer(current).filter(|p| is_local_ref(p)) {
                let mut next = parse_pointer(target);
                next.extend_from_slice(&pointer[i..]);
                return (Some(pointer[..i].to_vec()), Some(next));
            }
            if current.is_array() {
                return (Some(pointer[..i].to_vec()), None);
            }
        }
        current = match current.as_object().and_then(|map| map.get(step)) {
            Some(next) => next,
            None => return (None, None),
        };
    }
    (Some(pointer.to_vec()), None)
}

fn collect_local_refs(node: &Value, at_root: bool, stack: &mut Vec<Path>) {
    match node {
        Value::Object(map) => {
            if let Some(pointer) = map.get("$ref").and_then(Value::as_str) {
                if is_local_ref(pointer) {
                    stack.push(parse_pointer(pointer));
                }
            }
            for (key, child) in map {
                if at_root && (key == EXTERNAL_KEY || key == EXTERNAL_URLS_KEY) {
                    continue;
                }
                collect_local_refs(child, false, stack);
            }
        }
        Value::Array(arr) => arr.iter().for_each(|child| collect_local_refs(child, false, stack)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keeps_only_reached_subtrees() {
        let mut root = json!({
            "a": {"$ref": "#/x-ext/k1/d/e"},
            "x-ext": {"k1": {"d": {"e": {"type": "string"}, "f": {"type": "number"}}, "g": 1}},
        });
        assert_eq!(tree_shake(&mut root), 0);
        assert_eq!(
            root,
            json!({
                "a": {"$ref": "#/x-ext/k1/d/e"},
                "x-ext": {"k1": {"d": {"e": {"type": "string"}}}},
            })
        );
    }

    #[test]
    fn test_drops_unreached_documents_and_urls() {
        let mut root = json!({
            "a": {"$ref": "#/x-ext/k1"},
            "x-ext": {"k1": {"v": 1}, "k2": {"v": 2}},
            "x-ext-urls": {"k1": "/a.json", "k2": "/b.json"},
        });
        assert_eq!(tree_shake(&mut root), 1);
        assert_eq!(
            root,
            json!({
                "a": {"$ref": "#/x-ext/k1"},
                "x-ext": {"k1": {"v": 1}},
                "x-ext-urls": {"k1": "/a.json"},
            })
        );
    }

    #[test]
    fn test_removes_empty_namespace() {
        let mut root = json!({"info": {}, "x-ext": {"k1": {}}, "x-ext-urls": {"k1": "/a.json"}});
        assert_eq!(tree_shake(&mut root), 1);
        assert_eq!(root, json!({"info": {}}));
    }

    #[test]
    fn test_follows_references_inside_kept_content() {
        let mut root = json!({
            "a": {"$ref": "#/x-ext/k1/User"},
            "x-ext": {
                "k1": {
                    "User": {"properties": {"pet": {"$ref": "#/x-ext/k2/Pet"}}},
                    "Unused": {},
                },
                "k2": {"Pet": {"type": "object"}, "Other": {}},
            },
        });
        tree_shake(&mut root);
        assert_eq!(
            root["x-ext"],
            json!({
                "k1": {"User": {"properties": {"pet": {"$ref": "#/x-ext/k2/Pet"}}}},
                "k2": {"Pet": {"type": "object"}},
            })
        );
    }

    #[test]
    fn test_sequence_is_kept_whole() {
        let mut root = json!({
            "a": {"$ref": "#/x-ext/k1/list/1"},
            "x-ext": {"k1": {"list": [{"n": 0}, {"n": 1}], "other": true}},
        });
        tree_shake(&mut root);
        assert_eq!(root["x-ext"], json!({"k1": {"list": [{"n": 0}, {"n": 1}]}}));
    }

    #[test]
    fn test_pointer_through_reference_node() {
        let mut root = json!({
            "a": {"$ref": "#/x-ext/k1/alias/type"},
            "x-ext": {"k1": {"alias": {"$ref": "#/x-ext/k1/real"}, "real": {"type": "string"}, "junk": 1}},
        });
        tree_shake(&mut root);
        assert_eq!(
            root["x-ext"],
            json!({"k1": {"alias": {"$ref": "#/x-ext/k1/real"}, "real": {"type": "string"}}})
        );
    }

    #[test]
    fn test_cycles_terminate() {
        let mut root = json!({
            "a": {"$ref": "#/x-ext/k1/A"},
            "x-ext": {
                "k1": {"A": {"next": {"$ref": "#/x-ext/k1/B"}}, "B": {"next": {"$ref": "#/x-ext/k1/A"}}, "C": {}},
            },
        });
        tree_shake(&mut root);
        let k1 = root["x-ext"]["k1"].as_object().unwrap();
        assert_eq!(k1.keys().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_without_namespace_is_noop() {
        let mut root = json!({"a": {"$ref": "#/b"}, "b": 1});
        assert_eq!(tree_shake(&mut root), 0);
        assert_eq!(root, json!({"a": {"$ref": "#/b"}, "b": 1}));
    }
}
