use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use json_magic_pointer::format_pointer;
use serde_json::{json, Map, Value};

pub type SharedMap = Rc<RefCell<IndexMap<String, SharedNode>>>;
pub type SharedSeq = Rc<RefCell<Vec<SharedNode>>>;

/// A document node whose containers are reference counted.
///
/// Cloning a `SharedNode` clones the handle, not the container, so the same
/// map or sequence can sit under several parents (or under itself).
#[derive(Clone)]
pub enum SharedNode {
    Scalar(Value),
    Map(SharedMap),
    Seq(SharedSeq),
}

impl SharedNode {
    pub fn new_map() -> Self {
        SharedNode::Map(Rc::new(RefCell::new(IndexMap::new())))
    }

    pub fn new_seq() -> Self {
        SharedNode::Seq(Rc::new(RefCell::new(Vec::new())))
    }

    /// Container identity, `None` for scalars.
    pub fn identity(&self) -> Option<*const ()> {
        match self {
            SharedNode::Scalar(_) => None,
            SharedNode::Map(map) => Some(Rc::as_ptr(map) as *const ()),
            SharedNode::Seq(seq) => Some(Rc::as_ptr(seq) as *const ()),
        }
    }

    /// Returns `true` when both handles point at the same container.
    pub fn ptr_eq(&self, other: &SharedNode) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Child by map key or sequence index.
    pub fn get(&self, key: &str) -> Option<SharedNode> {
        match self {
            SharedNode::Scalar(_) => None,
            SharedNode::Map(map) => map.borrow().get(key).cloned(),
            SharedNode::Seq(seq) => {
                let idx: usize = key.parse().ok()?;
                seq.borrow().get(idx).cloned()
            }
        }
    }

    /// Inserts into a map node. Returns `false` if this is not a map.
    pub fn insert(&self, key: impl Into<String>, node: SharedNode) -> bool {
        match self {
            SharedNode::Map(map) => {
                map.borrow_mut().insert(key.into(), node);
                true
            }
            _ => false,
        }
    }

    /// Appends to a sequence node. Returns `false` if this is not a sequence.
    pub fn push(&self, node: SharedNode) -> bool {
        match self {
            SharedNode::Seq(seq) => {
                seq.borrow_mut().push(node);
                true
            }
            _ => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            SharedNode::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Builds a tree-shaped graph from a JSON value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(obj) => {
                let map = obj
                    .iter()
                    .map(|(k, v)| (k.clone(), SharedNode::from_value(v)))
                    .collect();
                SharedNode::Map(Rc::new(RefCell::new(map)))
            }
            Value::Array(arr) => {
                let seq = arr.iter().map(SharedNode::from_value).collect();
                SharedNode::Seq(Rc::new(RefCell::new(seq)))
            }
            scalar => SharedNode::Scalar(scalar.clone()),
        }
    }

    /// Flattens the graph into a JSON value.
    ///
    /// Aliased containers are written out once per path. A container that
    /// contains itself is written as `{"$ref": "#/..."}` pointing at the
    /// ancestor where the cycle starts, which keeps the output finite.
    pub fn to_value(&self) -> Value {
        let mut ancestors = Vec::new();
        let mut path = Vec::new();
        self.to_value_at(&mut ancestors, &mut path)
    }

    fn to_value_at(&self, ancestors: &mut Vec<(*const (), usize)>, path: &mut Vec<String>) -> Value {
        let Some(id) = self.identity() else {
            return self.as_scalar().cloned().unwrap_or(Value::Null);
        };
        if let Some(&(_, depth)) = ancestors.iter().find(|(ancestor, _)| *ancestor == id) {
            return json!({ "$ref": format_pointer(&path[..depth]) });
        }
        ancestors.push((id, path.len()));
        let out = match self {
            SharedNode::Map(map) => {
                let mut out = Map::new();
                for (key, child) in map.borrow().iter() {
                    path.push(key.clone());
                    out.insert(key.clone(), child.to_value_at(ancestors, path));
                    path.pop();
                }
                Value::Object(out)
            }
            SharedNode::Seq(seq) => {
                let mut out = Vec::new();
                for (idx, child) in seq.borrow().iter().enumerate() {
                    path.push(idx.to_string());
                    out.push(child.to_value_at(ancestors, path));
                    path.pop();
                }
                Value::Array(out)
            }
            SharedNode::Scalar(value) => value.clone(),
        };
        ancestors.pop();
        out
    }
}

impl fmt::Debug for SharedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharedNode::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            SharedNode::Map(map) => write!(f, "Map({:p})", Rc::as_ptr(map)),
            SharedNode::Seq(seq) => write!(f, "Seq({:p})", Rc::as_ptr(seq)),
        }
    }
}

/// Deep-copies a node graph.
///
/// Every input container is copied exactly once: the copy is registered
/// against the input container's identity before its children are visited,
/// so reaching the same container again (through an alias or a cycle) reuses
/// the copy. The result has the same sharing as the input and terminates on
/// cyclic graphs.
pub fn deep_clone(node: &SharedNode) -> SharedNode {
    let mut seen = HashMap::new();
    clone_node(node, &mut seen)
}

fn clone_node(node: &SharedNode, seen: &mut HashMap<*const (), SharedNode>) -> SharedNode {
    if let Some(copy) = node.identity().and_then(|id| seen.get(&id)) {
        return copy.clone();
    }
    match node {
        SharedNode::Scalar(value) => SharedNode::Scalar(value.clone()),
        SharedNode::Map(map) => {
            let copy: SharedMap = Rc::new(RefCell::new(IndexMap::with_capacity(map.borrow().len())));
            seen.insert(Rc::as_ptr(map) as *const (), SharedNode::Map(Rc::clone(&copy)));
            for (key, child) in map.borrow().iter() {
                let child = clone_node(child, seen);
                copy.borrow_mut().insert(key.clone(), child);
            }
            SharedNode::Map(copy)
        }
        SharedNode::Seq(seq) => {
            let copy: SharedSeq = Rc::new(RefCell::new(Vec::with_capacity(seq.borrow().len())));
            seen.insert(Rc::as_ptr(seq) as *const (), SharedNode::Seq(Rc::clone(&copy)));
            for child in seq.borrow().iter() {
                let child = clone_node(child, seen);
                copy.borrow_mut().push(child);
            }
            SharedNode::Seq(copy)
        }
    }
}
