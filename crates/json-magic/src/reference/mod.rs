//! Reference resolution.
//!
//! A Reference Node is a map with a string `$ref` member. [`Resolver`] gives a
//! dereferenced view of a document: every lookup goes through an explicit
//! call, chains of references collapse to their final target, and a cycle
//! produces [`Unresolved::Cycle`] instead of recursing.
//!
//! ```
//! use json_magic::reference::{Resolved, Resolver};
//! use serde_json::json;
//!
//! let doc = json!({
//!     "a": {"$ref": "#/b"},
//!     "b": {"$ref": "#/c"},
//!     "c": {"type": "string"},
//! });
//! let resolver = Resolver::new(&doc);
//! assert_eq!(resolver.resolve(&doc["a"]).value(), Some(&json!({"type": "string"})));
//! ```
//!
//! Schemas in the root document can also be addressed by `$id`, and by
//! `$anchor` relative to the closest enclosing `$id`; see
//! [`schema_identifiers`].

mod write;

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use json_magic_pointer::{format_pointer, parse_json_pointer, JsonPointerError, Path, Pointer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

use crate::location::resolve_reference_path;

pub use write::write_through;

/// The reserved member holding a pointer.
pub const REF_KEY: &str = "$ref";

pub const ID_KEY: &str = "$id";

pub const ANCHOR_KEY: &str = "$anchor";

/// Documents available to external pointers, keyed by absolute location.
pub type ExternalDocuments = HashMap<String, Value>;

/// Returns the pointer string if `node` is a Reference Node.
pub fn ref_pointer(node: &Value) -> Option<&str> {
    node.as_object()?.get(REF_KEY)?.as_str()
}

pub fn is_ref_node(node: &Value) -> bool {
    ref_pointer(node).is_some()
}

/// The non-empty `$id` of a map node.
pub fn schema_id(node: &Value) -> Option<&str> {
    node.as_object()?
        .get(ID_KEY)?
        .as_str()
        .filter(|id| !id.is_empty())
}

/// Maps every `$id` and `$anchor` in `root` to the path of the node that
/// declares it.
///
/// An anchor is keyed as `<base>#<anchor>`, where `<base>` is the closest
/// `$id` at or above it, or empty when there is none. The first declaration
/// of a key wins.
///
/// ```
/// use json_magic::reference::schema_identifiers;
/// use serde_json::json;
///
/// let doc = json!({
///     "$id": "https://example.com/root",
///     "defs": {"user": {"$anchor": "user"}},
/// });
/// let ids = schema_identifiers(&doc);
/// assert_eq!(ids["https://example.com/root"], Vec::<String>::new());
/// assert_eq!(ids["https://example.com/root#user"], vec!["defs", "user"]);
/// ```
pub fn schema_identifiers(root: &Value) -> IndexMap<String, Path> {
    let mut found = IndexMap::new();
    collect_identifiers(root, "", &mut Vec::new(), &mut found);
    found
}

fn collect_identifiers(node: &Value, base: &str, path: &mut Path, found: &mut IndexMap<String, Path>) {
    match node {
        Value::Object(map) => {
            let base = match schema_id(node) {
                Some(id) => {
                    found.entry(id.to_string()).or_insert_with(|| path.clone());
                    id
                }
                None => base,
            };
            if let Some(anchor) = map.get(ANCHOR_KEY).and_then(Value::as_str) {
                found.entry(format!("{base}#{anchor}")).or_insert_with(|| path.clone());
            }
            for (key, child) in map {
                path.push(key.clone());
                collect_identifiers(child, base, path, found);
                path.pop();
            }
        }
        Value::Array(arr) => {
            for (idx, child) in arr.iter().enumerate() {
                path.push(idx.to_string());
                collect_identifiers(child, base, path, found);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Why a reference produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    /// The pointer leads back into a reference that is already being
    /// followed. This is the defined result for circular references.
    Cycle { pointer: String },
    Missing { pointer: String },
    Malformed { pointer: String, reason: JsonPointerError },
    UnknownDocument { location: String },
}

impl Unresolved {
    pub fn is_cycle(&self) -> bool {
        matches!(self, Unresolved::Cycle { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
    Value(&'a Value),
    Unresolved(Unresolved),
}

impl<'a> Resolved<'a> {
    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Resolved::Value(value) => Some(value),
            Resolved::Unresolved(_) => None,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Resolved::Unresolved(u) if u.is_cycle())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("malformed pointer {pointer}: {source}")]
    Pointer {
        pointer: String,
        #[source]
        source: JsonPointerError,
    },
    #[error("unresolved reference {pointer}")]
    Unresolved { pointer: String },
    #[error("unknown document {location}")]
    UnknownDocument { location: String },
    #[error("cannot write through external reference {pointer}")]
    ExternalWrite { pointer: String },
    #[error("cannot write at {path}: {source}")]
    NotWritable {
        path: String,
        #[source]
        source: JsonPointerError,
    },
    #[error("cannot replace the document root through a reference")]
    RootWrite,
}

impl From<Unresolved> for ResolveError {
    fn from(value: Unresolved) -> Self {
        match value {
            Unresolved::Cycle { pointer } | Unresolved::Missing { pointer } => {
                ResolveError::Unresolved { pointer }
            }
            Unresolved::Malformed { pointer, reason } => ResolveError::Pointer {
                pointer,
                source: reason,
            },
            Unresolved::UnknownDocument { location } => ResolveError::UnknownDocument { location },
        }
    }
}

/// The document a pointer is evaluated in.
#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    root: &'a Value,
    location: &'a str,
}

/// Dereferencing view over a document and the external documents it points to.
///
/// Lenient calls ([`resolve`](Self::resolve), [`get`](Self::get),
/// [`resolve_deep`](Self::resolve_deep)) turn a bad reference into an
/// [`Unresolved`] value at that spot. The `try_` variants report missing
/// targets, malformed pointers and unknown documents as errors; a cycle is
/// still returned as a value.
///
/// Pointers naming a `$id` or `$anchor` of the root document resolve there
/// before being treated as fragments or external locations.
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    root: &'a Value,
    location: &'a str,
    externals: Option<&'a ExternalDocuments>,
    identifiers: OnceCell<IndexMap<String, Path>>,
}

impl<'a> Resolver<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            location: "",
            externals: None,
            identifiers: OnceCell::new(),
        }
    }

    /// Sets the location of the root document, the base for external pointers.
    pub fn with_location(mut self, location: &'a str) -> Self {
        self.location = location;
        self
    }

    pub fn with_externals(mut self, externals: &'a ExternalDocuments) -> Self {
        self.externals = Some(externals);
        self
    }

    pub fn root(&self) -> &'a Value {
        self.root
    }

    /// Resolves `node`, which is taken to live in the root document.
    ///
    /// Non-reference nodes come back as they are. References are followed
    /// until a non-reference value is reached.
    pub fn resolve(&self, node: &'a Value) -> Resolved<'a> {
        match self.resolve_in(node, self.scope(), &mut HashSet::new()) {
            Ok((value, _)) => Resolved::Value(value),
            Err(unresolved) => Resolved::Unresolved(unresolved),
        }
    }

    pub fn try_resolve(&self, node: &'a Value) -> Result<Resolved<'a>, ResolveError> {
        match self.resolve(node) {
            Resolved::Unresolved(unresolved) if !unresolved.is_cycle() => Err(unresolved.into()),
            resolved => Ok(resolved),
        }
    }

    /// Reads `path` from the root, following references at every step,
    /// including into external documents.
    pub fn get(&self, path: &[String]) -> Resolved<'a> {
        let mut visiting = HashSet::new();
        let walked = self
            .walk(self.scope(), path, &mut visiting)
            .and_then(|(node, scope)| self.resolve_in(node, scope, &mut visiting));
        match walked {
            Ok((value, _)) => Resolved::Value(value),
            Err(unresolved) => Resolved::Unresolved(unresolved),
        }
    }

    pub fn try_get(&self, path: &[String]) -> Result<Resolved<'a>, ResolveError> {
        match self.get(path) {
            Resolved::Unresolved(unresolved) if !unresolved.is_cycle() => Err(unresolved.into()),
            resolved => Ok(resolved),
        }
    }

    /// Reads `path` without following any reference, so Reference Nodes are
    /// seen as the literal `{"$ref": ...}` maps they are.
    pub fn get_raw(&self, path: &[String]) -> Option<&'a Value> {
        json_magic_pointer::get(self.root, path)
    }

    /// Returns a copy of `node` with every reference replaced by its target.
    ///
    /// A reference that would expand into itself, or that cannot be resolved,
    /// is kept as its literal Reference Node.
    pub fn resolve_deep(&self, node: &'a Value) -> Value {
        let mut active = HashSet::new();
        match self.deep(node, self.scope(), &mut active, false) {
            Ok(value) => value,
            Err(_) => node.clone(),
        }
    }

    /// Like [`resolve_deep`](Self::resolve_deep), but fails on the first
    /// reference that is missing, malformed or points at an unknown document.
    pub fn try_resolve_deep(&self, node: &'a Value) -> Result<Value, ResolveError> {
        let mut active = HashSet::new();
        self.deep(node, self.scope(), &mut active, true)
    }

    fn scope(&self) -> Scope<'a> {
        Scope {
            root: self.root,
            location: self.location,
        }
    }

    fn resolve_in(
        &self,
        node: &'a Value,
        scope: Scope<'a>,
        visiting: &mut HashSet<String>,
    ) -> Result<(&'a Value, Scope<'a>), Unresolved> {
        let mut entered = Vec::new();
        let result = self.follow(node, scope, visiting, &mut entered);
        for identity in entered {
            visiting.remove(&identity);
        }
        result
    }

    fn follow(
        &self,
        mut node: &'a Value,
        mut scope: Scope<'a>,
        visiting: &mut HashSet<String>,
        entered: &mut Vec<String>,
    ) -> Result<(&'a Value, Scope<'a>), Unresolved> {
        while let Some(pointer) = ref_pointer(node) {
            let (parsed, target_scope, identity) = self.target(pointer, scope)?;
            if !visiting.insert(identity.clone()) {
                trace!(pointer, "reference cycle");
                return Err(Unresolved::Cycle {
                    pointer: pointer.to_string(),
                });
            }
            entered.push(identity);
            let (value, reached) = self
                .walk(target_scope, parsed.path(), visiting)
                .map_err(|unresolved| match unresolved {
                    Unresolved::Missing { .. } => Unresolved::Missing {
                        pointer: pointer.to_string(),
                    },
                    other => other,
                })?;
            node = value;
            scope = reached;
        }
        Ok((node, scope))
    }

    fn target(&self, pointer: &str, scope: Scope<'a>) -> Result<(Pointer, Scope<'a>, String), Unresolved> {
        if let Some(path) = self.identified(pointer, scope) {
            let identity = format!("{}{}", self.location, format_pointer(&path));
            return Ok((Pointer::Local(path), self.scope(), identity));
        }
        let parsed = Pointer::parse(pointer).map_err(|reason| Unresolved::Malformed {
            pointer: pointer.to_string(),
            reason,
        })?;
        let target_scope = match &parsed {
            Pointer::Local(_) => scope,
            Pointer::External { location, .. } => self.document(scope.location, location)?,
        };
        let identity = format!("{}{}", target_scope.location, format_pointer(parsed.path()));
        Ok((parsed, target_scope, identity))
    }

    /// Looks `pointer` up among the `$id`s and `$anchor`s of the root document.
    fn identified(&self, pointer: &str, scope: Scope<'a>) -> Option<Path> {
        if !std::ptr::eq(scope.root, self.root) {
            return None;
        }
        let ids = self.identifiers.get_or_init(|| schema_identifiers(self.root));
        if ids.is_empty() {
            return None;
        }
        match pointer.split_once('#') {
            None => ids.get(pointer).cloned(),
            Some(("", anchor)) if !anchor.is_empty() && !anchor.starts_with('/') => {
                if let Some(path) = ids.get(pointer) {
                    return Some(path.clone());
                }
                let root_id = schema_id(self.root)?;
                ids.get(&format!("{root_id}#{anchor}")).cloned()
            }
            Some(("", _)) => None,
            Some((base, fragment)) if fragment.is_empty() || fragment.starts_with('/') => {
                let mut path = ids.get(base)?.clone();
                path.extend(parse_json_pointer(fragment));
                Some(path)
            }
            Some(_) => ids.get(pointer).cloned(),
        }
    }

    fn document(&self, base: &str, location: &str) -> Result<Scope<'a>, Unresolved> {
        let unknown = |location: String| Unresolved::UnknownDocument { location };
        let externals = self.externals.ok_or_else(|| unknown(location.to_string()))?;
        if let Some((key, root)) = externals.get_key_value(location) {
            return Ok(Scope { root, location: key });
        }
        let absolute = resolve_reference_path(base, location);
        match externals.get_key_value(&absolute) {
            Some((key, root)) => Ok(Scope { root, location: key }),
            None => Err(unknown(absolute)),
        }
    }

    fn walk(
        &self,
        scope: Scope<'a>,
        path: &[String],
        visiting: &mut HashSet<String>,
    ) -> Result<(&'a Value, Scope<'a>), Unresolved> {
        let mut current = scope.root;
        let mut scope = scope;
        for step in path {
            let (container, reached) = self.resolve_in(current, scope, visiting)?;
            let next = match container {
                Value::Object(map) => map.get(step),
                Value::Array(arr) => step.parse::<usize>().ok().and_then(|idx| arr.get(idx)),
                _ => None,
            };
            current = next.ok_or_else(|| Unresolved::Missing {
                pointer: format_pointer(path),
            })?;
            scope = reached;
        }
        Ok((current, scope))
    }

    fn deep(
        &self,
        node: &'a Value,
        scope: Scope<'a>,
        active: &mut HashSet<String>,
        strict: bool,
    ) -> Result<Value, ResolveError> {
        let (target, scope, entered) = match ref_pointer(node) {
            None => (node, scope, None),
            Some(pointer) => {
                let identity = self.target(pointer, scope).ok().map(|(_, _, identity)| identity);
                if identity.as_ref().is_some_and(|id| active.contains(id)) {
                    return Ok(node.clone());
                }
                match self.resolve_in(node, scope, &mut HashSet::new()) {
                    Ok((target, reached)) => (target, reached, identity),
                    Err(unresolved) if strict && !unresolved.is_cycle() => return Err(unresolved.into()),
                    Err(_) => return Ok(node.clone()),
                }
            }
        };

        if let Some(identity) = &entered {
            active.insert(identity.clone());
        }
        let out = match target {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, child) in map {
                    out.insert(key.clone(), self.deep(child, scope, active, strict)?);
                }
                Value::Object(out)
            }
            Value::Array(arr) => Value::Array(
                arr.iter()
                    .map(|child| self.deep(child, scope, active, strict))
                    .collect::<Result<_, _>>()?,
            ),
            scalar => scalar.clone(),
        };
        if let Some(identity) = entered {
            active.remove(&identity);
        }
        Ok(out)
    }
}
