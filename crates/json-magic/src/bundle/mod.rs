//! Bundling: inline every externally referenced document into one tree.
//!
//! External documents are stored under the [`EXTERNAL_KEY`] namespace at the
//! root, each under a key derived from its absolute location, and every
//! external `$ref` is rewritten into a local pointer into that namespace.
//!
//! ```no_run
//! use json_magic::bundle::{BundleOptions, Bundler};
//!
//! # async fn run() -> Result<(), json_magic::bundle::BundleError> {
//! let bundler = Bundler::new(BundleOptions { tree_shake: true, ..Default::default() })
//!     .with_default_loaders();
//! let document = bundler.bundle("specs/openapi.yaml").await?;
//! println!("{}", serde_json::to_string_pretty(&document.root).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

mod loader;
mod tree_shake;

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use json_magic_pointer::{build_path, format_pointer, get, get_mut, parse_pointer, Path, Pointer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::document::{parse_document, Document};
use crate::location::{absolute_location, is_local_ref, resolve_reference_path};
use crate::reference::REF_KEY;

pub use loader::{FileLoader, LoadError, Loader, UrlLoader};
pub use tree_shake::tree_shake;

use loader::DocumentCache;

/// Root key under which external documents are inlined.
pub const EXTERNAL_KEY: &str = "x-ext";

/// Root key mapping namespace keys back to their source locations.
pub const EXTERNAL_URLS_KEY: &str = "x-ext-urls";

const KEY_LENGTH: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error("no loader can handle {location}")]
    NoLoader { location: String },
    #[error("failed to load {location}: {reason}")]
    Load { location: String, reason: String },
    #[error("failed to parse {location}: {reason}")]
    Parse { location: String, reason: String },
    #[error("cannot inline documents into {location}: root is not a map")]
    InvalidRoot { location: String },
    #[error("nothing to bundle at {path}")]
    MissingPath { path: String },
}

/// Bundling switches. Loaders and hooks are attached to the [`Bundler`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundleOptions {
    /// Drop inlined content that no local pointer reaches.
    pub tree_shake: bool,
    /// Record each namespace key's source location under [`EXTERNAL_URLS_KEY`].
    pub url_map: bool,
    /// Base location for [`Bundler::bundle_document`] and
    /// [`Bundler::bundle_at`], overriding the document's own location.
    pub origin: Option<String>,
    /// How many segments below the start of each walk a Reference Node may
    /// sit and still be followed. Deeper references are left untouched.
    pub depth: Option<usize>,
}

/// Callbacks invoked while bundling. Every method defaults to a no-op.
pub trait BundleHooks: Send + Sync {
    /// Called for every map before its `$ref` and children are inspected.
    fn on_before_node(&self, _node: &mut Map<String, Value>) {}

    /// Called for every map after its children have been visited.
    fn on_after_node(&self, _node: &mut Map<String, Value>) {}

    fn on_resolve_start(&self, _location: &str) {}

    fn on_resolve_error(&self, _location: &str, _error: &BundleError) {}
}

/// Derives the namespace key for an absolute location.
pub fn location_key(location: &str) -> String {
    let digest = hex::encode(Sha256::digest(location.as_bytes()));
    digest[..KEY_LENGTH].to_string()
}

pub struct Bundler {
    options: BundleOptions,
    loaders: Vec<Arc<dyn Loader>>,
    hooks: Option<Arc<dyn BundleHooks>>,
}

/// A reference found during traversal: where it sits and where it points.
struct ExternalRef {
    node_path: Path,
    location: String,
    fragment: Path,
}

impl Bundler {
    pub fn new(options: BundleOptions) -> Self {
        Self {
            options,
            loaders: Vec::new(),
            hooks: None,
        }
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    /// Registers [`FileLoader`] and [`UrlLoader`].
    pub fn with_default_loaders(self) -> Self {
        self.with_loader(FileLoader).with_loader(UrlLoader::default())
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn BundleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    /// Loads the document at `entry` and bundles it.
    ///
    /// # Errors
    ///
    /// - `BundleError::NoLoader` when no loader accepts the entry or one of
    ///   its external references.
    /// - `BundleError::Load` / `BundleError::Parse` for the first document
    ///   that fails to load.
    pub async fn bundle(&self, entry: &str) -> Result<Document, BundleError> {
        let cache = DocumentCache::default();
        let mut root = self.fetch(&cache, entry).await?;
        let location = self
            .options
            .origin
            .clone()
            .unwrap_or_else(|| absolute_location(entry));
        self.inline(&mut root, Vec::new(), &location, &cache, self.options.url_map).await?;
        Ok(Document::new(root, location))
    }

    /// Bundles an already parsed document.
    ///
    /// External pointers resolve against [`BundleOptions::origin`] when set,
    /// otherwise against the document's location. The input is not modified.
    pub async fn bundle_document(&self, document: &Document) -> Result<Document, BundleError> {
        let cache = DocumentCache::default();
        let location = match &self.options.origin {
            Some(origin) => origin.clone(),
            None => absolute_location(&document.location),
        };
        let mut root = document.root.clone();
        self.inline(&mut root, Vec::new(), &location, &cache, self.options.url_map).await?;
        Ok(Document {
            root,
            location,
            name: document.name.clone(),
        })
    }

    /// Bundles only the subtree at `path`, in place.
    ///
    /// Inlined documents still land in the root namespace of `document`, and
    /// the [`EXTERNAL_URLS_KEY`] map is always written so later calls on
    /// other subtrees reuse what is already inlined instead of loading it
    /// again. References outside `path` are left as they are.
    ///
    /// # Errors
    ///
    /// `BundleError::MissingPath` when nothing exists at `path`, plus the
    /// errors of [`bundle`](Self::bundle).
    pub async fn bundle_at(&self, document: &mut Document, path: &[String]) -> Result<(), BundleError> {
        if get(&document.root, path).is_none() {
            return Err(BundleError::MissingPath {
                path: format_pointer(path),
            });
        }
        let cache = DocumentCache::default();
        let location = match &self.options.origin {
            Some(origin) => origin.clone(),
            None => absolute_location(&document.location),
        };
        self.inline(&mut document.root, path.to_vec(), &location, &cache, true).await
    }

    async fn inline(
        &self,
        root: &mut Value,
        start: Path,
        origin: &str,
        cache: &DocumentCache,
        url_map: bool,
    ) -> Result<(), BundleError> {
        let mut inlined = already_inlined(root);
        let mut queue: VecDeque<(Path, String)> = VecDeque::from([(start, origin.to_string())]);

        while let Some((scope_path, scope_location)) = queue.pop_front() {
            let mut found = Vec::new();
            if let Some(scope) = get_mut(root, &scope_path) {
                let mut path = scope_path.clone();
                self.collect(scope, &mut path, scope_path.len(), &mut found);
            }

            let refs: Vec<ExternalRef> = found
                .into_iter()
                .filter_map(|(node_path, pointer)| match Pointer::parse(&pointer) {
                    Ok(Pointer::External { location, path }) => Some(ExternalRef {
                        node_path,
                        location: resolve_reference_path(&scope_location, &location),
                        fragment: path,
                    }),
                    _ => {
                        warn!(pointer = %pointer, "skipping malformed reference");
                        None
                    }
                })
                .collect();

            let mut pending: Vec<&str> = Vec::new();
            for external in &refs {
                let location = external.location.as_str();
                if location != origin && !inlined.contains_key(location) && !pending.contains(&location) {
                    pending.push(location);
                }
            }

            let loaded = join_all(pending.iter().map(|location| self.fetch(cache, location))).await;
            for (location, result) in pending.iter().zip(loaded) {
                let mut document = result?;
                let key = location_key(location);
                debug!(location = %location, key = %key, "inlining external document");
                prefix_internal_refs(&mut document, &[EXTERNAL_KEY.to_string(), key.clone()]);
                namespace(root, EXTERNAL_KEY, origin)?.insert(key.clone(), document);
                if url_map {
                    namespace(root, EXTERNAL_URLS_KEY, origin)?
                        .insert(key.clone(), Value::String(location.to_string()));
                }
                queue.push_back((vec![EXTERNAL_KEY.to_string(), key.clone()], location.to_string()));
                inlined.insert(location.to_string(), key);
            }

            for external in refs {
                let rewritten = if external.location == origin {
                    format_pointer(&external.fragment)
                } else {
                    let Some(key) = inlined.get(&external.location) else {
                        continue;
                    };
                    let mut path = vec![EXTERNAL_KEY.to_string(), key.clone()];
                    path.extend(external.fragment);
                    format_pointer(&path)
                };
                if let Some(Value::Object(node)) = get_mut(root, &external.node_path) {
                    node.insert(REF_KEY.to_string(), Value::String(rewritten));
                }
            }
        }

        let pruned = if self.options.tree_shake { tree_shake(root) } else { 0 };
        info!(origin, inlined = inlined.len(), pruned, "bundled document");
        Ok(())
    }

    /// Walks `node` and records every external `$ref` below it. At the
    /// document root the namespace keys are skipped. `start` is the length of
    /// the path the walk began at.
    fn collect(&self, node: &mut Value, path: &mut Path, start: usize, found: &mut Vec<(Path, String)>) {
        if self.options.depth.is_some_and(|depth| path.len() - start > depth) {
            return;
        }
        let at_root = path.is_empty();
        match node {
            Value::Object(map) => {
                if let Some(hooks) = &self.hooks {
                    hooks.on_before_node(map);
                }
                if let Some(pointer) = map.get(REF_KEY).and_then(Value::as_str) {
                    if !is_local_ref(pointer) {
                        found.push((path.clone(), pointer.to_string()));
                    }
                }
                for (key, child) in map.iter_mut() {
                    if at_root && (key == EXTERNAL_KEY || key == EXTERNAL_URLS_KEY) {
                        continue;
                    }
                    path.push(key.clone());
                    self.collect(child, path, start, found);
                    path.pop();
                }
                if let Some(hooks) = &self.hooks {
                    hooks.on_after_node(map);
                }
            }
            Value::Array(arr) => {
                for (idx, child) in arr.iter_mut().enumerate() {
                    path.push(idx.to_string());
                    self.collect(child, path, start, found);
                    path.pop();
                }
            }
            _ => {}
        }
    }

    async fn fetch(&self, cache: &DocumentCache, location: &str) -> Result<Value, BundleError> {
        let result = cache
            .get_or_load(location, move || async move {
                if let Some(hooks) = &self.hooks {
                    hooks.on_resolve_start(location);
                }
                let loader = self
                    .loaders
                    .iter()
                    .find(|loader| loader.check(location))
                    .ok_or_else(|| BundleError::NoLoader {
                        location: location.to_string(),
                    })?;
                debug!(location, "loading document");
                let text = loader.get(location).await.map_err(|e| BundleError::Load {
                    location: location.to_string(),
                    reason: e.to_string(),
                })?;
                parse_document(&text).map_err(|e| BundleError::Parse {
                    location: location.to_string(),
                    reason: e.to_string(),
                })
            })
            .await;
        if let Err(error) = &result {
            warn!(location, %error, "failed to resolve document");
            if let Some(hooks) = &self.hooks {
                hooks.on_resolve_error(location, error);
            }
        }
        result
    }
}

/// Returns the root-level map stored under `key`, creating it if needed.
fn namespace<'a>(root: &'a mut Value, key: &str, origin: &str) -> Result<&'a mut Map<String, Value>, BundleError> {
    let invalid = || BundleError::InvalidRoot {
        location: origin.to_string(),
    };
    if !root.is_object() {
        return Err(invalid());
    }
    build_path(root, &[key.to_string()])
        .ok()
        .and_then(Value::as_object_mut)
        .ok_or_else(invalid)
}

/// Locations inlined by an earlier run, recovered from the URL map.
fn already_inlined(root: &Value) -> IndexMap<String, String> {
    let Some(Value::Object(urls)) = root.get(EXTERNAL_URLS_KEY) else {
        return IndexMap::new();
    };
    let namespace = root.get(EXTERNAL_KEY);
    urls.iter()
        .filter(|(key, _)| namespace.is_some_and(|ns| ns.get(key.as_str()).is_some()))
        .filter_map(|(key, location)| Some((location.as_str()?.to_string(), key.clone())))
        .collect()
}

/// Rewrites local pointers inside a document that is about to be inlined at
/// `prefix`, so they keep pointing into that document. Pointers that already
/// start with `prefix` are left alone.
fn prefix_internal_refs(node: &mut Value, prefix: &[String]) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(pointer)) = map.get_mut(REF_KEY) {
                if is_local_ref(pointer) {
                    let path = parse_pointer(pointer);
                    if !path.starts_with(prefix) {
                        let mut prefixed = prefix.to_vec();
                        prefixed.extend(path);
                        *pointer = format_pointer(&prefixed);
                    }
                }
            }
            for child in map.values_mut() {
                prefix_internal_refs(child, prefix);
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(|child| prefix_internal_refs(child, prefix)),
        _ => {}
    }
}

/// Source location recorded for a namespace key, if the bundle has a URL map.
pub fn source_location<'a>(root: &'a Value, key: &str) -> Option<&'a str> {
    get(root, &[EXTERNAL_URLS_KEY.to_string(), key.to_string()])?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_location_key_is_stable() {
        let a = location_key("https://example.com/a.json");
        assert_eq!(a.len(), KEY_LENGTH);
        assert_eq!(a, location_key("https://example.com/a.json"));
        assert_ne!(a, location_key("https://example.com/b.json"));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_prefix_internal_refs() {
        let prefix = vec![EXTERNAL_KEY.to_string(), "k".to_string()];
        let mut doc = json!({
            "a": {"$ref": "#/defs/a"},
            "b": [{"$ref": "#"}],
            "c": {"$ref": "other.json#/x"},
            "d": {"$ref": "#/x-ext/k/defs/a"},
        });
        prefix_internal_refs(&mut doc, &prefix);
        assert_eq!(
            doc,
            json!({
                "a": {"$ref": "#/x-ext/k/defs/a"},
                "b": [{"$ref": "#/x-ext/k"}],
                "c": {"$ref": "other.json#/x"},
                "d": {"$ref": "#/x-ext/k/defs/a"},
            })
        );
    }

    #[test]
    fn test_namespace_requires_map_root() {
        let mut root = json!([1]);
        assert!(matches!(
            namespace(&mut root, EXTERNAL_KEY, "/a.json"),
            Err(BundleError::InvalidRoot { .. })
        ));
        let mut root = json!({"openapi": "3.1.0"});
        namespace(&mut root, EXTERNAL_KEY, "/a.json").unwrap().insert("k".into(), json!(1));
        assert_eq!(root, json!({"openapi": "3.1.0", "x-ext": {"k": 1}}));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: BundleOptions = serde_json::from_value(json!({"treeShake": true})).unwrap();
        assert_eq!(
            options,
            BundleOptions {
                tree_shake: true,
                url_map: false,
                origin: None,
                depth: None,
            }
        );
        let limited: BundleOptions = serde_json::from_value(json!({"depth": 2})).unwrap();
        assert_eq!(limited.depth, Some(2));
    }

    #[test]
    fn test_already_inlined_reads_url_map() {
        let root = json!({
            "x-ext": {"abc": {}},
            "x-ext-urls": {"abc": "https://example.com/a.json", "gone": "https://example.com/b.json"},
        });
        let inlined = already_inlined(&root);
        assert_eq!(inlined.len(), 1);
        assert_eq!(inlined["https://example.com/a.json"], "abc");
        assert!(already_inlined(&json!({"a": 1})).is_empty());
    }

    #[test]
    fn test_source_location() {
        let root = json!({"x-ext-urls": {"abc": "https://example.com/a.json"}});
        assert_eq!(source_location(&root, "abc"), Some("https://example.com/a.json"));
        assert_eq!(source_location(&root, "def"), None);
    }
}
