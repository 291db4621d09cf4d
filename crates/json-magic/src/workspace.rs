//! An explicit store of named documents.
//!
//! Each entry keeps the source document and a working copy. The working copy
//! is a fully dereferenced view that callers edit freely; [`Workspace::save`]
//! reconciles it back into the source, [`Workspace::revert`] throws it away.
//!
//! ```
//! use json_magic::document::{Document, Format};
//! use json_magic::workspace::Workspace;
//! use serde_json::json;
//!
//! let mut workspace = Workspace::new();
//! workspace.add_document(
//!     "api",
//!     Document::new(json!({"info": {"title": "A"}, "x": {"$ref": "#/info"}}), "/specs/api.json"),
//! );
//!
//! workspace.document_mut("api").unwrap()["info"]["title"] = json!("B");
//! let skipped = workspace.save("api").unwrap();
//! assert!(skipped.is_empty());
//! assert_eq!(workspace.original("api").unwrap().root["info"]["title"], "B");
//! assert!(workspace.export("api", Format::Json).unwrap().contains("\"$ref\""));
//! ```

use indexmap::IndexMap;
use json_magic_pointer::Path;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::document::{to_text, Document, DocumentError, Format};
use crate::reconcile::{reconcile_into, ReconcileOptions};
use crate::reference::Resolver;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("unknown document: {name}")]
    UnknownDocument { name: String },
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Debug, Clone)]
struct Entry {
    original: Document,
    working: Value,
}

impl Entry {
    fn new(original: Document) -> Self {
        let working = resolved_view(&original);
        Self { original, working }
    }
}

fn resolved_view(document: &Document) -> Value {
    Resolver::new(&document.root)
        .with_location(&document.location)
        .resolve_deep(&document.root)
}

#[derive(Debug, Clone, Default)]
pub struct Workspace {
    documents: IndexMap<String, Entry>,
    options: ReconcileOptions,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ReconcileOptions) -> Self {
        Self {
            documents: IndexMap::new(),
            options,
        }
    }

    /// Adds or replaces the document stored under `name`.
    pub fn add_document(&mut self, name: impl Into<String>, document: Document) {
        let name = name.into();
        debug!(name = %name, location = %document.location, "Adding document");
        self.documents.insert(name, Entry::new(document));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    fn entry(&self, name: &str) -> Result<&Entry, WorkspaceError> {
        self.documents.get(name).ok_or_else(|| WorkspaceError::UnknownDocument {
            name: name.to_string(),
        })
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut Entry, WorkspaceError> {
        self.documents.get_mut(name).ok_or_else(|| WorkspaceError::UnknownDocument {
            name: name.to_string(),
        })
    }

    /// The working copy of `name`.
    pub fn document(&self, name: &str) -> Result<&Value, WorkspaceError> {
        Ok(&self.entry(name)?.working)
    }

    pub fn document_mut(&mut self, name: &str) -> Result<&mut Value, WorkspaceError> {
        Ok(&mut self.entry_mut(name)?.working)
    }

    /// The source document of `name` as last saved.
    pub fn original(&self, name: &str) -> Result<&Document, WorkspaceError> {
        Ok(&self.entry(name)?.original)
    }

    /// A resolver over the source document of `name`.
    pub fn resolver(&self, name: &str) -> Result<Resolver<'_>, WorkspaceError> {
        let original = &self.entry(name)?.original;
        Ok(Resolver::new(&original.root).with_location(&original.location))
    }

    /// Reconciles the working copy into the source and returns the paths whose
    /// edits were dropped. The working copy is rebuilt from the saved source.
    pub fn save(&mut self, name: &str) -> Result<Vec<Path>, WorkspaceError> {
        let options = self.options.clone();
        let entry = self.entry_mut(name)?;
        let reconciled = reconcile_into(&entry.original.root, &entry.working, &options);
        entry.original.root = reconciled.document;
        entry.working = resolved_view(&entry.original);
        debug!(name, skipped = reconciled.skipped.len(), "Saved document");
        Ok(reconciled.skipped)
    }

    /// Discards the edits made to the working copy.
    pub fn revert(&mut self, name: &str) -> Result<(), WorkspaceError> {
        let entry = self.entry_mut(name)?;
        entry.working = resolved_view(&entry.original);
        Ok(())
    }

    /// Renders the source document of `name` as text.
    pub fn export(&self, name: &str, format: Format) -> Result<String, WorkspaceError> {
        Ok(to_text(&self.entry(name)?.original.root, format)?)
    }
}
