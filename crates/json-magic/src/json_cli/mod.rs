//! Core logic behind the `json-magic` binary.
//!
//! - `bundle`  inline every external `$ref` of a document
//! - `diff`    structural diff of two documents, optionally grouped
//! - `migrate` upgrade persisted data to the latest built-in version

use serde::Serialize;
use serde_json::Value;

use crate::bundle::{BundleError, BundleOptions, Bundler, FileLoader, Loader, UrlLoader};
use crate::diff::{by_prefix, diff, group};
use crate::document::{parse_document, to_text, Document, DocumentError, Format};
use crate::location::{absolute_location, is_remote_url};
use crate::migrate::{builtin, PersistedState};
use crate::Result;

// ── Input ─────────────────────────────────────────────────────────────────

/// Reads and parses the document at a file path or URL.
pub async fn load_document(location: &str) -> Result<Document> {
    let text = if is_remote_url(location) {
        UrlLoader::default().get(location).await
    } else {
        FileLoader.get(location).await
    }
    .map_err(|e| BundleError::Load {
        location: location.to_string(),
        reason: e.to_string(),
    })?;
    let root = parse_document(&text).map_err(|e| BundleError::Parse {
        location: location.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Document::new(root, absolute_location(location)))
}

// ── Output ────────────────────────────────────────────────────────────────

/// Pretty text for `value`, in `format` or else the format implied by
/// `location`'s extension.
pub fn render(value: &Value, format: Option<Format>, location: Option<&str>) -> Result<String> {
    let format = format
        .or_else(|| location.map(Format::from_location))
        .unwrap_or_default();
    Ok(to_text(value, format)?)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value).map_err(|e| DocumentError::Serialize(e.to_string()))?)
}

// ── bundle ────────────────────────────────────────────────────────────────

/// Bundles `input` with the file-system and URL loaders.
pub async fn bundle(input: &str, options: BundleOptions) -> Result<Document> {
    let bundler = Bundler::new(options).with_default_loaders();
    Ok(bundler.bundle(input).await?)
}

// ── diff ──────────────────────────────────────────────────────────────────

/// The diff of two trees as JSON: a list of entries, or a list of groups
/// keyed by the first `group_depth` path segments.
pub fn diff_values(before: &Value, after: &Value, group_depth: Option<usize>) -> Result<Value> {
    let entries = diff(before, after);
    match group_depth {
        Some(depth) => to_value(&group(&entries, by_prefix(depth))),
        None => to_value(&entries),
    }
}

// ── migrate ───────────────────────────────────────────────────────────────

/// Reads persisted data. Text shaped as `{"version": .., "data": ..}` carries
/// its own marker; anything else is unversioned data.
pub fn read_state(text: &str) -> Result<PersistedState> {
    let value = parse_document(text)?;
    let is_state = value
        .as_object()
        .is_some_and(|map| map.contains_key("data") && map.keys().all(|k| k == "data" || k == "version"));
    if is_state {
        if let Ok(state) = serde_json::from_value::<PersistedState>(value.clone()) {
            return Ok(state);
        }
    }
    Ok(PersistedState::unversioned(value))
}

/// Migrates persisted data to the latest built-in version.
pub fn migrate(text: &str) -> Result<PersistedState> {
    Ok(builtin::migrator()?.migrate(read_state(text)?)?)
}
