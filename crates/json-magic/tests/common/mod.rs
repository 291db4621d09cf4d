#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use json_magic::bundle::{LoadError, Loader};
use json_magic::document::{to_text, Format};
use json_magic::reference::ref_pointer;
use serde_json::Value;

pub type Calls = Arc<Mutex<HashMap<String, usize>>>;

/// Serves documents from memory and counts every `get` per location.
#[derive(Default)]
pub struct MemoryLoader {
    files: HashMap<String, String>,
    calls: Calls,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document, stored as YAML text when `location` ends in `.yaml`.
    pub fn with(mut self, location: &str, value: Value) -> Self {
        let text = to_text(&value, Format::from_location(location)).unwrap();
        self.files.insert(location.to_string(), text);
        self
    }

    pub fn with_text(mut self, location: &str, text: &str) -> Self {
        self.files.insert(location.to_string(), text.to_string());
        self
    }

    pub fn calls(&self) -> Calls {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    fn check(&self, target: &str) -> bool {
        !target.starts_with('#')
    }

    async fn get(&self, target: &str) -> Result<String, LoadError> {
        *self.calls.lock().unwrap().entry(target.to_string()).or_default() += 1;
        tokio::task::yield_now().await;
        self.files
            .get(target)
            .cloned()
            .ok_or_else(|| format!("no such document: {target}").into())
    }
}

pub fn call_count(calls: &Calls, location: &str) -> usize {
    calls.lock().unwrap().get(location).copied().unwrap_or(0)
}

/// Every `$ref` string in the tree, in traversal order.
pub fn collect_refs(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

fn walk(value: &Value, out: &mut Vec<String>) {
    if let Some(pointer) = ref_pointer(value) {
        out.push(pointer.to_string());
    }
    match value {
        Value::Object(map) => map.values().for_each(|child| walk(child, out)),
        Value::Array(arr) => arr.iter().for_each(|child| walk(child, out)),
        _ => {}
    }
}

/// Every node holding a `$ref`, for resolution checks.
pub fn ref_nodes(value: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    collect_nodes(value, &mut out);
    out
}

fn collect_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    if ref_pointer(value).is_some() {
        out.push(value);
    }
    match value {
        Value::Object(map) => map.values().for_each(|child| collect_nodes(child, out)),
        Value::Array(arr) => arr.iter().for_each(|child| collect_nodes(child, out)),
        _ => {}
    }
}
