//! Loader plugins and the per-bundle document cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::BundleError;
use crate::location::{is_local_ref, is_remote_url};

/// Error type returned by [`Loader::get`].
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches raw document text for a location.
///
/// The bundler asks each registered loader in order and uses the first whose
/// [`check`](Loader::check) accepts the target.
#[async_trait]
pub trait Loader: Send + Sync {
    fn check(&self, target: &str) -> bool;

    async fn get(&self, target: &str) -> Result<String, LoadError>;
}

/// Reads documents from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

#[async_trait]
impl Loader for FileLoader {
    fn check(&self, target: &str) -> bool {
        !target.is_empty() && !is_remote_url(target) && !is_local_ref(target)
    }

    async fn get(&self, target: &str) -> Result<String, LoadError> {
        Ok(tokio::fs::read_to_string(target).await?)
    }
}

/// Fetches `http:` and `https:` documents.
#[derive(Debug, Clone, Default)]
pub struct UrlLoader {
    client: reqwest::Client,
}

impl UrlLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Loader for UrlLoader {
    fn check(&self, target: &str) -> bool {
        is_remote_url(target)
    }

    async fn get(&self, target: &str) -> Result<String, LoadError> {
        let response = self.client.get(target).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

type CacheSlot = Arc<OnceCell<Result<Value, BundleError>>>;

/// Parsed documents keyed by absolute location.
///
/// Concurrent requests for one location share a single load; later requests
/// get the stored result, including a stored failure.
#[derive(Default)]
pub(crate) struct DocumentCache {
    entries: Mutex<HashMap<String, CacheSlot>>,
}

impl DocumentCache {
    pub(crate) async fn get_or_load<F, Fut>(&self, location: &str, load: F) -> Result<Value, BundleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, BundleError>>,
    {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(location.to_string()).or_default())
        };
        slot.get_or_init(load).await.clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_file_loader_check() {
        let loader = FileLoader;
        assert!(loader.check("./schemas/user.json"));
        assert!(loader.check("/abs/user.yaml"));
        assert!(!loader.check("https://example.com/user.json"));
        assert!(!loader.check("#/components"));
        assert!(!loader.check(""));
    }

    #[test]
    fn test_url_loader_check() {
        let loader = UrlLoader::default();
        assert!(loader.check("https://example.com/user.json"));
        assert!(loader.check("http://localhost:8080/a.yaml"));
        assert!(!loader.check("./user.json"));
    }

    #[tokio::test]
    async fn test_file_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.yaml");
        std::fs::write(&path, "a: 1\n").unwrap();
        let text = FileLoader.get(path.to_str().unwrap()).await.unwrap();
        assert_eq!(text, "a: 1\n");
        assert!(FileLoader.get(dir.path().join("missing.json").to_str().unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn test_cache_single_flight() {
        let cache = DocumentCache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let load = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(json!({"loaded": true}))
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_load("/a.json", load),
            cache.get_or_load("/a.json", load),
            cache.get_or_load("/a.json", load),
        );
        assert_eq!(a.unwrap(), json!({"loaded": true}));
        assert_eq!(b.unwrap(), json!({"loaded": true}));
        assert_eq!(c.unwrap(), json!({"loaded": true}));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_keeps_failures() {
        let cache = DocumentCache::default();
        let failing = || async {
            Err(BundleError::Load {
                location: "/b.json".into(),
                reason: "boom".into(),
            })
        };
        assert!(cache.get_or_load("/b.json", failing).await.is_err());
        let second = cache.get_or_load("/b.json", || async { Ok(json!(1)) }).await;
        assert!(matches!(second, Err(BundleError::Load { .. })));
    }
}
