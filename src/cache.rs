//! Durable search cache.
//!
//! The whole state lives in one JSON document which is rewritten atomically
//! (temp file + rename) on every `put`. All access is serialized behind a
//! single async mutex so concurrent writers can never interleave.

use crate::types::SearchResult;
use atomicwrites::{AllowOverwrite, AtomicFile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to serialize cache state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write cache file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persisted layout: `{ "searches": {...}, "lastQuery": ... }`.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheState {
    #[serde(default)]
    pub searches: HashMap<String, SearchResult>,
    #[serde(default)]
    pub last_query: Option<String>,
}

impl CacheState {
    fn last(&self) -> Option<&SearchResult> {
        self.last_query
            .as_ref()
            .and_then(|query| self.searches.get(query))
    }
}

#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    state: Mutex<CacheState>,
}

impl CacheStore {
    /// Loads the cache file at `path`.
    ///
    /// A missing, unreadable or corrupt file is replaced by an empty state,
    /// which is persisted right away. Only a failure to write that fresh
    /// state is returned as an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CacheState>(&raw) {
                Ok(state) => {
                    info!(
                        "Loaded {} cached searches from {}",
                        state.searches.len(),
                        path.display()
                    );
                    Some(state)
                }
                Err(e) => {
                    warn!("Cache file {} is corrupt, starting empty: {}", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No cache file at {}, starting empty", path.display());
                None
            }
            Err(e) => {
                warn!("Cache file {} is unreadable, starting empty: {}", path.display(), e);
                None
            }
        };

        let state = match state {
            Some(state) => state,
            None => {
                let empty = CacheState::default();
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|source| CacheError::Write {
                        path: path.clone(),
                        source,
                    })?;
                }
                persist(&path, &empty)?;
                empty
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exact-match lookup; the key is not normalized.
    pub async fn get(&self, query: &str) -> Option<SearchResult> {
        self.state.lock().await.searches.get(query).cloned()
    }

    /// Result for the most recently written query. A dangling pointer reads as absent.
    pub async fn get_last(&self) -> Option<SearchResult> {
        self.state.lock().await.last().cloned()
    }

    /// Stores `result` under `query`, marks it as the last search and
    /// rewrites the cache file. If the write fails the in-memory state is
    /// restored and the error is returned.
    pub async fn put(&self, query: &str, result: SearchResult) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;

        let previous = state.searches.insert(query.to_string(), result);
        let previous_last = state.last_query.replace(query.to_string());

        if let Err(e) = persist(&self.path, &state) {
            match previous {
                Some(old) => {
                    state.searches.insert(query.to_string(), old);
                }
                None => {
                    state.searches.remove(query);
                }
            }
            state.last_query = previous_last;
            return Err(e);
        }

        debug!("Cached search for query: {}", query);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.searches.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.searches.is_empty()
    }
}

/// Atomically replaces the cache file with `state`.
///
/// atomicwrites fsyncs the parent directory after the rename, so an
/// `Internal` error can arrive when the new content is already in place.
/// That case counts as committed; otherwise memory would roll back while
/// the file keeps the new entry.
fn persist(path: &Path, state: &CacheState) -> Result<(), CacheError> {
    let json = serde_json::to_string_pretty(state)?;
    match AtomicFile::new(path, AllowOverwrite).write(|f| f.write_all(json.as_bytes())) {
        Ok(()) => Ok(()),
        Err(atomicwrites::Error::Internal(e)) if already_written(path, &json) => {
            warn!(
                "Cache file {} was replaced but finishing the write failed: {}",
                path.display(),
                e
            );
            Ok(())
        }
        Err(atomicwrites::Error::Internal(source)) | Err(atomicwrites::Error::User(source)) => {
            Err(CacheError::Write {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

fn already_written(path: &Path, json: &str) -> bool {
    std::fs::read_to_string(path).is_ok_and(|on_disk| on_disk == json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchResultItem;
    use tempfile::TempDir;

    fn result(query: &str) -> SearchResult {
        SearchResult {
            query: query.to_string(),
            answer: Some(format!("answer for {query}")),
            results: vec![SearchResultItem {
                title: "Title".into(),
                url: "https://example.com".into(),
                content: "snippet".into(),
                score: 0.5,
                extra: Default::default(),
            }],
            response_time: 0.8,
            extra: Default::default(),
        }
    }

    fn read_state(path: &Path) -> CacheState {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let store = CacheStore::load(&path).unwrap();

        assert!(store.is_empty().await);
        assert!(store.get_last().await.is_none());
        assert_eq!(read_state(&path), CacheState::default());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"searches\""));
        assert!(raw.contains("\"lastQuery\": null"));
    }

    #[tokio::test]
    async fn corrupt_file_is_reinitialized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = CacheStore::load(&path).unwrap();

        assert!(store.is_empty().await);
        assert_eq!(read_state(&path), CacheState::default());
    }

    #[tokio::test]
    async fn put_persists_and_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let store = CacheStore::load(&path).unwrap();
        store.put("rust", result("rust")).await.unwrap();
        store.put("tokio", result("tokio")).await.unwrap();

        let on_disk = read_state(&path);
        assert_eq!(on_disk.searches.len(), 2);
        assert_eq!(on_disk.last_query.as_deref(), Some("tokio"));

        let reloaded = CacheStore::load(&path).unwrap();
        assert_eq!(reloaded.get("rust").await, Some(result("rust")));
        assert_eq!(reloaded.get_last().await, Some(result("tokio")));
    }

    #[tokio::test]
    async fn lookup_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::load(dir.path().join("cache.json")).unwrap();
        store.put("Rust Lang", result("Rust Lang")).await.unwrap();

        assert!(store.get("Rust Lang").await.is_some());
        assert!(store.get("rust lang").await.is_none());
        assert!(store.get(" Rust Lang").await.is_none());
        assert!(store.get("Rust%20Lang").await.is_none());
    }

    #[tokio::test]
    async fn overwrite_replaces_entry() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::load(dir.path().join("cache.json")).unwrap();
        store.put("q", result("q")).await.unwrap();

        let mut newer = result("q");
        newer.answer = Some("newer".into());
        store.put("q", newer.clone()).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("q").await, Some(newer));
    }

    #[tokio::test]
    async fn dangling_last_query_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"searches": {}, "lastQuery": "gone"}"#).unwrap();

        let store = CacheStore::load(&path).unwrap();
        assert!(store.get_last().await.is_none());
    }

    #[test]
    fn already_written_compares_file_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let json = serde_json::to_string_pretty(&CacheState::default()).unwrap();

        assert!(!already_written(&path, &json));

        persist(&path, &CacheState::default()).unwrap();
        assert!(already_written(&path, &json));

        let mut state = CacheState::default();
        state.searches.insert("q".into(), result("q"));
        state.last_query = Some("q".into());
        assert!(!already_written(
            &path,
            &serde_json::to_string_pretty(&state).unwrap()
        ));
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        let path = sub.join("cache.json");

        let store = CacheStore::load(&path).unwrap();
        store.put("kept", result("kept")).await.unwrap();

        std::fs::remove_dir_all(&sub).unwrap();

        let err = store.put("lost", result("lost")).await.unwrap_err();
        assert!(matches!(err, CacheError::Write { .. }));
        assert!(store.get("lost").await.is_none());
        assert_eq!(store.get_last().await, Some(result("kept")));
        assert_eq!(store.len().await, 1);
    }
}
