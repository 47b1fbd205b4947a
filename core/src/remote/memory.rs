//! In-process file host for tests and offline experiments.
//!
//! Versions are SHA-256 digests of the content, so identical content always
//! has the same token. Concurrent writers are simulated by queueing content
//! that lands just before the next write to a path is checked.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{FileHost, RemoteError, RemoteFile};

#[must_use]
pub fn content_version(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

#[derive(Debug, Default)]
struct HostState {
    files: HashMap<String, String>,
    concurrent: HashMap<String, VecDeque<String>>,
    failures: VecDeque<u16>,
    reads: usize,
    writes: usize,
    conflicts: usize,
}

#[derive(Debug, Default)]
pub struct MemoryFileHost {
    state: Mutex<HostState>,
}

impl MemoryFileHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a file directly, bypassing version checks.
    pub fn put_file(&self, path: &str, content: &str) {
        self.state()
            .files
            .insert(path.to_string(), content.to_string());
    }

    #[must_use]
    pub fn file(&self, path: &str) -> Option<String> {
        self.state().files.get(path).cloned()
    }

    #[must_use]
    pub fn version_of(&self, path: &str) -> Option<String> {
        self.state().files.get(path).map(|c| content_version(c))
    }

    /// Make another writer replace `path` with `content` right before the
    /// next write to it, so that write sees a stale version.
    pub fn queue_concurrent_write(&self, path: &str, content: &str) {
        self.state()
            .concurrent
            .entry(path.to_string())
            .or_default()
            .push_back(content.to_string());
    }

    /// Fail the next write or delete with this HTTP status.
    pub fn fail_next_write(&self, status: u16) {
        self.state().failures.push_back(status);
    }

    #[must_use]
    pub fn reads(&self) -> usize {
        self.state().reads
    }

    /// Successful writes and deletes.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    #[must_use]
    pub fn conflicts(&self) -> usize {
        self.state().conflicts
    }

    fn apply_concurrent(state: &mut HostState, path: &str) {
        if let Some(content) = state.concurrent.get_mut(path).and_then(VecDeque::pop_front) {
            state.files.insert(path.to_string(), content);
        }
    }
}

#[async_trait]
impl FileHost for MemoryFileHost {
    async fn read(&self, path: &str, _bypass_cache: bool) -> Result<Option<RemoteFile>, RemoteError> {
        let mut state = self.state();
        state.reads += 1;
        Ok(state.files.get(path).map(|content| RemoteFile {
            content: content.clone(),
            version: content_version(content),
        }))
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        _message: &str,
        expected: Option<&str>,
    ) -> Result<String, RemoteError> {
        let mut state = self.state();
        if let Some(status) = state.failures.pop_front() {
            return Err(RemoteError::from_status(path, status));
        }
        Self::apply_concurrent(&mut state, path);

        let current = state.files.get(path).map(|c| content_version(c));
        if current.as_deref() != expected {
            state.conflicts += 1;
            return Err(RemoteError::Conflict {
                path: path.to_string(),
            });
        }
        state.files.insert(path.to_string(), content.to_string());
        state.writes += 1;
        Ok(content_version(content))
    }

    async fn delete(&self, path: &str, version: &str, _message: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        if let Some(status) = state.failures.pop_front() {
            return Err(RemoteError::from_status(path, status));
        }
        Self::apply_concurrent(&mut state, path);

        let Some(current) = state.files.get(path).map(|c| content_version(c)) else {
            return Err(RemoteError::MissingLocation {
                path: path.to_string(),
            });
        };
        if current != version {
            state.conflicts += 1;
            return Err(RemoteError::Conflict {
                path: path.to_string(),
            });
        }
        state.files.remove(path);
        state.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_requires_current_version() {
        let host = MemoryFileHost::new();
        let v1 = host.write("a.json", "[]", "create", None).await.unwrap();
        assert_eq!(v1, content_version("[]"));

        // Creating over an existing file is a conflict.
        let err = host.write("a.json", "[1]", "again", None).await.unwrap_err();
        assert!(err.is_conflict());

        let v2 = host.write("a.json", "[1]", "update", Some(&v1)).await.unwrap();
        assert_ne!(v1, v2);
        let err = host.write("a.json", "[2]", "stale", Some(&v1)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(host.conflicts(), 2);
        assert_eq!(host.writes(), 2);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let host = MemoryFileHost::new();
        assert!(host.read("nope.json", false).await.unwrap().is_none());
        assert_eq!(host.reads(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_write_lands_first() {
        let host = MemoryFileHost::new();
        let v1 = host.write("a.json", "[]", "create", None).await.unwrap();
        host.queue_concurrent_write("a.json", "[\"other\"]");
        assert!(host.write("a.json", "[1]", "mine", Some(&v1)).await.is_err());
        assert_eq!(host.file("a.json").as_deref(), Some("[\"other\"]"));

        let fresh = host.read("a.json", true).await.unwrap().unwrap();
        host.write("a.json", "[1]", "mine", Some(&fresh.version))
            .await
            .unwrap();
        assert_eq!(host.file("a.json").as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn test_delete() {
        let host = MemoryFileHost::new();
        let v = host.write("a.json", "x", "create", None).await.unwrap();
        assert!(host.delete("a.json", "stale", "rm").await.unwrap_err().is_conflict());
        host.delete("a.json", &v, "rm").await.unwrap();
        assert!(host.file("a.json").is_none());
        assert!(matches!(
            host.delete("a.json", &v, "rm").await,
            Err(RemoteError::MissingLocation { .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let host = MemoryFileHost::new();
        host.fail_next_write(401);
        assert!(matches!(
            host.write("a.json", "x", "create", None).await,
            Err(RemoteError::Unauthorized)
        ));
        host.write("a.json", "x", "create", None).await.unwrap();
    }
}
