//! Persisted, append-only deduplicating link store.

use crate::error::StoreError;

use async_trait::async_trait;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Key/blob persistence used for the link store and output artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob, or `None` if it does not exist.
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Replace a blob.
    async fn write(&self, key: &str, contents: &str) -> Result<(), StoreError>;
    /// Append to a blob, creating it if missing.
    async fn append(&self, key: &str, contents: &str) -> Result<(), StoreError>;
}

/// `BlobStore` keeping each key as a file under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the file holding `key`.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn ensure_root(&self, key: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| io_error(key, source))
    }
}

fn io_error(key: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl BlobStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.ensure_root(key).await?;
        tokio::fs::write(self.path(key), contents)
            .await
            .map_err(|source| io_error(key, source))
    }

    async fn append(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.ensure_root(key).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(key))
            .await
            .map_err(|source| io_error(key, source))?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|source| io_error(key, source))?;
        file.flush().await.map_err(|source| io_error(key, source))
    }
}

/// In-memory `BlobStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.blobs.read().get(key).cloned()
    }

    /// Replace the contents of `key`.
    pub fn insert(&self, key: impl Into<String>, contents: impl Into<String>) {
        self.blobs.write().insert(key.into(), contents.into());
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.insert(key, contents);
        Ok(())
    }

    async fn append(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.blobs
            .write()
            .entry(key.to_string())
            .or_default()
            .push_str(contents);
        Ok(())
    }
}

/// Render lines as a newline-terminated text blob.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

/// The persisted link collection, one link per line.
pub struct LinkStore<'a> {
    blobs: &'a dyn BlobStore,
}

impl<'a> LinkStore<'a> {
    pub fn new(blobs: &'a dyn BlobStore) -> Self {
        Self { blobs }
    }

    /// Non-empty lines stored under `key`; a missing key reads as empty.
    ///
    /// Lines are split on `\n` only, so a `\r` before it stays part of the line.
    pub async fn load(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let contents = self.blobs.read(key).await?.unwrap_or_default();
        Ok(contents
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Append the links not already stored under `key`.
    ///
    /// Existing entries are never rewritten. A link spanning several lines is
    /// stored as its individual lines. Returns the number of lines appended.
    pub async fn merge(&self, links: &HashSet<String>, key: &str) -> Result<usize, StoreError> {
        if links.is_empty() {
            return Ok(0);
        }

        let existing = self.blobs.read(key).await?.unwrap_or_default();
        let known: HashSet<&str> = existing.lines().collect();

        let novel: BTreeSet<&str> = links
            .iter()
            .flat_map(|link| link.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty() && !known.contains(line))
            .collect();

        if novel.is_empty() {
            debug!("No new links for {}", key);
            return Ok(0);
        }

        let mut chunk = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            chunk.push('\n');
        }
        let novel: Vec<&str> = novel.into_iter().collect();
        chunk.push_str(&join_lines(&novel));

        self.blobs.append(key, &chunk).await?;
        info!("Appended {} new links to {}", novel.len(), key);
        Ok(novel.len())
    }
}

/// Whether a local file exists.
pub(crate) async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_destination_reads_empty() {
        let blobs = MemoryStore::new();
        let store = LinkStore::new(&blobs);
        assert!(store.load("2.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_appends_only_novel_links() {
        let blobs = MemoryStore::new();
        blobs.insert("2.txt", "vless://a#x\n");
        let store = LinkStore::new(&blobs);

        let added = store
            .merge(&set(&["vless://a#x", "trojan://b#y"]), "2.txt")
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(blobs.get("2.txt").unwrap(), "vless://a#x\ntrojan://b#y\n");
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let blobs = MemoryStore::new();
        let store = LinkStore::new(&blobs);
        let links = set(&["ss://k@1.1.1.1:1#a", "vless://u@2.2.2.2:2#b"]);

        assert_eq!(store.merge(&links, "2.txt").await.unwrap(), 2);
        let first = blobs.get("2.txt").unwrap();
        assert_eq!(store.merge(&links, "2.txt").await.unwrap(), 0);
        assert_eq!(blobs.get("2.txt").unwrap(), first);
    }

    #[tokio::test]
    async fn merge_terminates_unterminated_last_line() {
        let blobs = MemoryStore::new();
        blobs.insert("2.txt", "vless://a#x");
        let store = LinkStore::new(&blobs);

        store.merge(&set(&["trojan://b#y"]), "2.txt").await.unwrap();
        assert_eq!(
            store.load("2.txt").await.unwrap(),
            vec!["vless://a#x", "trojan://b#y"]
        );
    }

    #[tokio::test]
    async fn load_keeps_carriage_returns() {
        let blobs = MemoryStore::new();
        blobs.insert("2.txt", "plain line\r\nvless://a#x\n\r\n");
        let store = LinkStore::new(&blobs);

        assert_eq!(
            store.load("2.txt").await.unwrap(),
            vec!["plain line\r", "vless://a#x"]
        );
    }

    #[tokio::test]
    async fn multi_line_links_are_split() {
        let blobs = MemoryStore::new();
        let store = LinkStore::new(&blobs);
        let links = set(&["vless://a#x\n\ntrojan://b#y"]);

        assert_eq!(store.merge(&links, "2.txt").await.unwrap(), 2);
        assert_eq!(store.merge(&links, "2.txt").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FileStore::new(dir.path().join("out"));

        assert!(blobs.read("2.txt").await.unwrap().is_none());
        blobs.append("2.txt", "a\n").await.unwrap();
        blobs.append("2.txt", "b\n").await.unwrap();
        assert_eq!(blobs.read("2.txt").await.unwrap().as_deref(), Some("a\nb\n"));

        blobs.write("2.txt", "c\n").await.unwrap();
        assert_eq!(blobs.read("2.txt").await.unwrap().as_deref(), Some("c\n"));
        assert!(file_exists(&blobs.path("2.txt")).await);
    }

    #[tokio::test]
    async fn file_store_propagates_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let blobs = FileStore::new(&blocker);

        let err = blobs.write("2.txt", "x\n").await.unwrap_err();
        assert!(matches!(err, StoreError::Io { ref key, .. } if key == "2.txt"));
    }
}
