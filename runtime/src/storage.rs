//! Key-value persistence capability.
//!
//! Used for the subscriber history and the last good post listing. Writes
//! replace the whole value for a key; callers own read-modify-write ordering.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Persistence failure.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode '{key}': {message}")]
    Encode { key: String, message: String },
}

/// Injected persistence capability.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the bytes stored under `key`; `Ok(None)` when nothing is stored.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the bytes stored under `key`.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Read `key` and decode it as JSON. Undecodable data reads as absent.
pub async fn read_json<T: serde::de::DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(bytes) = store.read(key).await? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            tracing::warn!("stored '{key}' is not valid JSON, ignoring: {e}");
            Ok(None)
        }
    }
}

/// Encode `value` as JSON and write it under `key`.
pub async fn write_json<T: serde::Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.write(key, &bytes).await
}

/// One file per key inside a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File path for `key`. Path separators and other unsafe characters are
    /// replaced so every key stays inside the data directory.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        let safe = safe.trim_start_matches('.');
        let name = if safe.is_empty() { "_" } else { safe };
        self.dir.join(name)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        // Write to a sibling temp file then rename, so readers never see a torn file.
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }
}

/// In-memory store for tests and for running without a data directory.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.lock().unwrap_or_else(|p| p.into_inner());
        Ok(data.get(key).cloned())
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.lock().unwrap_or_else(|p| p.into_inner());
        data.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("data"));

        assert!(store.read("subs-history.json").await.unwrap().is_none());
        store.write("subs-history.json", b"[1,2]").await.unwrap();
        assert_eq!(
            store.read("subs-history.json").await.unwrap().as_deref(),
            Some(&b"[1,2]"[..])
        );

        store.write("subs-history.json", b"[]").await.unwrap();
        assert_eq!(store.read("subs-history.json").await.unwrap().as_deref(), Some(&b"[]"[..]));
    }

    #[test]
    fn test_file_store_keys_stay_inside_dir() {
        let store = FileStore::new("/data");
        assert_eq!(store.path_for("../../etc/passwd"), PathBuf::from("/data/_.._etc_passwd"));
        assert_eq!(store.path_for("a/b"), PathBuf::from("/data/a_b"));
        assert_eq!(store.path_for(""), PathBuf::from("/data/_"));
        assert_eq!(store.path_for("telegram-posts.json"), PathBuf::from("/data/telegram-posts.json"));
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        write_json(&store, "k", &vec![1u32, 2, 3]).await.unwrap();
        let back: Option<Vec<u32>> = read_json(&store, "k").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        store.write("bad", b"not json").await.unwrap();
        let bad: Option<Vec<u32>> = read_json(&store, "bad").await.unwrap();
        assert_eq!(bad, None);

        let missing: Option<Vec<u32>> = read_json(&store, "missing").await.unwrap();
        assert_eq!(missing, None);
    }
}
