//! Durable key-value storage shared by every invocation.
//!
//! Reads and writes are independent: there is no compare-and-swap, so two processes that
//! read the same key and then write it can both succeed.

use std::path::PathBuf;

use serde::Deserialize;

pub mod fs;
pub mod gcs;
pub mod memory;

pub use fs::FsStore;
pub use gcs::GcsStore;
pub use memory::MemoryStore;

pub trait KeyValueStore {
    /// Returns `None` if nothing has been stored under `key` yet.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replaces whatever was stored under `key`.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("An I/O error occurred on key {key:?}: {error}")]
    Io { key: String, error: std::io::Error },
    #[error("The request for key {key:?} failed: {error}")]
    Request { key: String, error: reqwest::Error },
    #[error("The storage server returned {status} for key {key:?}: {body}")]
    Status {
        key: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to obtain an access token for the storage server: {0:#}")]
    Token(anyhow::Error),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    Fs {
        path: PathBuf,
    },
    Gcs {
        bucket: String,
        /// When absent, tokens are requested from the instance metadata server.
        #[serde(default)]
        access_token: Option<String>,
    },
}

pub enum Store {
    Memory(MemoryStore),
    Fs(FsStore),
    Gcs(GcsStore),
}

impl Store {
    pub fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        Ok(match config {
            StoreConfig::Memory => Self::Memory(MemoryStore::default()),
            StoreConfig::Fs { path } => Self::Fs(FsStore::new(path.clone())),
            StoreConfig::Gcs {
                bucket,
                access_token,
            } => Self::Gcs(GcsStore::new(bucket.clone(), access_token.clone())?),
        })
    }
}

impl KeyValueStore for Store {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Fs(store) => store.get(key).await,
            Self::Gcs(store) => store.get(key).await,
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.put(key, value).await,
            Self::Fs(store) => store.put(key, value).await,
            Self::Gcs(store) => store.put(key, value).await,
        }
    }
}

impl<S: KeyValueStore> KeyValueStore for &S {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyValueStore, Store, StoreConfig};

    #[test]
    fn parse_store_configs() {
        let config: StoreConfig = toml::from_str(r#"kind = "memory""#).unwrap();
        assert!(matches!(config, StoreConfig::Memory));
        let config: StoreConfig = toml::from_str(
            r#"
            kind = "fs"
            path = "ignore/store"
            "#,
        )
        .unwrap();
        assert!(matches!(config, StoreConfig::Fs { path } if path.ends_with("store")));
        let config: StoreConfig = toml::from_str(
            r#"
            kind = "gcs"
            bucket = "some-bucket"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config,
            StoreConfig::Gcs { bucket, access_token: None } if bucket == "some-bucket"
        ));
    }

    #[tokio::test]
    async fn dispatches_to_backend() {
        let store = Store::open(&StoreConfig::Memory).unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.put("a", b"1".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some(&b"1"[..]));
    }
}
