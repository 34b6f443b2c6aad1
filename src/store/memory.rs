use std::collections::HashMap;

use tokio::sync::Mutex;

use super::{KeyValueStore, StoreError};

/// Keeps everything in process memory; lost on restart.
#[derive(Default, Debug)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.map.lock().await.insert(key.to_owned(), value);
        Ok(())
    }
}
