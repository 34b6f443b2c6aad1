use std::{io::ErrorKind, path::PathBuf};

use log::trace;

use super::{KeyValueStore, StoreError};

/// Stores each key as a file of the same name under `dir`.
#[derive(Debug)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |error| StoreError::Io {
            key: key.to_owned(),
            error,
        }
    }
}

impl KeyValueStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.dir.join(key);
        match fs_err::tokio::read(&path).await {
            Ok(value) => {
                trace!("Read {} bytes from {path:?}", value.len());
                Ok(Some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(key)(e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        fs_err::tokio::create_dir_all(&self.dir)
            .await
            .map_err(Self::io_error(key))?;
        fs_err::tokio::write(self.dir.join(key), value)
            .await
            .map_err(Self::io_error(key))
    }
}
