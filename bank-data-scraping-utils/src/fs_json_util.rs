use std::{any::type_name, path::Path};

use anyhow::Context;
use serde::de::DeserializeOwned;

/// Reads a JSON file such as the credentials.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    read_parsed(path.as_ref(), |text| Ok(serde_json::from_str(text)?))
}

/// Reads a TOML file such as the server configuration.
pub fn read_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    read_parsed(path.as_ref(), |text| Ok(toml::from_str(text)?))
}

fn read_parsed<T>(
    path: &Path,
    parse: impl FnOnce(&str) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    (|| parse(&fs_err::read_to_string(path)?))()
        .with_context(|| format!("While trying to parse {path:?} as {}", type_name::<T>()))
}
