// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Unit local key/value storage which outlives a single reconciliation pass.
//!
//! The store holds string values only.  Writes are buffered until [`KvStore::flush`], which is
//! the point where they become durable.

#![deny(clippy::pedantic, clippy::unwrap_used)]

use std::io::Write;
use std::path::{Path, PathBuf};

use ordermap::OrderMap;
use tracing::{debug, info};

/// Errors which may occur while loading or persisting the store.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The backing file could not be read or written.
    #[error("kv store {path}: {source}")]
    Io {
        /// Backing file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The backing file does not hold a YAML mapping of strings.
    #[error("kv store {path} is corrupt: {source}")]
    Corrupt {
        /// Backing file.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml_ng::Error,
    },
}

/// Persistent key/value store.
pub trait KvStore {
    /// Fetch the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`.  Not durable until [`KvStore::flush`] returns.
    fn set(&mut self, key: &str, value: &str);
    /// Make every previous [`KvStore::set`] durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the data could not be persisted.
    fn flush(&mut self) -> Result<(), KvError>;
}

impl<T: KvStore + ?Sized> KvStore for &mut T {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) {
        (**self).set(key, value);
    }

    fn flush(&mut self) -> Result<(), KvError> {
        (**self).flush()
    }
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) {
        (**self).set(key, value);
    }

    fn flush(&mut self) -> Result<(), KvError> {
        (**self).flush()
    }
}

/// A [`KvStore`] persisted as a YAML mapping in a single file.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    data: OrderMap<String, String>,
    dirty: bool,
}

impl FileKvStore {
    /// Open the store at `path`.  A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but can not be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KvError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => OrderMap::new(),
            Ok(text) => serde_yaml_ng::from_str(&text).map_err(|source| KvError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no kv store at {}, starting empty", path.display());
                OrderMap::new()
            }
            Err(source) => return Err(KvError::Io { path, source }),
        };
        Ok(Self {
            path,
            data,
            dirty: false,
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry, including writes not flushed yet.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn io_err(&self, source: std::io::Error) -> KvError {
        KvError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        if self.data.get(key).map(String::as_str) != Some(value) {
            self.data.insert(key.to_string(), value.to_string());
            self.dirty = true;
        }
    }

    /// Write to a sibling temporary file and rename it over the store so readers never see a
    /// partial file.
    fn flush(&mut self) -> Result<(), KvError> {
        if !self.dirty {
            return Ok(());
        }
        let text = serde_yaml_ng::to_string(&self.data).map_err(|source| KvError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let mut file = std::fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        debug!("flushed {} keys to {}", self.data.len(), self.path.display());
        self.dirty = false;
        Ok(())
    }
}

/// A [`KvStore`] which lives only in memory.  Counts flushes so callers can check durability
/// points.
#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    data: OrderMap<String, String>,
    flushed: OrderMap<String, String>,
    flushes: usize,
}

impl MemoryKvStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`KvStore::flush`] calls so far.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// The data as of the last flush.
    #[must_use]
    pub fn durable(&self) -> &OrderMap<String, String> {
        &self.flushed
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryKvStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let data: OrderMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            flushed: data.clone(),
            data,
            flushes: 0,
        }
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.data.insert(key.to_string(), value.to_string());
    }

    fn flush(&mut self) -> Result<(), KvError> {
        self.flushed.clone_from(&self.data);
        self.flushes += 1;
        Ok(())
    }
}
