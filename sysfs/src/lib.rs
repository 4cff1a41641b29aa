// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! [sysfs] access utilities.
//!
//! The charm only ever needs a handful of things from sysfs: where it is mounted, the network
//! class directory, and small text attributes (MAC addresses, SR-IOV VF counts, NUMA cpu lists).
//! This crate wraps those reads and writes with enough guard rails that a misconfigured mount
//! shows up as an error rather than as silently empty hardware.
//!
//! [sysfs]: https://www.kernel.org/doc/Documentation/filesystems/sysfs.txt

#![deny(clippy::pedantic, clippy::unwrap_used, missing_docs)]

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

/// Errors which might occur when accessing sysfs directories
#[derive(Debug, thiserror::Error)]
pub enum SysfsErr {
    /// The path is not under a mounted sysfs and therefore does not qualify as a [`SysfsPath`].
    #[error("path {0:?} is not under sysfs")]
    PathNotUnderSysfs(PathBuf),
    /// sysfs is not mounted anywhere we can see.
    #[error("sysfs is not mounted")]
    NotMounted,
    /// sysfs is mounted in more than one place, which we refuse to guess about.
    #[error("sysfs is mounted at more than one location: {0:?}")]
    MultipleMounts(Vec<PathBuf>),
    /// The mount table could not be read.
    #[error("unable to read mount table: {0}")]
    MountTable(String),
    /// Some [`std::io::Error`] error occurred
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// Invalid UTF-8 in a path under sysfs.
    ///
    /// The kernel just uses ascii byte strings for sysfs, so you should never see this
    /// error under healthy conditions.
    /// The offending name is deliberately not carried along in the error.
    #[error("path under sysfs is not a valid UTF-8 string")]
    SysfsPathIsNotValidUtf8,
}

/// Find where sysfs is mounted on this host.
///
/// # Errors
///
/// * [`SysfsErr::NotMounted`] if no sysfs mount exists
/// * [`SysfsErr::MultipleMounts`] if sysfs is mounted more than once
/// * [`SysfsErr::MountTable`] if `/proc/self/mounts` can't be read
pub fn sysfs_root() -> Result<SysfsPath, SysfsErr> {
    let mounts: Vec<PathBuf> = procfs::mounts()
        .map_err(|e| SysfsErr::MountTable(e.to_string()))?
        .into_iter()
        .filter(|mount| mount.fs_vfstype == "sysfs")
        .map(|mount| PathBuf::from(mount.fs_file))
        .collect();
    match mounts.as_slice() {
        [] => Err(SysfsErr::NotMounted),
        [single] => {
            let root = SysfsPath::new(single)?;
            info!("found sysfs filesystem at {root}");
            Ok(root)
        }
        _ => {
            error!("suspicious configuration found: sysfs is mounted at {mounts:?}");
            Err(SysfsErr::MultipleMounts(mounts))
        }
    }
}

/// Path which is promised to
///
/// 1. exist under a mounted sysfs at the time of creation,
/// 2. be both absolute and canonical,
/// 3. be representable as a valid UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SysfsPath(PathBuf);

impl SysfsPath {
    /// Create a new `SysfsPath` from a path.
    ///
    /// The path is canonicalized before the filesystem type is checked, so symlinks are fine.
    ///
    /// # Errors
    ///
    /// - If the canonicalized path is not under sysfs, an error is returned.
    /// - If the path is not a valid UTF-8 string, an error is returned.
    /// - io errors (such as permission denied) can also occur
    pub fn new(path: impl AsRef<Path>) -> Result<SysfsPath, SysfsErr> {
        let path = std::fs::canonicalize(path.as_ref())?;
        if path.to_str().is_none() {
            return Err(SysfsErr::SysfsPathIsNotValidUtf8);
        }
        let stats = nix::sys::statfs::statfs(&path).map_err(std::io::Error::from)?;
        if stats.filesystem_type() == nix::sys::statfs::SYSFS_MAGIC {
            Ok(SysfsPath(path))
        } else {
            Err(SysfsErr::PathNotUnderSysfs(path))
        }
    }

    /// Get an immutable reference to the inner [`PathBuf`].
    #[must_use]
    pub fn inner(&self) -> &PathBuf {
        &self.0
    }

    /// The `devices/system/node` directory holding NUMA node descriptions.
    #[must_use]
    pub fn numa_nodes(&self) -> PathBuf {
        self.0.join("devices/system/node")
    }
}

impl AsRef<Path> for SysfsPath {
    fn as_ref(&self) -> &Path {
        self.inner()
    }
}

impl std::fmt::Display for SysfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Read a single-value attribute file, trimming the trailing newline the kernel adds.
///
/// Returns `Ok(None)` when the attribute does not exist; many attributes (e.g. `sriov_totalvfs`)
/// are only present on capable devices.
///
/// # Errors
///
/// Any io error other than `NotFound`.
pub fn read_attribute(dir: impl AsRef<Path>, name: &str) -> Result<Option<String>, SysfsErr> {
    let path = dir.as_ref().join(name);
    match std::fs::read_to_string(&path) {
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SysfsErr::IoError(e)),
    }
}

/// Write a single-value attribute file.
///
/// # Errors
///
/// Any io error, including the attribute not existing.
pub fn write_attribute(dir: impl AsRef<Path>, name: &str, value: &str) -> Result<(), SysfsErr> {
    let path = dir.as_ref().join(name);
    debug!("writing {value} to {}", path.display());
    std::fs::write(&path, value)?;
    Ok(())
}

/// List the entry names of a sysfs directory in sorted order.
///
/// Returns an empty list when the directory does not exist.
///
/// # Errors
///
/// * io errors other than `NotFound`
/// * [`SysfsErr::SysfsPathIsNotValidUtf8`] for non UTF-8 entry names
pub fn list_dir(dir: impl AsRef<Path>) -> Result<Vec<String>, SysfsErr> {
    let entries = match std::fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(SysfsErr::IoError(e)),
    };
    let mut names = vec![];
    for entry in entries {
        let name = entry?
            .file_name()
            .into_string()
            .map_err(|_| SysfsErr::SysfsPathIsNotValidUtf8)?;
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Resolve a symlink (e.g. `class/net/eth0/device`) and return the final path component.
///
/// Returns `Ok(None)` if the link does not exist (virtual devices have no `device` link).
///
/// # Errors
///
/// io errors other than `NotFound`, or a non UTF-8 target.
pub fn link_target_name(link: impl AsRef<Path>) -> Result<Option<String>, SysfsErr> {
    let resolved = match std::fs::canonicalize(link.as_ref()) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SysfsErr::IoError(e)),
    };
    match resolved.file_name() {
        None => Ok(None),
        Some(name) => name
            .to_str()
            .map(|s| Some(s.to_string()))
            .ok_or(SysfsErr::SysfsPathIsNotValidUtf8),
    }
}
