// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Metadata proxy shared secret.

use std::fs::{OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use nix::sys::stat::Mode;
use tracing::info;
use uuid::Uuid;

use crate::ProvisionError;

fn owner_read_only() -> u32 {
    Mode::S_IRUSR.bits()
}

/// Read the shared secret at `path`, creating it first if it does not exist.
///
/// The file is (re)set to mode 0400 either way.
///
/// # Errors
///
/// Fails if the file can not be created, read or have its mode changed.
pub fn get_shared_secret(path: impl AsRef<Path>) -> Result<String, ProvisionError> {
    let path = path.as_ref();
    let secret_error = |source| ProvisionError::Secret {
        path: path.to_path_buf(),
        source,
    };
    if !path.exists() {
        let secret = Uuid::new_v4().to_string();
        info!("creating shared secret {}", path.display());
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(owner_read_only())
            .open(path)
            .map_err(secret_error)?;
        file.write_all(secret.as_bytes()).map_err(secret_error)?;
        std::fs::set_permissions(path, Permissions::from_mode(owner_read_only()))
            .map_err(secret_error)?;
        return Ok(secret);
    }
    std::fs::set_permissions(path, Permissions::from_mode(owner_read_only()))
        .map_err(secret_error)?;
    Ok(std::fs::read_to_string(path)
        .map_err(secret_error)?
        .trim()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mode(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn created_once_then_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.txt");
        let secret = get_shared_secret(&path).unwrap();
        assert!(Uuid::parse_str(&secret).is_ok());
        assert_eq!(mode(&path), 0o400);
        assert_eq!(get_shared_secret(&path).unwrap(), secret);
    }

    #[test]
    fn existing_secret_is_trimmed_and_locked_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.txt");
        std::fs::write(&path, "supersecret\n").unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o644)).unwrap();
        assert_eq!(get_shared_secret(&path).unwrap(), "supersecret");
        assert_eq!(mode(&path), 0o400);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing/secret.txt");
        assert!(matches!(
            get_shared_secret(&path),
            Err(ProvisionError::Secret { .. })
        ));
    }
}
