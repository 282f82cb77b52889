use std::fs::{File, Metadata};
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::codec::{PrivateKey, PublicKey};
use crate::error::{CredentialError, KeyFileError, Result};

/// Largest key file accepted. A 16384-bit PEM private key is about 12 KiB.
pub const MAX_KEY_FILE_SIZE: u64 = 64 * 1024;

/// Options for loading key files.
#[derive(Debug, Clone, Default)]
pub struct KeyFileOptions {
    /// Load private keys even when group or other can read them.
    pub allow_insecure_permissions: bool,
}

/// Load a PEM public key from `path`.
pub fn load_public_key(path: impl AsRef<Path>) -> Result<PublicKey> {
    let path = path.as_ref();
    let (pem, _) = read_key_file(path)?;
    PublicKey::from_pem(&pem).map_err(|err| with_path(err, path))
}

/// Load a PEM private key from `path` with default options.
pub fn load_private_key(path: impl AsRef<Path>) -> Result<PrivateKey> {
    load_private_key_with(path, &KeyFileOptions::default())
}

/// Load a PEM private key from `path`.
///
/// On Unix the file must not be readable by group or other unless
/// `options.allow_insecure_permissions` is set.
pub fn load_private_key_with(
    path: impl AsRef<Path>,
    options: &KeyFileOptions,
) -> Result<PrivateKey> {
    let path = path.as_ref();
    let (pem, metadata) = read_key_file(path)?;
    check_private_permissions(path, &metadata, options)?;
    PrivateKey::from_pem(&pem).map_err(|err| with_path(err, path))
}

fn with_path(err: CredentialError, path: &Path) -> CredentialError {
    match err {
        CredentialError::KeyFormat(msg) => {
            CredentialError::KeyFormat(format!("{}: {msg}", path.display()))
        }
        other => other,
    }
}

fn read_key_file(path: &Path) -> std::result::Result<(String, Metadata), KeyFileError> {
    let io_err = |source| KeyFileError::Io {
        path: path.to_path_buf(),
        source,
    };

    let path_metadata = std::fs::symlink_metadata(path).map_err(io_err)?;
    let file_type = path_metadata.file_type();
    if file_type.is_symlink() {
        return Err(KeyFileError::Symlink(path.to_path_buf()));
    }
    if !file_type.is_file() {
        return Err(KeyFileError::NotAFile(path.to_path_buf()));
    }

    let file = File::open(path).map_err(io_err)?;
    let opened_metadata = file.metadata().map_err(io_err)?;

    #[cfg(unix)]
    {
        if !same_file_identity(&path_metadata, &opened_metadata) {
            return Err(KeyFileError::Changed(path.to_path_buf()));
        }
    }

    if opened_metadata.len() > MAX_KEY_FILE_SIZE {
        return Err(KeyFileError::TooLarge {
            path: path.to_path_buf(),
            size: opened_metadata.len(),
            max: MAX_KEY_FILE_SIZE,
        });
    }

    let mut content = Vec::new();
    file.take(MAX_KEY_FILE_SIZE + 1)
        .read_to_end(&mut content)
        .map_err(io_err)?;
    if content.len() as u64 > MAX_KEY_FILE_SIZE {
        return Err(KeyFileError::TooLarge {
            path: path.to_path_buf(),
            size: content.len() as u64,
            max: MAX_KEY_FILE_SIZE,
        });
    }

    let pem = String::from_utf8(content).map_err(|_| KeyFileError::NotUtf8(path.to_path_buf()))?;
    debug!(path = %path.display(), bytes = pem.len(), "loaded key file");
    Ok((pem, opened_metadata))
}

#[cfg(unix)]
fn check_private_permissions(
    path: &Path,
    metadata: &Metadata,
    options: &KeyFileOptions,
) -> std::result::Result<(), KeyFileError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 == 0 {
        return Ok(());
    }
    if options.allow_insecure_permissions {
        warn!(path = %path.display(), mode = format!("{mode:o}"), "private key is readable by other users");
        return Ok(());
    }
    Err(KeyFileError::InsecurePermissions {
        path: path.to_path_buf(),
        mode,
    })
}

#[cfg(not(unix))]
fn check_private_permissions(
    _path: &Path,
    _metadata: &Metadata,
    _options: &KeyFileOptions,
) -> std::result::Result<(), KeyFileError> {
    Ok(())
}

#[cfg(unix)]
fn same_file_identity(path_metadata: &Metadata, opened_metadata: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}
