use std::path::PathBuf;

/// Errors from the credential codec.
///
/// None of the messages include key material, plaintext or ciphertext.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The key material is not a parseable RSA key of the expected kind.
    #[error("invalid key: {0}")]
    KeyFormat(String),

    /// The plaintext does not fit in one PKCS#1 v1.5 block for this key.
    #[error("plaintext too large ({size} bytes, max {max} for this key)")]
    PlaintextTooLarge { size: usize, max: usize },

    /// Decryption failed. Deliberately carries no detail.
    #[error("decryption failed")]
    Decryption,

    /// Encrypted mode was requested without the key it needs.
    #[error("password encryption is enabled but no {0} key was supplied")]
    MissingKey(&'static str),

    /// A key file could not be loaded.
    #[error(transparent)]
    KeyFile(#[from] KeyFileError),
}

/// Errors from loading a PEM key file.
#[derive(Debug, thiserror::Error)]
pub enum KeyFileError {
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("refusing to load key file through a symlink: {0}")]
    Symlink(PathBuf),

    #[error("key path is not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("key file too large ({size} bytes, max {max}): {path}")]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("key file changed while loading: {0}")]
    Changed(PathBuf),

    /// A private key readable by group or other.
    #[error("private key {path} is accessible by other users (mode {mode:o}); restrict it to the owner")]
    InsecurePermissions { path: PathBuf, mode: u32 },

    #[error("key file is not valid UTF-8: {0}")]
    NotUtf8(PathBuf),
}

pub type Result<T> = std::result::Result<T, CredentialError>;
