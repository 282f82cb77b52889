use std::fmt;

use crate::codec::{PrivateKey, PublicKey};
use crate::error::{CredentialError, Result};

/// How passwords travel in a deployment. Decided once, by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// Passwords are sent as base64 RSA ciphertext.
    Encrypted,
    /// Passwords are sent as typed.
    #[default]
    Plaintext,
}

impl CredentialMode {
    pub fn from_flag(encrypted: bool) -> Self {
        if encrypted {
            Self::Encrypted
        } else {
            Self::Plaintext
        }
    }

    pub fn is_encrypted(self) -> bool {
        matches!(self, Self::Encrypted)
    }
}

/// A password as it will appear in `arguments.password`.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Plaintext(String),
    Ciphertext(String),
}

impl Credential {
    /// The wire value.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plaintext(value) | Self::Ciphertext(value) => value,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Plaintext(value) | Self::Ciphertext(value) => value,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Ciphertext(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, value) = match self {
            Self::Plaintext(value) => ("Plaintext", value),
            Self::Ciphertext(value) => ("Ciphertext", value),
        };
        f.debug_tuple(kind)
            .field(&format_args!("<redacted:{} bytes>", value.len()))
            .finish()
    }
}

/// Client side: turn a typed password into the value to send.
///
/// In plaintext mode the password passes through and the key is not used.
pub fn seal_password(
    mode: CredentialMode,
    plaintext: &str,
    public_key: Option<&PublicKey>,
) -> Result<Credential> {
    match mode {
        CredentialMode::Plaintext => Ok(Credential::Plaintext(plaintext.to_string())),
        CredentialMode::Encrypted => {
            let key = public_key.ok_or(CredentialError::MissingKey("public"))?;
            key.encrypt_with(plaintext).map(Credential::Ciphertext)
        }
    }
}

/// Trusted side: recover the plaintext password from a received value.
pub fn open_password(
    mode: CredentialMode,
    value: &str,
    private_key: Option<&PrivateKey>,
) -> Result<String> {
    match mode {
        CredentialMode::Plaintext => Ok(value.to_string()),
        CredentialMode::Encrypted => {
            let key = private_key.ok_or(CredentialError::MissingKey("private"))?;
            key.decrypt_with(value)
        }
    }
}
