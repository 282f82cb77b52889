//! Password protection for mcpwire requests.
//!
//! A client encrypts a password with the server's RSA public key
//! (PKCS#1 v1.5 padding) and sends the base64 ciphertext; only the holder of
//! the private key can recover it. Everything here is synchronous and pure
//! apart from [`keyfile`], which reads PEM files defensively.
//!
//! ```no_run
//! let public = mcpwire_cred::load_public_key("/srv/.ssh/id_rsa_public.pem")?;
//! let ciphertext = public.encrypt_with("s3cret")?;
//! # Ok::<(), mcpwire_cred::CredentialError>(())
//! ```

pub mod codec;
pub mod credential;
pub mod error;
pub mod keyfile;

pub use codec::{decrypt, encrypt, PrivateKey, PublicKey, PKCS1_V15_OVERHEAD};
pub use credential::{open_password, seal_password, Credential, CredentialMode};
pub use error::{CredentialError, KeyFileError, Result};
pub use keyfile::{
    load_private_key, load_private_key_with, load_public_key, KeyFileOptions, MAX_KEY_FILE_SIZE,
};
