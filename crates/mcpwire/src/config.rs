//! Deployment configuration file.
//!
//! The file is JSON with one object per section. Only `Server_Config` and
//! `Client_Config` are read; other sections of a shared server config
//! (`Functions`, `Restrictions`, ...) are ignored so the same file can be
//! pointed at by the server and by clients.
//!
//! Flag values are strings in many existing deployments (`"PW_ENCRYPTION":
//! "true"`), so booleans and ports accept either form.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

/// Config files are small; anything bigger is a wrong path.
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Errors from loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config file too large ({size} bytes, max {max}): {path}")]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// The parts of the configuration file mcpwire understands.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "Server_Config", default)]
    pub server: ServerConfig,
    #[serde(rename = "Client_Config", default)]
    pub client: ClientConfig,
}

/// `Server_Config`: settings shared with the server deployment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// Listening port of the server.
    #[serde(rename = "PORT", default, deserialize_with = "flexible_port")]
    pub port: Option<u16>,
    /// Whether passwords travel as ciphertext.
    #[serde(rename = "PW_ENCRYPTION", default, deserialize_with = "flexible_bool")]
    pub pw_encryption: Option<bool>,
    #[serde(rename = "PUBLIC_KEY", default)]
    pub public_key: Option<PathBuf>,
    #[serde(rename = "PRIVATE_KEY", default)]
    pub private_key: Option<PathBuf>,
}

/// `Client_Config`: defaults for client connections.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientConfig {
    #[serde(rename = "SERVER_IP", default)]
    pub server_ip: Option<String>,
    #[serde(rename = "SERVER_PORT", default, deserialize_with = "flexible_port")]
    pub server_port: Option<u16>,
    #[serde(rename = "TOKEN", default)]
    pub token: Option<String>,
    #[serde(rename = "TIMEOUT_SECS", default)]
    pub timeout_secs: Option<u64>,
    /// Connect over TLS.
    #[serde(rename = "USE_SSL", default, deserialize_with = "flexible_bool")]
    pub use_ssl: Option<bool>,
    /// Skip server certificate verification when connecting over TLS.
    #[serde(rename = "ACCEPT_SELF_SIGNED", default, deserialize_with = "flexible_bool")]
    pub accept_self_signed: Option<bool>,
    /// Extra CA certificates (PEM) trusted for TLS.
    #[serde(rename = "CA_FILE", default)]
    pub ca_file: Option<PathBuf>,
}

impl ConfigFile {
    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        if size > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size,
                max: MAX_CONFIG_FILE_SIZE,
            });
        }

        let mut content = String::new();
        file.take(MAX_CONFIG_FILE_SIZE)
            .read_to_string(&mut content)
            .map_err(io_err)?;
        Self::from_json(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Str(String),
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<BoolOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(BoolOrString::Bool(value)) => Ok(Some(value)),
        Some(BoolOrString::Str(value)) => match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "expected \"true\" or \"false\", got {other:?}"
            ))),
        },
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortOrString {
    Port(u16),
    Str(String),
}

fn flexible_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<PortOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortOrString::Port(port)) => Ok(Some(port)),
        Some(PortOrString::Str(value)) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port {value:?}"))),
    }
}
