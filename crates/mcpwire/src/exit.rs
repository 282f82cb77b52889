use std::fmt;
use std::io;

use mcpwire::channel::ChannelError;
use mcpwire::config::ConfigError;
use mcpwire::cred::{CredentialError, KeyFileError};

pub const SUCCESS: i32 = 0;
#[allow(dead_code)]
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Io(source) => io_error(context, source),
        ChannelError::Connection { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        ChannelError::TlsSetup(_) => CliError::usage(format!("{context}: {err}")),
        ChannelError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ChannelError::IncompleteResponse { .. }
        | ChannelError::MalformedResponse(_)
        | ChannelError::ResponseTooLarge { .. }
        | ChannelError::Encoding(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn credential_error(context: &str, err: CredentialError) -> CliError {
    match err {
        CredentialError::KeyFile(KeyFileError::Io { source, .. }) => io_error(context, source),
        CredentialError::KeyFile(KeyFileError::InsecurePermissions { .. }) => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        CredentialError::MissingKey(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn config_error(err: ConfigError) -> CliError {
    match err {
        ConfigError::Io { source, path } if source.kind() == io::ErrorKind::NotFound => {
            CliError::usage(format!("config file not found: {}", path.display()))
        }
        ConfigError::Io { source, path } => {
            io_error(&format!("failed to read config {}", path.display()), source)
        }
        other => CliError::new(DATA_INVALID, other.to_string()),
    }
}
