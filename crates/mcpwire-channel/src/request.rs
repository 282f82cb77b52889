use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Argument key that carries a login credential.
pub const PASSWORD_ARGUMENT: &str = "password";

/// A command request: `{"command": ..., "token": ..., "arguments": {...}}`.
///
/// Built once through the consuming `with_*` methods and then only read.
/// `token` and `arguments.password` are opaque credential material and are
/// redacted in debug output.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    command: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    arguments: Map<String, Value>,
}

impl Request {
    /// Start a request for `command` with no token and no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            token: None,
            arguments: Map::new(),
        }
    }

    /// Attach a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach an optional bearer token; `None` leaves the token unset.
    pub fn with_optional_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Set a single argument, replacing any earlier value under `key`.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Merge a map of arguments; later keys win.
    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// The `password` argument, when present as a string.
    pub fn password(&self) -> Option<&str> {
        self.arguments.get(PASSWORD_ARGUMENT).and_then(Value::as_str)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Request");
        dbg.field("command", &self.command);
        if let Some(token) = &self.token {
            dbg.field("token", &format_args!("<redacted:{} bytes>", token.len()));
        } else {
            dbg.field("token", &Option::<String>::None);
        }
        dbg.field("arguments", &RedactedArguments(&self.arguments));
        dbg.finish()
    }
}

struct RedactedArguments<'a>(&'a Map<String, Value>);

impl fmt::Debug for RedactedArguments<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (key, value) in self.0 {
            if key == PASSWORD_ARGUMENT {
                let len = match value {
                    Value::String(s) => s.len(),
                    other => other.to_string().len(),
                };
                dbg.entry(key, &format_args!("<redacted:{len} bytes>"));
            } else {
                dbg.entry(key, value);
            }
        }
        dbg.finish()
    }
}
