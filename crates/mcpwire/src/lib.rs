//! JSON command channel over TCP with RSA-protected credentials.
//!
//! mcpwire sends one JSON request per connection to a command server and
//! reads back one JSON response, detecting the end of the response by
//! parsing rather than by a length prefix or delimiter. Passwords can travel
//! as RSA ciphertext that only the server can decrypt.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connect with a time budget, optional TLS
//! - [`frame`]: incremental JSON message framing
//! - [`channel`]: the request/response exchange
//! - [`cred`]: password encryption and key loading
//! - [`config`]: the deployment configuration file
//!
//! ```no_run
//! use std::time::Duration;
//! use mcpwire::Request;
//!
//! let request = Request::new("list_groups").with_token("abc");
//! let response = mcpwire::send("127.0.0.1", 5000, &request, Duration::from_secs(10))?;
//! println!("{response}");
//! # Ok::<(), mcpwire::ChannelError>(())
//! ```

pub mod config;

/// Re-export transport types.
pub mod transport {
    pub use mcpwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mcpwire_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use mcpwire_channel::*;
}

/// Re-export credential codec types.
pub mod cred {
    pub use mcpwire_cred::*;
}

#[cfg(feature = "async")]
pub use mcpwire_channel::send_async;
pub use mcpwire_channel::{
    send, send_with_config, ChannelConfig, ChannelError, Request, TlsOptions,
};
