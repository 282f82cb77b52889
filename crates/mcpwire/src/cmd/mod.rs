use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use mcpwire::channel::{TlsOptions, DEFAULT_TIMEOUT};
use mcpwire::config::{ClientConfig, ConfigFile};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;
use crate::prompt::{secret_or_prompt, value_or_prompt};

pub mod chats;
pub mod doctor;
pub mod groups;
pub mod login;
pub mod password;
pub mod send;
pub mod stub;
pub mod version;

/// Settings resolved once in `main` and shared by every command.
#[derive(Debug)]
pub struct Context {
    pub format: OutputFormat,
    pub config: ConfigFile,
    pub config_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send any command with free-form arguments.
    Send(SendArgs),
    /// Log in with email and password.
    Login(LoginArgs),
    /// List the groups visible to the token.
    ListGroups(ListGroupsArgs),
    /// Delete one group.
    DeleteGroup(DeleteGroupArgs),
    /// Delete the chat history of the token's user.
    DeleteAllChats(DeleteAllChatsArgs),
    /// Encrypt a password with the server's public key.
    EncryptPassword(EncryptPasswordArgs),
    /// Decrypt a password ciphertext with a private key.
    DecryptPassword(DecryptPasswordArgs),
    /// Run a reference server that answers each request once.
    Stub(StubArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, ctx),
        Command::Login(args) => login::run(args, ctx),
        Command::ListGroups(args) => groups::list(args, ctx),
        Command::DeleteGroup(args) => groups::delete(args, ctx),
        Command::DeleteAllChats(args) => chats::delete_all(args, ctx),
        Command::EncryptPassword(args) => password::encrypt(args, ctx),
        Command::DecryptPassword(args) => password::decrypt(args, ctx),
        Command::Stub(args) => stub::run(args, ctx),
        Command::Doctor(args) => doctor::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

/// Where and how to reach the command server.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Server host name or IP address.
    #[arg(long, env = "MCPWIRE_SERVER_IP", value_name = "HOST")]
    pub server_ip: Option<String>,
    /// Server TCP port.
    #[arg(long, env = "MCPWIRE_SERVER_PORT", value_name = "PORT")]
    pub server_port: Option<u16>,
    /// Session token.
    #[arg(long, env = "MCPWIRE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// Budget for the whole exchange (e.g. 10s, 500ms). At most 24h.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,
    /// Connect over TLS (also enabled by USE_SSL).
    #[arg(long)]
    pub use_ssl: bool,
    /// Accept any server certificate, e.g. a self-signed one.
    #[arg(long)]
    pub accept_self_signed: bool,
    /// Additional CA certificates (PEM) to trust for TLS.
    #[arg(long, value_name = "PEM")]
    pub ca_file: Option<PathBuf>,
}

/// Longest accepted exchange budget.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub tls: Option<TlsOptions>,
}

impl ConnectionArgs {
    /// Resolve host, port, timeout and TLS: flag or environment, then config,
    /// then prompt.
    pub fn target(&self, config: &ClientConfig) -> CliResult<Target> {
        let timeout = self.timeout(config)?;
        let tls = self.tls(config)?;
        let host = value_or_prompt(
            self.server_ip.clone().or_else(|| config.server_ip.clone()),
            "--server-ip",
            "Server IP",
        )?;
        let port = match self.server_port.or(config.server_port) {
            Some(port) => port,
            None => parse_port(&value_or_prompt(None, "--server-port", "Server port")?)?,
        };
        Ok(Target {
            host,
            port,
            timeout,
            tls,
        })
    }

    /// The session token, prompting without echo when neither flag nor
    /// config has one.
    pub fn token(&self, config: &ClientConfig) -> CliResult<String> {
        secret_or_prompt(
            self.token.clone().or_else(|| config.token.clone()),
            "--token",
            "Token",
        )
    }

    fn timeout(&self, config: &ClientConfig) -> CliResult<Duration> {
        if let Some(raw) = &self.timeout {
            return parse_duration(raw);
        }
        match config.timeout_secs {
            Some(0) => Err(CliError::new(USAGE, "TIMEOUT_SECS must be greater than zero")),
            Some(secs) if secs > MAX_TIMEOUT.as_secs() => Err(CliError::new(
                USAGE,
                format!("TIMEOUT_SECS must be at most {}", MAX_TIMEOUT.as_secs()),
            )),
            Some(secs) => Ok(Duration::from_secs(secs)),
            None => Ok(DEFAULT_TIMEOUT),
        }
    }

    fn tls(&self, config: &ClientConfig) -> CliResult<Option<TlsOptions>> {
        let use_ssl = self.use_ssl || config.use_ssl.unwrap_or(false);
        let accept_self_signed =
            self.accept_self_signed || config.accept_self_signed.unwrap_or(false);
        let ca_file = self.ca_file.clone().or_else(|| config.ca_file.clone());

        if !use_ssl {
            if accept_self_signed {
                return Err(CliError::usage("--accept-self-signed requires --use-ssl"));
            }
            if ca_file.is_some() {
                return Err(CliError::usage("--ca-file requires --use-ssl"));
            }
            return Ok(None);
        }
        Ok(Some(TlsOptions {
            accept_self_signed,
            ca_file,
        }))
    }
}

fn parse_port(input: &str) -> CliResult<u16> {
    match input.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(CliError::new(USAGE, format!("invalid port: {input}"))),
    }
}

/// Parse `2s`, `150ms` or a bare number of seconds, up to [`MAX_TIMEOUT`].
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    let duration = match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    };
    if duration > MAX_TIMEOUT {
        return Err(CliError::new(
            USAGE,
            format!("duration must be at most 24h, got {input}"),
        ));
    }
    Ok(duration)
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Command name, e.g. list_groups.
    #[arg(long, value_name = "NAME")]
    pub command: String,
    /// Argument as key=value; the value is parsed as JSON when possible.
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,
    /// Arguments as one JSON object, merged before --arg values.
    #[arg(long, value_name = "OBJECT")]
    pub args_json: Option<String>,
    /// Send without a token, even if one is configured.
    #[arg(long)]
    pub no_token: bool,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Account email.
    #[arg(long)]
    pub email: Option<String>,
    /// Account password.
    #[arg(long, env = "MCPWIRE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Encrypt the password before sending (also enabled by PW_ENCRYPTION).
    #[arg(long)]
    pub encrypt_password: bool,
    /// Server public key (PEM). Defaults to PUBLIC_KEY from the config.
    #[arg(long, value_name = "PEM")]
    pub public_key: Option<PathBuf>,
    /// The password is already ciphertext; send it unchanged.
    #[arg(long)]
    pub password_is_ciphertext: bool,
}

#[derive(Args, Debug)]
pub struct ListGroupsArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct DeleteGroupArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Name of the group to delete.
    #[arg(long, value_name = "NAME")]
    pub group_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteAllChatsArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct EncryptPasswordArgs {
    /// Public key (PEM). Defaults to PUBLIC_KEY from the config.
    #[arg(long, value_name = "PEM")]
    pub public_key: Option<PathBuf>,
    /// Password to encrypt.
    #[arg(long, env = "MCPWIRE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecryptPasswordArgs {
    /// Private key (PEM). Defaults to PRIVATE_KEY from the config.
    #[arg(long, value_name = "PEM")]
    pub private_key: Option<PathBuf>,
    /// Base64 ciphertext.
    #[arg(long)]
    pub ciphertext: Option<String>,
    /// Load the private key even if other users can read it.
    #[arg(long)]
    pub allow_insecure_key: bool,
}

#[derive(Args, Debug)]
pub struct StubArgs {
    /// Address to listen on. Defaults to 127.0.0.1 and PORT from the config.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
    /// JSON value to answer every request with.
    #[arg(long, value_name = "JSON", conflicts_with = "reply_raw")]
    pub reply: Option<String>,
    /// Bytes to answer with verbatim, valid JSON or not.
    #[arg(long, value_name = "TEXT")]
    pub reply_raw: Option<String>,
    /// Close every connection without answering.
    #[arg(long, conflicts_with_all = ["reply", "reply_raw"])]
    pub no_reply: bool,
    /// Wait this long before answering (e.g. 50ms).
    #[arg(long, value_name = "DURATION")]
    pub delay: Option<String>,
    /// Private key (PEM) used to decrypt arguments.password.
    #[arg(long, value_name = "PEM")]
    pub private_key: Option<PathBuf>,
    /// Load the private key even if other users can read it.
    #[arg(long)]
    pub allow_insecure_key: bool,
    /// Exit after this many connections.
    #[arg(long, value_name = "N")]
    pub count: Option<u64>,
    /// Budget for reading each request and writing each reply.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,
    /// Serve TLS with this certificate chain (PEM).
    #[arg(long, value_name = "PEM", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    /// Private key (PEM) for --tls-cert.
    #[arg(long, value_name = "PEM", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    /// Also try to reach the configured server.
    #[arg(long)]
    pub probe: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
