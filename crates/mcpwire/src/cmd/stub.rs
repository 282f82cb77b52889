use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mcpwire::channel::{ChannelConfig, ChannelListener, Exchange, PASSWORD_ARGUMENT};
use mcpwire::cred::{load_private_key_with, open_password, CredentialMode, KeyFileOptions, PrivateKey};
use mcpwire::transport::TlsAcceptor;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cmd::{parse_duration, Context, StubArgs};
use crate::exit::{channel_error, credential_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::print_text;

const DEFAULT_PORT: u16 = 5000;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq)]
enum Reply {
    /// `{"status":"ok","command":<command>}`.
    Echo,
    Json(Value),
    Raw(Vec<u8>),
    Silent,
}

struct Stub {
    reply: Reply,
    delay: Option<Duration>,
    key: Option<PrivateKey>,
}

pub fn run(args: StubArgs, ctx: &Context) -> CliResult<i32> {
    let reply = reply_from_args(&args)?;
    let delay = args.delay.as_deref().map(parse_duration).transpose()?;
    let mut config = ChannelConfig::default();
    if let Some(raw) = &args.timeout {
        config.timeout = parse_duration(raw)?;
    }

    let key_path = args
        .private_key
        .or_else(|| ctx.config.server.private_key.clone());
    let key = match key_path {
        Some(path) => {
            let options = KeyFileOptions {
                allow_insecure_permissions: args.allow_insecure_key,
            };
            Some(
                load_private_key_with(&path, &options)
                    .map_err(|err| credential_error("failed to load private key", err))?,
            )
        }
        None => None,
    };

    let bind = args.bind.unwrap_or_else(|| {
        format!(
            "127.0.0.1:{}",
            ctx.config.server.port.unwrap_or(DEFAULT_PORT)
        )
    });
    let acceptor = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => Some(TlsAcceptor::from_pem_files(cert, key).map_err(|err| {
            CliError::usage(format!("failed to load TLS certificate: {}", err.reason()))
        })?),
        _ => None,
    };

    let mut listener = ChannelListener::bind(&bind)
        .map_err(|err| channel_error(&format!("failed to listen on {bind}"), err))?
        .with_config(config);
    if let Some(acceptor) = acceptor {
        listener = listener.with_tls(acceptor);
    }
    listener
        .set_nonblocking(true)
        .map_err(|err| channel_error("failed to configure listener", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let addr = listener.local_addr();
    info!(%addr, decrypting = key.is_some(), tls = args.tls_cert.is_some(), "stub listening");
    print_text("listening", &addr.to_string(), ctx.format);

    let stub = Stub { reply, delay, key };
    let mut handled = 0u64;
    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| handled >= count) {
            break;
        }
        match listener.try_accept() {
            Ok(Some(exchange)) => {
                handled += 1;
                stub.answer(exchange);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                handled += 1;
                warn!(error = %err, "failed to read request");
            }
        }
    }

    info!(handled, "stub stopped");
    Ok(SUCCESS)
}

impl Stub {
    fn answer(&self, exchange: Exchange) {
        let id = exchange.id();
        let command = exchange
            .request()
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        info!(id, peer = %exchange.peer_addr(), command = %command, "request received");

        let verified = self.check_password(exchange.request());

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let result = match &self.reply {
            Reply::Silent => {
                exchange.close();
                Ok(())
            }
            Reply::Raw(bytes) => exchange.respond_bytes(bytes),
            Reply::Json(value) => exchange.respond(value),
            Reply::Echo => match verified {
                Some(false) => exchange.respond(&json!({
                    "status": "error",
                    "message": "password decryption failed",
                })),
                _ => exchange.respond(&json!({ "status": "ok", "command": command })),
            },
        };
        if let Err(err) = result {
            warn!(id, error = %err, "failed to send reply");
        }
    }

    /// `None` when there is nothing to check. The password itself is never logged.
    fn check_password(&self, request: &Value) -> Option<bool> {
        let key = self.key.as_ref()?;
        let ciphertext = request
            .get("arguments")
            .and_then(|args| args.get(PASSWORD_ARGUMENT))
            .and_then(Value::as_str)?;
        match open_password(CredentialMode::Encrypted, ciphertext, Some(key)) {
            Ok(_) => {
                info!("password decrypted");
                Some(true)
            }
            Err(err) => {
                warn!(error = %err, "password could not be decrypted");
                Some(false)
            }
        }
    }
}

fn reply_from_args(args: &StubArgs) -> CliResult<Reply> {
    if args.no_reply {
        return Ok(Reply::Silent);
    }
    if let Some(raw) = &args.reply_raw {
        return Ok(Reply::Raw(raw.as_bytes().to_vec()));
    }
    match &args.reply {
        Some(raw) => serde_json::from_str(raw)
            .map(Reply::Json)
            .map_err(|err| CliError::new(USAGE, format!("--reply is not valid JSON: {err}"))),
        None => Ok(Reply::Echo),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
