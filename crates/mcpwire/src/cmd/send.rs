use mcpwire::channel::{send_with_config, ChannelConfig, ChannelError, Request};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::cmd::{Context, SendArgs, Target};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_response;

pub fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let mut arguments = match &args.args_json {
        Some(raw) => parse_args_json(raw)?,
        None => Map::new(),
    };
    for pair in &args.args {
        let (key, value) = parse_arg(pair)?;
        arguments.insert(key, value);
    }

    let target = args.connection.target(&ctx.config.client)?;
    let token = if args.no_token {
        None
    } else {
        Some(args.connection.token(&ctx.config.client)?)
    };

    let request = Request::new(args.command)
        .with_optional_token(token)
        .with_arguments(arguments);
    exchange(ctx, &target, &request)
}

/// Send one request and print the response.
///
/// Any well-formed response exits 0, including `{"status":"error"}` replies;
/// interpreting them is up to the caller.
pub fn exchange(ctx: &Context, target: &Target, request: &Request) -> CliResult<i32> {
    debug!(
        ?request,
        host = %target.host,
        port = target.port,
        tls = target.tls.is_some(),
        "sending request"
    );
    let config = ChannelConfig {
        tls: target.tls.clone(),
        ..ChannelConfig::with_timeout(target.timeout)
    };
    let response =
        send_with_config(&target.host, target.port, request, &config).map_err(|err| {
            let hint = tls_hint(&err, target);
            let mut cli = channel_error(request.command(), err);
            if let Some(hint) = hint {
                cli.message = format!("{} ({hint})", cli.message);
            }
            cli
        })?;
    info!(command = request.command(), "response received");
    print_response(&response, ctx.format);
    Ok(SUCCESS)
}

/// A TLS mismatch shows up as garbage or a silent close on plain TCP, and as
/// a handshake failure on TLS.
fn tls_hint(err: &ChannelError, target: &Target) -> Option<&'static str> {
    match (err, &target.tls) {
        (ChannelError::MalformedResponse(_), None)
        | (ChannelError::IncompleteResponse { received: 0 }, None) => {
            Some("the server may require TLS; try --use-ssl")
        }
        (ChannelError::Connection { reason, .. }, Some(_)) if reason.starts_with("TLS") => {
            Some("server and/or client may require TLS encryption")
        }
        _ => None,
    }
}

fn parse_args_json(raw: &str) -> CliResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::new(USAGE, "--args-json must be a JSON object")),
        Err(err) => Err(CliError::new(
            USAGE,
            format!("--args-json is not valid JSON: {err}"),
        )),
    }
}

fn parse_arg(pair: &str) -> CliResult<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| CliError::new(USAGE, format!("--arg expects KEY=VALUE, got {pair}")))?;
    if key.is_empty() {
        return Err(CliError::new(USAGE, format!("--arg has an empty key: {pair}")));
    }
    let value =
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
