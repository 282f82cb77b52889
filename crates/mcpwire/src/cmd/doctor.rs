use std::path::Path;
use std::time::Duration;

use mcpwire::channel::ChannelListener;
use mcpwire::cred::{load_private_key, load_public_key};
use mcpwire::transport::{connect, connect_with, TlsOptions};
use serde::Serialize;

use crate::cmd::{Context, DoctorArgs};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, ctx: &Context) -> CliResult<i32> {
    let mut checks = vec![
        loopback_listener_check(),
        config_check(ctx),
        public_key_check(ctx),
        private_key_check(ctx),
        compiled_features_check(),
    ];
    if args.probe {
        checks.push(server_probe_check(ctx));
    }

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, ctx.format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("mcpwire doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<18} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

// Bind an ephemeral loopback port and connect to it.
fn loopback_listener_check() -> CheckResult {
    let listener = match ChannelListener::bind("127.0.0.1:0") {
        Ok(listener) => listener,
        Err(err) => {
            return CheckResult::new(
                "loopback_tcp",
                CheckStatus::Fail,
                format!("bind failed: {err}"),
            );
        }
    };
    let addr = listener.local_addr();
    match connect("127.0.0.1", addr.port(), PROBE_TIMEOUT) {
        Ok(stream) => {
            stream.close();
            CheckResult::new("loopback_tcp", CheckStatus::Pass, format!("{addr} reachable"))
        }
        Err(err) => CheckResult::new(
            "loopback_tcp",
            CheckStatus::Fail,
            format!("connect failed: {err}"),
        ),
    }
}

fn config_check(ctx: &Context) -> CheckResult {
    match &ctx.config_path {
        Some(path) => CheckResult::new(
            "config",
            CheckStatus::Pass,
            format!("{} loaded", path.display()),
        ),
        None => CheckResult::new(
            "config",
            CheckStatus::Skip,
            "no --config or MCPWIRE_CONFIG given",
        ),
    }
}

fn public_key_check(ctx: &Context) -> CheckResult {
    let Some(path) = ctx.config.server.public_key.as_deref() else {
        return encryption_skip("public_key", ctx);
    };
    key_result("public_key", path, load_public_key(path).map(|key| key.bits()))
}

fn private_key_check(ctx: &Context) -> CheckResult {
    let Some(path) = ctx.config.server.private_key.as_deref() else {
        return CheckResult::new("private_key", CheckStatus::Skip, "PRIVATE_KEY not set");
    };
    key_result("private_key", path, load_private_key(path).map(|key| key.bits()))
}

fn encryption_skip(name: &'static str, ctx: &Context) -> CheckResult {
    if ctx.config.server.pw_encryption == Some(true) {
        CheckResult::new(
            name,
            CheckStatus::Fail,
            "PW_ENCRYPTION is enabled but PUBLIC_KEY is not set",
        )
    } else {
        CheckResult::new(name, CheckStatus::Skip, "PUBLIC_KEY not set")
    }
}

fn key_result(
    name: &'static str,
    path: &Path,
    loaded: mcpwire::cred::Result<usize>,
) -> CheckResult {
    match loaded {
        Ok(bits) => CheckResult::new(
            name,
            CheckStatus::Pass,
            format!("{} ({bits}-bit RSA)", path.display()),
        ),
        Err(err) => CheckResult::new(name, CheckStatus::Fail, err.to_string()),
    }
}

fn server_probe_check(ctx: &Context) -> CheckResult {
    let client = &ctx.config.client;
    let (Some(host), Some(port)) = (client.server_ip.as_deref(), client.server_port) else {
        return CheckResult::new(
            "server_probe",
            CheckStatus::Skip,
            "SERVER_IP and SERVER_PORT not configured",
        );
    };
    let tls = client.use_ssl.unwrap_or(false).then(|| TlsOptions {
        accept_self_signed: client.accept_self_signed.unwrap_or(false),
        ca_file: client.ca_file.clone(),
    });
    match connect_with(host, port, PROBE_TIMEOUT, tls.as_ref()) {
        Ok(stream) => {
            let kind = if stream.is_tls() { "TLS" } else { "TCP" };
            stream.close();
            CheckResult::new(
                "server_probe",
                CheckStatus::Pass,
                format!("{host}:{port} accepts {kind} connections"),
            )
        }
        Err(err) => CheckResult::new("server_probe", CheckStatus::Fail, err.to_string()),
    }
}

fn compiled_features_check() -> CheckResult {
    let mut features = Vec::new();
    if cfg!(feature = "async") {
        features.push("async");
    }
    if cfg!(feature = "tls") {
        features.push("tls");
    }
    if cfg!(feature = "cli") {
        features.push("cli");
    }

    CheckResult::new("compiled_features", CheckStatus::Info, features.join(", "))
}
