mod cmd;
mod exit;
mod logging;
mod output;
mod prompt;

use std::path::PathBuf;

use clap::Parser;
use mcpwire::config::ConfigFile;

use crate::cmd::{Command, Context};
use crate::exit::{config_error, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "mcpwire", version, about = "JSON command channel client")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Configuration file (JSON with Server_Config / Client_Config sections).
    #[arg(long, value_name = "FILE", env = "MCPWIRE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let result =
        build_context(cli.format, cli.config).and_then(|ctx| cmd::run(cli.command, &ctx));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

fn build_context(
    format: Option<OutputFormat>,
    config_path: Option<PathBuf>,
) -> CliResult<Context> {
    let config = match &config_path {
        Some(path) => ConfigFile::load(path).map_err(config_error)?,
        None => ConfigFile::default(),
    };
    Ok(Context {
        format: format.unwrap_or_else(OutputFormat::default_for_stdout),
        config,
        config_path,
    })
}
