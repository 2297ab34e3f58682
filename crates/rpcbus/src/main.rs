mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use rpcbus_socket::SocketKind;

use crate::cmd::{parse_duration, CliOptions, Command};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "rpcbus", version, about = "Local RPC bus CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). Defaults to info for server, proxy and
    /// listen, warn otherwise.
    #[arg(long, value_name = "LEVEL", env = "RPCBUS_LOG_LEVEL", global = true)]
    log_level: Option<LogLevel>,

    /// Wire encoding: raw (binary frames) or json (one object per line).
    #[arg(
        long,
        value_name = "KIND",
        default_value = "raw",
        env = "RPCBUS_TRANSPORT",
        global = true
    )]
    transport: SocketKind,

    /// Request timeout (e.g. 5s, 250ms).
    #[arg(long, value_name = "DURATION", default_value = "5s", global = true)]
    timeout: String,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let level = cli
        .log_level
        .unwrap_or_else(|| LogLevel::default_for(cli.command.keeps_running()));
    init_logging(cli.log_format, level);

    let result = parse_duration(&cli.timeout).and_then(|timeout| {
        let options = CliOptions {
            format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
            transport: cli.transport,
            timeout,
        };
        cmd::run(cli.command, &options)
    });

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
