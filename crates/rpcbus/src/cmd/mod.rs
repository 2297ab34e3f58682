use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use rpcbus_core::{BusConfig, BusContext};
use rpcbus_socket::{open_socket, PeerId, SocketKind};
use rpcbus_value::Value;

use crate::exit::{bus_error, CliError, CliResult, DATA_INVALID, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod list;
pub mod listen;
pub mod proxy;
pub mod server;
pub mod signal;
pub mod version;

/// How long long-running commands block in one event loop tick.
pub(crate) const TICK: Duration = Duration::from_millis(100);

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub format: OutputFormat,
    pub transport: SocketKind,
    pub timeout: Duration,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a bus server exposing the system object.
    Server(ServerArgs),
    /// List the objects a server exposes.
    List(ListArgs),
    /// Call a method and print its result.
    Call(CallArgs),
    /// Broadcast a signal.
    Signal(SignalArgs),
    /// Connect and print received signals.
    Listen(ListenArgs),
    /// Relay clients to an upstream bus.
    Proxy(ProxyArgs),
    /// Show version information.
    Version(VersionArgs),
}

impl Command {
    /// Holds the bus open until interrupted.
    pub fn keeps_running(&self) -> bool {
        match self {
            Command::Server(_) | Command::Proxy(_) => true,
            Command::Listen(args) => args.count.is_none(),
            Command::List(_) | Command::Call(_) | Command::Signal(_) | Command::Version(_) => false,
        }
    }
}

pub fn run(command: Command, options: &CliOptions) -> CliResult<i32> {
    match command {
        Command::Server(args) => server::run(args, options),
        Command::List(args) => list::run(args, options),
        Command::Call(args) => call::run(args, options),
        Command::Signal(args) => signal::run(args, options),
        Command::Listen(args) => listen::run(args, options),
        Command::Proxy(args) => proxy::run(args, options),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Socket path or host:port to listen on.
    pub address: String,
    /// Well-known name announced to clients.
    #[arg(long, default_value = "ubus")]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Socket path or host:port of the server.
    pub address: String,
    /// Well-known name of the server.
    #[arg(long, default_value = "ubus")]
    pub peer: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path or host:port to connect to.
    pub address: String,
    /// Well-known name of the peer owning the object.
    pub peer: String,
    /// Object path.
    pub object: String,
    /// Method name.
    pub method: String,
    /// JSON argument. Default: empty object.
    pub argument: Option<String>,
}

#[derive(Args, Debug)]
pub struct SignalArgs {
    /// Socket path or host:port to connect to.
    pub address: String,
    /// Signal name.
    pub name: String,
    /// JSON arguments. An array is sent as the argument list.
    pub arguments: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path or host:port to connect to.
    pub address: String,
    /// Exit after receiving N signals.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ProxyArgs {
    /// Socket path or host:port to accept clients on.
    pub listen: String,
    /// Socket path or host:port of the upstream bus.
    pub connect: String,
    /// Wire encoding towards the upstream bus. Default: same as --transport.
    #[arg(long, value_name = "KIND")]
    pub upstream_transport: Option<SocketKind>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

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

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn parse_json_argument(text: Option<&str>, default: Value) -> CliResult<Value> {
    match text {
        None => Ok(default),
        Some(text) => Value::from_json_str(text)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid JSON argument: {err}"))),
    }
}

/// Client context with a per-process name, connected to `address`.
pub(crate) fn connect_client(
    address: &str,
    options: &CliOptions,
) -> CliResult<(BusContext, PeerId)> {
    let config = BusConfig {
        request_timeout: options.timeout,
        ..BusConfig::default()
    };
    let name = format!("rpcbus-cli-{}", std::process::id());
    let mut ctx = BusContext::with_config(name, open_socket(options.transport), config);
    let peer = ctx
        .connect(address)
        .map_err(|err| bus_error("connect failed", err))?;
    tracing::debug!(%address, peer, transport = %options.transport, "connected");
    Ok((ctx, peer))
}

pub(crate) fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("bad").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn json_argument_defaults_and_errors() {
        assert_eq!(parse_json_argument(None, Value::table()).unwrap(), Value::table());
        assert_eq!(
            parse_json_argument(Some("[1, \"a\"]"), Value::Null).unwrap(),
            Value::Array(vec![Value::Int(1), Value::from("a")])
        );
        assert_eq!(
            parse_json_argument(Some("{broken"), Value::Null).unwrap_err().code,
            DATA_INVALID
        );
    }
}
