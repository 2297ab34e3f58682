//! Diagnostics for the `rpcbus` binary.
//!
//! Bus events (peer connects, relayed calls, dropped frames) are logged via
//! `tracing` from the library crates. The binary decides where they go:
//! always stderr, so that listings, call results and signal lines on stdout
//! stay machine-readable.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Shape of the stderr log stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event, for collectors watching a long-running server.
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    /// Adds peer lifecycle and per-request tracing.
    Debug,
    Trace,
}

impl LogLevel {
    /// Level used when `--log-level` is absent.
    ///
    /// Commands that keep a bus open (server, proxy, listen) report what they
    /// serve at `info`. One-shot client commands only surface problems.
    pub fn default_for(long_running: bool) -> Self {
        if long_running {
            LogLevel::Info
        } else {
            LogLevel::Warn
        }
    }

    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Route bus diagnostics to stderr.
///
/// A second call is ignored, so tests that build the CLI in-process can call
/// it freely.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false);

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_commands_default_quieter_than_servers() {
        assert_eq!(LogLevel::default_for(true), LogLevel::Info);
        assert_eq!(LogLevel::default_for(false), LogLevel::Warn);
        assert!(LogLevel::default_for(false).as_filter() < LogLevel::default_for(true).as_filter());
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging(LogFormat::Text, LogLevel::Error);
        init_logging(LogFormat::Json, LogLevel::Trace);
    }
}
