use std::io::Write;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

/// Where log lines go. The terminal client keeps stdout for the reply and
/// logs to stderr instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

pub fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Builds the `RUST_LOG` filter, falling back to `default` for anything the
/// variable does not mention.
pub fn env_filter(default: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy()
}

/// Installs the global subscriber. Keep the guard alive for the lifetime of
/// the process or buffered lines are lost on exit.
pub fn logging(target: LogTarget, default: LevelFilter) -> WorkerGuard {
    match target {
        LogTarget::Stdout => install(std::io::stdout(), default),
        LogTarget::Stderr => install(std::io::stderr(), default),
    }
}

pub fn logging_stdout() -> WorkerGuard {
    logging(LogTarget::Stdout, default_level())
}

fn install<W: Write + Send + 'static>(writer: W, default: LevelFilter) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(writer);
    let verbose = cfg!(debug_assertions);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .with(env_filter(default))
        .init();
    guard
}
