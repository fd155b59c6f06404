use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn level_name(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Filter directive of the terminal: the lockstep crates at the requested level and every
/// dependency at `warn`. `None` defers to `RUST_LOG`.
fn terminal_directive(verbosity: u8, quiet: bool) -> Option<String> {
    if quiet {
        Some("off".to_string())
    } else if verbosity == 0 {
        None
    } else {
        Some(format!("warn,lockstep={}", level_name(verbosity)))
    }
}

/// Filter directive of the log file, independent of `--quiet`. The file always keeps
/// per-worker detail down to `debug`.
fn file_directive(verbosity: u8) -> String {
    format!("warn,lockstep={}", level_name(verbosity.max(2)))
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let terminal_filter = match terminal_directive(verbosity, quiet) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(terminal_filter);

    let subscriber = tracing_subscriber::registry().with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(&path).map_err(CliError::Io)?;

        // Lines carry the `worker{rank=..}` span of the thread that wrote them.
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_target(true)
            .with_filter(EnvFilter::new(file_directive(verbosity)));

        subscriber.with(file_layer).init();
    } else {
        subscriber.init();
    }

    Ok(())
}
