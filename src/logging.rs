//! Logging initialization.
//!
//! Structured logging via `tracing`. Verbosity comes from repeated `-v`
//! flags unless `NBACK_LOG` holds an `EnvFilter` directive.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Appends to a file; used while the terminal UI owns the screen.
    File(PathBuf),
}

/// - 0 → `"warn"`
/// - 1 → `"info"`
/// - 2 → `"debug"`
/// - 3+ → `"trace"`
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(verbosity: u8, target: LogTarget) {
    let filter = EnvFilter::try_from_env("NBACK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)));
    let show_target = verbosity >= 2;

    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            // No log file means no logs; the UI must not be disturbed.
            if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(show_target)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
            }
        }
    }
}
