//! Log sinks for instrument sessions.
//!
//! A session logs through the [`Dispatch`] it was given at construction, so
//! several sessions can write to different destinations in one process. This
//! module builds that dispatch: console output plus, when a log directory is
//! configured, a per-session file named `<name>_<YYYYmmdd_HHMMSS>.log`.
//!
//! `RUST_LOG` overrides the configured level when it is set.

use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// A ready-to-use dispatch and the file it writes to, if any.
#[derive(Clone)]
pub struct LogSink {
    /// Dispatch to hand to [`SessionOptions::log_sink`](crate::instrument::SessionOptions::log_sink).
    pub dispatch: Dispatch,
    /// Log file receiving a copy of every event.
    pub file: Option<PathBuf>,
}

/// File name for a session log started at `started`.
pub fn log_file_name(name: &str, started: DateTime<Utc>) -> String {
    format!("{}_{}.log", name, started.format("%Y%m%d_%H%M%S"))
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Build a console (and optionally file) sink at `level`.
///
/// # Errors
///
/// Fails if `log_dir` cannot be created or the log file cannot be opened.
pub fn session_sink(name: &str, level: &str, log_dir: Option<&Path>) -> io::Result<LogSink> {
    let file = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(log_file_name(name, Utc::now()));
            let handle = File::create(&path)?;
            Some((path, handle))
        }
        None => None,
    };

    let (path, file_layer) = match file {
        Some((path, handle)) => (
            Some(path),
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(handle)),
            ),
        ),
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer())
        .with(file_layer);

    Ok(LogSink {
        dispatch: Dispatch::new(subscriber),
        file: path,
    })
}

/// Build a sink writing plain text to `writer`.
pub fn writer_sink<W>(level: &str, writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(fmt::layer().with_ansi(false).with_writer(writer));
    Dispatch::new(subscriber)
}
