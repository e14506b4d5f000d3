//! Process-wide tracing setup, owned by the entry point.
//!
//! Library code only emits `tracing` events; nothing in the library installs
//! a subscriber. A binary calls [`init`] once and keeps the returned guard
//! alive for the life of the process.

use std::io::{self, Write};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// Environment variable holding an `EnvFilter` directive; overrides the
/// configured level.
pub const LOG_ENV: &str = "TUTOR_LOG";

/// Keeps logging alive; flushes stderr on [`TelemetryGuard::shutdown`] or drop.
#[derive(Debug)]
pub struct TelemetryGuard {
    installed: bool,
    flushed: bool,
}

impl TelemetryGuard {
    /// False when another subscriber was already installed.
    pub fn installed(&self) -> bool {
        self.installed
    }

    pub fn shutdown(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if !self.flushed {
            let _ = io::stderr().flush();
            self.flushed = true;
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

fn filter_for(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr subscriber: human-readable, or JSON lines when
/// `config.json` is set.
pub fn init(config: &LogConfig) -> TelemetryGuard {
    let registry = tracing_subscriber::registry().with(filter_for(config));
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .try_init()
    };
    TelemetryGuard {
        installed: result.is_ok(),
        flushed: false,
    }
}
