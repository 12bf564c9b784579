// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();
static CHROME_GUARD: OnceLock<Mutex<Option<tracing_chrome::FlushGuard>>> = OnceLock::new();

/// Environment variable pointing at a Chrome trace output file.
pub const CHROME_TRACE_ENV: &str = "SPIRAL_TRACE_CHROME";

/// Options controlling the global subscriber.
#[derive(Clone, Debug, Default)]
pub struct TracingOptions {
    /// Number of `-v` flags given on the command line.
    pub verbosity: u8,
    /// Explicit Chrome trace destination. Falls back to [`CHROME_TRACE_ENV`].
    pub chrome_trace: Option<PathBuf>,
}

impl TracingOptions {
    pub fn with_verbosity(verbosity: u8) -> Self {
        Self {
            verbosity,
            chrome_trace: None,
        }
    }

    /// Filter directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Configures the global tracing subscriber.
///
/// `RUST_LOG` always wins over the verbosity-derived directive.
pub fn init_tracing(options: &TracingOptions) -> Result<(), InitError> {
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let ansi = std::io::stderr().is_terminal();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_directive()));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(ansi);

    let chrome_path = match options.chrome_trace.clone() {
        Some(path) => Some(path),
        None => chrome_trace_path()?,
    };

    match chrome_path {
        Some(path) => {
            let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                .file(path)
                .include_args(true)
                .build();
            let cell = CHROME_GUARD.get_or_init(|| Mutex::new(None));
            if let Ok(mut slot) = cell.lock() {
                *slot = Some(guard);
            }
            Registry::default()
                .with(filter)
                .with(fmt_layer)
                .with(chrome_layer)
                .init();
        }
        None => {
            Registry::default().with(filter).with(fmt_layer).init();
        }
    }

    Ok(())
}

/// Flushes the Chrome trace, if one was configured. Safe to call repeatedly.
pub fn flush_tracing() {
    if let Some(cell) = CHROME_GUARD.get() {
        if let Ok(mut slot) = cell.lock() {
            slot.take();
        }
    }
}

fn chrome_trace_path() -> Result<Option<PathBuf>, InitError> {
    match std::env::var(CHROME_TRACE_ENV) {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(PathBuf::from(raw))),
        Ok(_) => Ok(None),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(InitError::Env(err)),
    }
}

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read {CHROME_TRACE_ENV}: {0}")]
    Env(std::env::VarError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_directive() {
        assert_eq!(TracingOptions::with_verbosity(0).default_directive(), "warn");
        assert_eq!(TracingOptions::with_verbosity(1).default_directive(), "info");
        assert_eq!(TracingOptions::with_verbosity(2).default_directive(), "debug");
        assert_eq!(TracingOptions::with_verbosity(7).default_directive(), "trace");
    }

    #[test]
    fn second_initialisation_is_rejected() {
        let options = TracingOptions::default();
        let _ = init_tracing(&options);
        assert!(matches!(
            init_tracing(&options),
            Err(InitError::AlreadyInitialised)
        ));
    }
}
