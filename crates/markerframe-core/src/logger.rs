//! Stderr logging for the batch tools.
//!
//! Records print as `[elapsed LEVEL crate] message`. Install the logger once
//! at startup with [`init_with_level`]; with the `tracing` feature,
//! [`init_tracing`] installs a `tracing-subscriber` formatter instead.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

struct StderrLogger {
    started: Instant,
}

/// `markerframe_core::plane` -> `markerframe_core`.
fn crate_of(target: &str) -> &str {
    target.split("::").next().unwrap_or(target)
}

fn format_record(elapsed: f64, record: &Record<'_>) -> String {
    format!(
        "[{:7.3}s {:>5} {}] {}",
        elapsed,
        record.level(),
        crate_of(record.target()),
        record.args()
    )
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let line = format_record(self.started.elapsed().as_secs_f64(), record);
            let _ = writeln!(std::io::stderr().lock(), "{line}");
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger, or change its level if it is already installed.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            started: Instant::now(),
        });
        log::set_logger(logger)?;
    }
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` fmt subscriber on stderr, filtered by `RUST_LOG`, or
/// by `level` when `RUST_LOG` is unset.
///
/// Stage spans are reported when they close. `log` records are forwarded
/// through the subscriber's log bridge. A second call is ignored.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback_directive(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
    if installed.is_err() {
        log::debug!("tracing subscriber already installed");
    }
}

/// `LevelFilter::Debug` -> `"debug"`.
#[cfg(feature = "tracing")]
fn fallback_directive(level: LevelFilter) -> String {
    level.as_str().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_carry_the_crate_name_only() {
        let line = format_record(
            1.5,
            &Record::builder()
                .args(format_args!("fitted {} points", 12))
                .level(log::Level::Warn)
                .target("markerframe_core::plane")
                .build(),
        );
        assert_eq!(line, "[  1.500s  WARN markerframe_core] fitted 12 points");
    }

    #[test]
    fn reinstalling_adjusts_the_level() {
        init_with_level(LevelFilter::Warn).expect("first install");
        assert_eq!(log::max_level(), LevelFilter::Warn);
        init_with_level(LevelFilter::Debug).expect("second call");
        assert_eq!(log::max_level(), LevelFilter::Debug);
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn cli_level_becomes_the_filter_fallback() {
        assert_eq!(fallback_directive(LevelFilter::Warn), "warn");
        assert_eq!(fallback_directive(LevelFilter::Off), "off");
        assert!(EnvFilter::try_new(fallback_directive(LevelFilter::Trace)).is_ok());
    }
}
