//! Logging setup and helpers for reporting errors as they propagate.
use tracing::Subscriber;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, EnvFilter, Layer};

/// The error type returned when building a subscriber.
#[derive(Debug, thiserror::Error)]
pub enum BuildSubscriberError {
    #[error("failed to parse filtering directive")]
    Parse(#[from] tracing_subscriber::filter::ParseError),
}

/// Build a tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set and defaults to `info`. Span
/// close events are included so every kafka operation reports its duration.
pub fn build_subscriber() -> Result<impl Subscriber + Send + Sync, BuildSubscriberError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE);
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    Ok(tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter)))
}

/// Log an error with its display and debug forms as structured fields.
macro_rules! log_error {
    ($error:expr, $($arg:tt)+) => {
        tracing::error!(error.message = %$error, error.details = ?$error, $($arg)+)
    };
    ($error:expr) => {
        tracing::error!(error.message = %$error, error.details = ?$error)
    };
}

/// Build a closure for `Result::inspect_err` that logs the error.
macro_rules! as_error {
    ($($arg:tt)+) => {
        |error| $crate::utils::o11y::logging::log_error!(error, $($arg)+)
    };
}

/// Same as `as_error!`, at warn level, for failures that are reported rather
/// than propagated.
macro_rules! as_warning {
    ($($arg:tt)+) => {
        |error| tracing::warn!(error.message = %error, error.details = ?error, $($arg)+)
    };
}

pub(crate) use as_error;
pub(crate) use as_warning;
pub(crate) use log_error;
