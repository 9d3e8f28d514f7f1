//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binary
//! - Define the log sink the web service writes its lifecycle lines to
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level
//! - The default sink discards everything, so a library user opts in

use std::fmt;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Destination for the web service's own log lines. Must not block or panic.
pub type LogSink = Arc<dyn Fn(fmt::Arguments<'_>) + Send + Sync>;

/// Sink that discards every line.
pub fn noop_sink() -> LogSink {
    Arc::new(|_args: fmt::Arguments<'_>| {})
}

/// Sink that forwards lines to `tracing` at debug level.
pub fn tracing_sink() -> LogSink {
    Arc::new(|args: fmt::Arguments<'_>| {
        tracing::debug!(target: "multiserve::service", "{}", args);
    })
}

/// Install the global subscriber. `default_level` is used when `RUST_LOG` is unset.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("multiserve={default_level},tower_http={default_level}").into());
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn sinks_accept_arguments() {
        noop_sink()(format_args!("discarded {}", 1));
        tracing_sink()(format_args!("forwarded {}", 2));
    }

    #[test]
    fn custom_sink_sees_formatted_line() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink: LogSink = {
            let lines = lines.clone();
            Arc::new(move |args: fmt::Arguments<'_>| lines.lock().unwrap().push(args.to_string()))
        };
        sink(format_args!("closing listener {}", "127.0.0.1:80"));
        assert_eq!(*lines.lock().unwrap(), vec!["closing listener 127.0.0.1:80"]);
    }
}
