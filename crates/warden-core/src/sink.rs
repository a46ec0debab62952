//! Reporting sinks injected by the embedding application.
//!
//! Each sink is a single-method trait so any closure can be used. The
//! `Tracing*` implementations route everything to the log, which is what the
//! command-line front end uses.

use tracing::{error, info};

/// Receives human-readable status messages during install and launch.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Receives raw process output lines and exit summaries.
pub trait OutputSink: Send + Sync {
    fn append_line(&self, line: &str);
}

/// Receives one user-facing message per failed start or restart attempt.
pub trait NotificationSink: Send + Sync {
    fn notify_error(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn append_line(&self, _line: &str) {}
}

impl NotificationSink for NullSink {
    fn notify_error(&self, _message: &str) {}
}

/// Logs status messages at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, message: &str) {
        info!("{}", message);
    }
}

/// Logs server output under the `server` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOutput;

impl OutputSink for TracingOutput {
    fn append_line(&self, line: &str) {
        info!(target: "server", "{}", line);
    }
}

/// Logs notifications at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify_error(&self, message: &str) {
        error!("{}", message);
    }
}
