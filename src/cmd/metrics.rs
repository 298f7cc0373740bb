use crate::cmd::Command;

/// Fetch the server's metrics snapshot.
///
/// Takes no arguments. The payload is free-form: servers typically reply
/// with a bulk string of Prometheus-style samples, but an array reply is
/// equally acceptable; the harness only requires that it decodes.
#[derive(Debug, Default)]
pub struct Metrics;

impl Metrics {
    /// Create a new `Metrics` command.
    pub fn new() -> Metrics {
        Metrics
    }

    pub(crate) fn into_command(self) -> Command {
        Command::new("METRICS")
    }
}
