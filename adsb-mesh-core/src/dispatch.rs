//! Dispatch outcome bookkeeping and the mark-sent policy.
//!
//! The fan-out itself lives with the sinks (async, in the gateway); this
//! module only decides what a finished fan-out means for the record.

use serde::Deserialize;

/// When does a finished dispatch count as "sent" for throttling?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkSentPolicy {
    /// Every sink was tried, whatever the outcome.
    #[default]
    Attempted,
    /// At least one sink succeeded.
    AnySuccess,
}

impl std::str::FromStr for MarkSentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attempted" => Ok(MarkSentPolicy::Attempted),
            "any-success" => Ok(MarkSentPolicy::AnySuccess),
            other => Err(format!(
                "unknown mark-sent policy {other:?} (expected \"attempted\" or \"any-success\")"
            )),
        }
    }
}

impl std::fmt::Display for MarkSentPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkSentPolicy::Attempted => write!(f, "attempted"),
            MarkSentPolicy::AnySuccess => write!(f, "any-success"),
        }
    }
}

/// One sink that failed during a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkFailure {
    pub sink: String,
    pub error: String,
}

/// Result of presenting one summary to every configured sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<SinkFailure>,
}

impl DispatchReport {
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, sink: &str, error: impl ToString) {
        self.attempted += 1;
        self.failures.push(SinkFailure {
            sink: sink.to_string(),
            error: error.to_string(),
        });
    }

    /// Whether the record should be marked sent under `policy`.
    ///
    /// With no sinks at all there is nothing to succeed, so both policies
    /// treat the dispatch as done.
    pub fn counts_as_sent(&self, policy: MarkSentPolicy) -> bool {
        match policy {
            MarkSentPolicy::Attempted => true,
            MarkSentPolicy::AnySuccess => self.attempted == 0 || self.succeeded > 0,
        }
    }
}
