//! Concurrent fan-out of one summary to every configured sink.

use std::sync::Arc;
use std::time::Duration;

use adsb_mesh_core::{AircraftSummary, DispatchReport};
use futures_util::future::join_all;

use crate::sink::{Sink, SinkError};

/// Per-sink limit so one hung sink cannot hold the record in flight forever.
pub const SINK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Dispatcher {
    sinks: Vec<Arc<dyn Sink>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Arc<dyn Sink>>, timeout: Duration) -> Self {
        Dispatcher { sinks, timeout }
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Send `summary` to all sinks at once and collect the outcomes.
    ///
    /// Every sink is attempted exactly once. A failure or timeout in one
    /// sink is logged and recorded; it never stops the others.
    pub async fn dispatch(&self, summary: &AircraftSummary) -> DispatchReport {
        let limit = self.timeout;
        let outcomes = join_all(self.sinks.iter().map(|sink| async move {
            let result = match tokio::time::timeout(limit, sink.send(summary)).await {
                Ok(r) => r,
                Err(_) => Err(SinkError::Timeout(limit)),
            };
            (sink.name(), result)
        }))
        .await;

        let mut report = DispatchReport::default();
        for (name, result) in outcomes {
            match result {
                Ok(()) => report.record_success(),
                Err(e) => {
                    log::warn!("{name}: failed to send {} ({}): {e}", summary.callsign, summary.icao);
                    report.record_failure(name, e);
                }
            }
        }
        report
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; optionally fails or stalls.
    pub struct MockSink {
        pub name: &'static str,
        pub fail: bool,
        pub stall: bool,
        pub calls: AtomicUsize,
    }

    impl MockSink {
        pub fn new(name: &'static str) -> Arc<Self> {
            Arc::new(MockSink {
                name,
                fail: false,
                stall: false,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(MockSink {
                name,
                fail: true,
                stall: false,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn stalling(name: &'static str) -> Arc<Self> {
            Arc::new(MockSink {
                name,
                fail: false,
                stall: true,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Sink for MockSink {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, _summary: &AircraftSummary) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail {
                return Err(SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockSink;
    use super::*;

    fn summary() -> AircraftSummary {
        AircraftSummary {
            icao: "A1B2C3".into(),
            callsign: "UAL123".into(),
            lat: 37.0,
            lon: -122.0,
            altitude_ft: Some(35000),
            ground_speed_kts: None,
            track_deg: None,
            squawk: None,
            timestamp: 0.0,
        }
    }

    #[tokio::test]
    async fn test_all_sinks_succeed() {
        let a = MockSink::new("a");
        let b = MockSink::new("b");
        let d = Dispatcher::new(vec![a.clone() as Arc<dyn Sink>, b.clone()], SINK_TIMEOUT);
        let report = d.dispatch(&summary()).await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert!(report.failures.is_empty());
        assert_eq!(d.sink_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_skip_other_sinks() {
        let a = MockSink::failing("a");
        let b = MockSink::new("b");
        let d = Dispatcher::new(vec![a.clone() as Arc<dyn Sink>, b.clone()], SINK_TIMEOUT);
        let report = d.dispatch(&summary()).await;

        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].sink, "a");
    }

    #[tokio::test]
    async fn test_stalled_sink_times_out() {
        let slow = MockSink::stalling("slow");
        let fast = MockSink::new("fast");
        let d = Dispatcher::new(vec![slow.clone() as Arc<dyn Sink>, fast.clone()], Duration::from_millis(100));
        let report = d.dispatch(&summary()).await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures[0].sink, "slow");
        assert!(report.failures[0].error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_no_sinks() {
        let d = Dispatcher::new(Vec::new(), SINK_TIMEOUT);
        let report = d.dispatch(&summary()).await;
        assert_eq!(report, DispatchReport::default());
    }
}
