//! The live pipeline: feed lines in, dispatches out.
//!
//! One task owns the `Aggregator` and applies lines strictly in arrival
//! order. Dispatches run on a single worker task behind a bounded queue;
//! the worker reports each finished fan-out back to the owner, which is the
//! only place the record's sent state changes.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use adsb_mesh_core::types::{icao_to_string, Icao};
use adsb_mesh_core::{Aggregator, AircraftSummary, DispatchReport, Ingest};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::dispatch::Dispatcher;

/// Dispatches waiting for the worker before new ones are dropped.
pub const DISPATCH_QUEUE: usize = 64;

/// How often stale aircraft are evicted.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Wall-clock time as epoch seconds.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

struct Job {
    icao: Icao,
    summary: AircraftSummary,
    queued_at: f64,
}

struct Done {
    icao: Icao,
    report: DispatchReport,
    queued_at: f64,
}

pub struct Gateway {
    agg: Aggregator,
    dispatcher: Arc<Dispatcher>,
}

impl Gateway {
    pub fn new(agg: Aggregator, dispatcher: Arc<Dispatcher>) -> Self {
        Gateway { agg, dispatcher }
    }

    /// Run until the feed closes or `shutdown` resolves.
    ///
    /// When the feed closes, queued dispatches are finished first. On
    /// shutdown they are abandoned. Returns the aggregator for reporting.
    pub async fn run<F>(mut self, mut lines: mpsc::Receiver<String>, shutdown: F) -> Aggregator
    where
        F: Future<Output = ()>,
    {
        let (job_tx, job_rx) = mpsc::channel(DISPATCH_QUEUE);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(dispatch_worker(self.dispatcher.clone(), job_rx, done_tx));

        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately
        prune.tick().await;

        tokio::pin!(shutdown);
        let mut interrupted = false;

        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => self.handle_line(&line, &job_tx),
                    None => {
                        log::info!("Feed closed");
                        break;
                    }
                },
                Some(done) = done_rx.recv() => self.finish(done),
                _ = prune.tick() => self.prune(),
                _ = &mut shutdown => {
                    log::info!("Shutting down...");
                    interrupted = true;
                    break;
                }
            }
        }

        drop(job_tx);
        if interrupted {
            worker.abort();
        } else {
            while let Some(done) = done_rx.recv().await {
                self.finish(done);
            }
        }

        log::info!(
            "{} lines, {} decoded, {} errors, {} dispatches, {} aircraft tracked",
            self.agg.total_lines,
            self.agg.decoded,
            self.agg.parse_errors,
            self.agg.dispatches,
            self.agg.store.len()
        );
        self.agg
    }

    fn handle_line(&mut self, line: &str, jobs: &mpsc::Sender<Job>) {
        let received = now();
        match self.agg.ingest(line, received) {
            Ingest::Skipped(e) => log::debug!("Skipped line: {e}"),
            Ingest::Merged {
                icao,
                became_eligible: true,
            } => log::debug!("{} now has callsign and position", icao_to_string(&icao)),
            Ingest::Merged { .. } => {}
            Ingest::Dispatch { icao, summary, .. } => {
                log::debug!("Dispatching {} ({})", summary.callsign, summary.icao);
                let job = Job {
                    icao,
                    summary,
                    queued_at: received,
                };
                match jobs.try_send(job) {
                    Ok(()) => {}
                    Err(TrySendError::Full(job)) => {
                        log::warn!(
                            "Dispatch queue full, dropping update for {}",
                            job.summary.callsign
                        );
                        self.agg.abandon(&icao);
                    }
                    Err(TrySendError::Closed(_)) => {
                        log::error!("Dispatch worker has stopped");
                        self.agg.abandon(&icao);
                    }
                }
            }
        }
    }

    fn finish(&mut self, done: Done) {
        let marked = self.agg.complete(&done.icao, done.queued_at, &done.report);
        log::debug!(
            "{}: {}/{} sinks ok, marked sent: {marked}",
            icao_to_string(&done.icao),
            done.report.succeeded,
            done.report.attempted
        );
    }

    fn prune(&mut self) {
        let evicted = self.agg.prune(now());
        if evicted > 0 {
            log::info!(
                "Evicted {evicted} stale aircraft, {} tracked",
                self.agg.store.len()
            );
        }
    }
}

async fn dispatch_worker(
    dispatcher: Arc<Dispatcher>,
    mut jobs: mpsc::Receiver<Job>,
    done: mpsc::UnboundedSender<Done>,
) {
    while let Some(job) = jobs.recv().await {
        let report = dispatcher.dispatch(&job.summary).await;
        if done
            .send(Done {
                icao: job.icao,
                report,
                queued_at: job.queued_at,
            })
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::mock::MockSink;
    use crate::dispatch::SINK_TIMEOUT;
    use crate::sink::Sink;
    use adsb_mesh_core::MarkSentPolicy;

    const ICAO: Icao = [0xA1, 0xB2, 0xC3];
    const ID_LINE: &str = "MSG,1,1,1,A1B2C3,1,,,,,UAL123,,,,,,,,,,,0";
    const POS_LINE: &str = "MSG,3,1,1,A1B2C3,1,,,,,,35000,,,37.0,-122.0,,,0,0,0,0";
    const ALT_LINE: &str = "MSG,5,1,1,A1B2C3,1,,,,,,35100,,,,,,,0,,0,0";

    async fn run_lines(gw: Gateway, lines: &[&str]) -> Aggregator {
        let (tx, rx) = mpsc::channel(16);
        for line in lines {
            tx.send(line.to_string()).await.unwrap();
        }
        drop(tx);
        gw.run(rx, std::future::pending::<()>()).await
    }

    #[tokio::test]
    async fn test_end_to_end_single_dispatch() {
        let a = MockSink::new("a");
        let b = MockSink::new("b");
        let dispatcher = Dispatcher::new(vec![a.clone() as Arc<dyn Sink>, b.clone()], SINK_TIMEOUT);
        let gw = Gateway::new(Aggregator::default(), Arc::new(dispatcher));

        let agg = run_lines(gw, &[ID_LINE, POS_LINE, ALT_LINE, POS_LINE]).await;

        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(agg.dispatches, 1);
        let rec = agg.store.get(&ICAO).unwrap();
        assert!(rec.last_broadcast.is_some());
        assert!(!rec.dispatch_in_flight);
        assert_eq!(rec.altitude_ft, Some(35000));
        assert_eq!(rec.message_count, 4);
    }

    #[tokio::test]
    async fn test_failing_sink_still_marks_attempted() {
        let bad = MockSink::failing("bad");
        let good = MockSink::new("good");
        let dispatcher =
            Dispatcher::new(vec![bad.clone() as Arc<dyn Sink>, good.clone()], SINK_TIMEOUT);
        let gw = Gateway::new(Aggregator::default(), Arc::new(dispatcher));

        let agg = run_lines(gw, &[ID_LINE, POS_LINE]).await;

        assert_eq!(bad.calls(), 1);
        assert_eq!(good.calls(), 1);
        assert_eq!(agg.dispatch_failures, 1);
        assert!(agg.store.get(&ICAO).unwrap().last_broadcast.is_some());
    }

    #[tokio::test]
    async fn test_all_failed_any_success_not_marked() {
        let bad = MockSink::failing("bad");
        let dispatcher = Dispatcher::new(vec![bad.clone() as Arc<dyn Sink>], SINK_TIMEOUT);
        let agg = Aggregator::new(300.0, MarkSentPolicy::AnySuccess, 3600.0);
        let gw = Gateway::new(agg, Arc::new(dispatcher));

        let agg = run_lines(gw, &[ID_LINE, POS_LINE]).await;

        assert_eq!(bad.calls(), 1);
        let rec = agg.store.get(&ICAO).unwrap();
        assert!(rec.last_broadcast.is_none());
        assert!(!rec.dispatch_in_flight);
    }

    #[tokio::test]
    async fn test_incomplete_aircraft_never_dispatched() {
        let a = MockSink::new("a");
        let dispatcher = Dispatcher::new(vec![a.clone() as Arc<dyn Sink>], SINK_TIMEOUT);
        let gw = Gateway::new(Aggregator::default(), Arc::new(dispatcher));

        let agg = run_lines(gw, &[POS_LINE, ALT_LINE, "garbage", ""]).await;

        assert_eq!(a.calls(), 0);
        assert_eq!(agg.dispatches, 0);
        assert_eq!(agg.parse_errors, 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let dispatcher = Dispatcher::new(Vec::new(), SINK_TIMEOUT);
        let gw = Gateway::new(Aggregator::default(), Arc::new(dispatcher));
        let (_tx, rx) = mpsc::channel::<String>(1);

        let agg = tokio::time::timeout(Duration::from_secs(5), gw.run(rx, async {}))
            .await
            .unwrap();
        assert_eq!(agg.total_lines, 0);
    }

    #[tokio::test]
    async fn test_last_broadcast_uses_line_time_not_completion() {
        let slow = MockSink::stalling("slow");
        let dispatcher = Dispatcher::new(
            vec![slow.clone() as Arc<dyn Sink>],
            Duration::from_millis(500),
        );
        let gw = Gateway::new(Aggregator::default(), Arc::new(dispatcher));

        let started = now();
        let agg = run_lines(gw, &[ID_LINE, POS_LINE]).await;
        let finished = now();

        assert_eq!(slow.calls(), 1);
        assert!(finished - started >= 0.5);
        let sent_at = agg.store.get(&ICAO).unwrap().last_broadcast.unwrap();
        assert!(sent_at >= started);
        assert!(sent_at - started < 0.4, "stamped {:.3}s after start", sent_at - started);
    }
}
