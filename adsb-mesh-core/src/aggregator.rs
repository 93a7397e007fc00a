//! Sequential decode → merge → gate pipeline.
//!
//! Pure state machine: call `ingest()` with feed lines, get back what
//! happened. When the result is `Ingest::Dispatch` the caller fans the
//! summary out to its sinks and reports back through `complete()`.

use crate::decode::{decode_line, is_ignorable};
use crate::dispatch::{DispatchReport, MarkSentPolicy};
use crate::gate;
use crate::store::AircraftStore;
use crate::summary::AircraftSummary;
use crate::types::*;

/// What a single feed line did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// Line could not be decoded; store untouched.
    Skipped(DecodeError),
    /// Merged, nothing to send.
    Merged { icao: Icao, became_eligible: bool },
    /// Merged and the record is eligible and due. Already flagged in flight.
    Dispatch {
        icao: Icao,
        became_eligible: bool,
        summary: AircraftSummary,
    },
}

/// Owns the store and applies the broadcast rules to every merged line.
pub struct Aggregator {
    pub store: AircraftStore,
    pub update_interval: f64,
    pub policy: MarkSentPolicy,

    // Counters
    pub total_lines: u64,
    pub decoded: u64,
    pub parse_errors: u64,
    pub unsupported: u64,
    pub dispatches: u64,
    pub dispatch_failures: u64,
    pub evicted: u64,
}

impl Aggregator {
    pub fn new(update_interval: f64, policy: MarkSentPolicy, retention_secs: f64) -> Self {
        Aggregator {
            store: AircraftStore::new(retention_secs),
            update_interval,
            policy,
            total_lines: 0,
            decoded: 0,
            parse_errors: 0,
            unsupported: 0,
            dispatches: 0,
            dispatch_failures: 0,
            evicted: 0,
        }
    }

    /// Process one raw feed line received at `now`.
    pub fn ingest(&mut self, line: &str, now: f64) -> Ingest {
        self.total_lines += 1;

        let frame = match decode_line(line) {
            Ok(f) => f,
            Err(e) => {
                if is_ignorable(&e) {
                    self.unsupported += 1;
                } else {
                    self.parse_errors += 1;
                }
                return Ingest::Skipped(e);
            }
        };
        self.decoded += 1;

        self.apply(&frame.to_update(), now)
    }

    /// Merge an already-decoded update and run the gate.
    pub fn apply(&mut self, update: &FieldUpdate, now: f64) -> Ingest {
        let icao = update.icao;
        let interval = self.update_interval;

        let (rec, became_eligible) = self.store.merge(update, now);
        if rec.dispatch_in_flight || !gate::should_send(rec, now, interval) {
            return Ingest::Merged {
                icao,
                became_eligible,
            };
        }
        let summary = match AircraftSummary::from_record(rec, now) {
            Some(s) => s,
            None => {
                return Ingest::Merged {
                    icao,
                    became_eligible,
                }
            }
        };

        self.store.begin_dispatch(&icao);
        self.dispatches += 1;
        Ingest::Dispatch {
            icao,
            became_eligible,
            summary,
        }
    }

    /// Apply a finished dispatch. Returns whether the record was marked sent.
    ///
    /// `queued_at` is the time of the line that triggered the dispatch, so
    /// the throttle window does not stretch by however long the sinks took.
    pub fn complete(&mut self, icao: &Icao, queued_at: f64, report: &DispatchReport) -> bool {
        let mark = report.counts_as_sent(self.policy);
        self.dispatch_failures += report.failures.len() as u64;
        self.store.finish_dispatch(icao, queued_at, mark);
        mark
    }

    /// Give up on a dispatch that never reached the sinks.
    pub fn abandon(&mut self, icao: &Icao) {
        self.store.finish_dispatch(icao, 0.0, false);
    }

    /// Evict stale records. Returns count removed.
    pub fn prune(&mut self, now: f64) -> usize {
        let n = self.store.prune_stale(now);
        self.evicted += n as u64;
        n
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator::new(
            gate::DEFAULT_UPDATE_INTERVAL,
            MarkSentPolicy::default(),
            crate::store::DEFAULT_RETENTION_SECS,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
