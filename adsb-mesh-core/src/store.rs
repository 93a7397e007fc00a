//! Per-aircraft record store with presence-only merge.
//!
//! Pure logic, no I/O. Owns both the telemetry fields and the broadcast
//! bookkeeping for each ICAO address, so a record's throttle state lives and
//! dies with the record itself.

use std::collections::HashMap;

use crate::gate;
use crate::types::*;

/// Default age in seconds after which a silent aircraft is evicted.
pub const DEFAULT_RETENTION_SECS: f64 = 3600.0;

// ---------------------------------------------------------------------------
// Aircraft record
// ---------------------------------------------------------------------------

/// Accumulated state for a single aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftRecord {
    pub icao: Icao,
    pub callsign: Option<String>,

    // Position: written only as a pair
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub altitude_ft: Option<i32>,

    // Velocity
    pub ground_speed_kts: Option<f64>,
    pub track_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,

    // Surveillance
    pub squawk: Option<String>,
    pub alert: Option<bool>,
    pub emergency: Option<bool>,
    pub spi: Option<bool>,
    pub on_ground: Option<bool>,

    // Metadata
    pub first_seen: f64,
    pub last_seen: f64,
    pub message_count: u64,

    // Broadcast bookkeeping
    pub last_broadcast: Option<f64>,
    pub dispatch_in_flight: bool,
}

impl AircraftRecord {
    pub fn new(icao: Icao, timestamp: f64) -> Self {
        AircraftRecord {
            icao,
            callsign: None,
            lat: None,
            lon: None,
            altitude_ft: None,
            ground_speed_kts: None,
            track_deg: None,
            vertical_rate_fpm: None,
            squawk: None,
            alert: None,
            emergency: None,
            spi: None,
            on_ground: None,
            first_seen: timestamp,
            last_seen: timestamp,
            message_count: 0,
            last_broadcast: None,
            dispatch_in_flight: false,
        }
    }

    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    pub fn position(&self) -> Option<Position> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Position { lat, lon }),
            _ => None,
        }
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.last_seen
    }

    /// Overwrite only the fields present in `u`.
    fn apply(&mut self, u: &FieldUpdate) {
        if let Some(cs) = &u.callsign {
            let cs = cs.trim();
            if !cs.is_empty() {
                self.callsign = Some(cs.to_string());
            }
        }
        if let Some(pos) = u.position {
            self.lat = Some(pos.lat);
            self.lon = Some(pos.lon);
        }
        fill(&mut self.altitude_ft, u.altitude_ft);
        fill(&mut self.ground_speed_kts, u.ground_speed_kts);
        fill(&mut self.track_deg, u.track_deg);
        fill(&mut self.vertical_rate_fpm, u.vertical_rate_fpm);
        if let Some(sq) = &u.squawk {
            self.squawk = Some(sq.clone());
        }
        fill(&mut self.alert, u.alert);
        fill(&mut self.emergency, u.emergency);
        fill(&mut self.spi, u.spi);
        fill(&mut self.on_ground, u.on_ground);
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Mapping from ICAO address to accumulated record.
///
/// Callers must serialize `merge` and `mark_sent`; the aggregator does this
/// by owning the store on a single task.
pub struct AircraftStore {
    records: HashMap<Icao, AircraftRecord>,
    /// Seconds of silence before a record is evicted. `0` disables eviction.
    pub retention_secs: f64,
}

impl AircraftStore {
    pub fn new(retention_secs: f64) -> Self {
        AircraftStore {
            records: HashMap::new(),
            retention_secs,
        }
    }

    /// Merge an update into its record, creating the record if needed.
    ///
    /// Returns the post-merge record and whether it became eligible with
    /// this merge (was not eligible before, is now).
    pub fn merge(&mut self, update: &FieldUpdate, received_at: f64) -> (&AircraftRecord, bool) {
        let rec = self
            .records
            .entry(update.icao)
            .or_insert_with(|| AircraftRecord::new(update.icao, received_at));

        let was_eligible = gate::is_eligible(rec);
        rec.apply(update);
        rec.message_count += 1;
        if received_at > rec.last_seen {
            rec.last_seen = received_at;
        }
        let now_eligible = gate::is_eligible(rec);

        (&*rec, !was_eligible && now_eligible)
    }

    /// Record a broadcast. Unknown ids are ignored.
    pub fn mark_sent(&mut self, icao: &Icao, time: f64) {
        if let Some(rec) = self.records.get_mut(icao) {
            rec.last_broadcast = Some(time);
        }
    }

    /// Flag a record as handed to dispatch. Returns false for unknown ids.
    pub fn begin_dispatch(&mut self, icao: &Icao) -> bool {
        match self.records.get_mut(icao) {
            Some(rec) => {
                rec.dispatch_in_flight = true;
                true
            }
            None => false,
        }
    }

    /// Clear the in-flight flag, marking the record sent if `mark` is set.
    pub fn finish_dispatch(&mut self, icao: &Icao, time: f64, mark: bool) {
        if let Some(rec) = self.records.get_mut(icao) {
            rec.dispatch_in_flight = false;
        }
        if mark {
            self.mark_sent(icao, time);
        }
    }

    pub fn get(&self, icao: &Icao) -> Option<&AircraftRecord> {
        self.records.get(icao)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AircraftRecord> {
        self.records.values()
    }

    /// Number of records that currently have callsign and position.
    pub fn eligible_count(&self) -> usize {
        self.records.values().filter(|r| gate::is_eligible(r)).count()
    }

    fn is_stale(&self, rec: &AircraftRecord, now: f64) -> bool {
        self.retention_secs > 0.0 && rec.age(now) > self.retention_secs
    }

    /// All non-stale records, most recently seen first.
    pub fn active(&self, now: f64) -> Vec<&AircraftRecord> {
        let mut active: Vec<_> = self
            .records
            .values()
            .filter(|r| !self.is_stale(r, now))
            .collect();
        active.sort_by(|a, b| b.last_seen.total_cmp(&a.last_seen));
        active
    }

    /// Evict records silent for longer than the retention window. Returns count removed.
    pub fn prune_stale(&mut self, now: f64) -> usize {
        if self.retention_secs <= 0.0 {
            return 0;
        }
        let retention = self.retention_secs;
        let before = self.records.len();
        self.records.retain(|_, r| r.age(now) <= retention);
        before - self.records.len()
    }
}

impl Default for AircraftStore {
    fn default() -> Self {
        AircraftStore::new(DEFAULT_RETENTION_SECS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
