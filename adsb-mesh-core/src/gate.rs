//! Broadcast gate: is a record complete enough, and has it waited long enough?
//!
//! Evaluated after every merge so a record becomes sendable on the very
//! message that completes it.

use crate::store::AircraftRecord;

/// Default seconds between broadcasts of the same aircraft.
pub const DEFAULT_UPDATE_INTERVAL: f64 = 300.0;

/// Callsign and both coordinates present.
pub fn is_eligible(rec: &AircraftRecord) -> bool {
    rec.callsign.is_some() && rec.has_position()
}

/// Never broadcast, or at least `interval` seconds since the last broadcast.
pub fn is_due(rec: &AircraftRecord, now: f64, interval: f64) -> bool {
    match rec.last_broadcast {
        None => true,
        Some(last) => now - last >= interval,
    }
}

pub fn should_send(rec: &AircraftRecord, now: f64, interval: f64) -> bool {
    is_eligible(rec) && is_due(rec, now, interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_record() -> AircraftRecord {
        let mut rec = AircraftRecord::new([0xA1, 0xB2, 0xC3], 0.0);
        rec.callsign = Some("UAL123".into());
        rec.lat = Some(37.0);
        rec.lon = Some(-122.0);
        rec
    }

    #[test]
    fn test_eligibility_needs_every_piece() {
        let rec = complete_record();
        assert!(is_eligible(&rec));

        let mut no_callsign = rec.clone();
        no_callsign.callsign = None;
        assert!(!is_eligible(&no_callsign));

        let mut no_lat = rec.clone();
        no_lat.lat = None;
        assert!(!is_eligible(&no_lat));

        let mut no_lon = rec;
        no_lon.lon = None;
        assert!(!is_eligible(&no_lon));
    }

    #[test]
    fn test_never_broadcast_is_due() {
        assert!(is_due(&complete_record(), 0.0, DEFAULT_UPDATE_INTERVAL));
    }

    #[test]
    fn test_throttle_boundary() {
        let mut rec = complete_record();
        rec.last_broadcast = Some(0.0);

        assert!(!should_send(&rec, 299.0, 300.0));
        assert!(!should_send(&rec, 299.999, 300.0));
        assert!(should_send(&rec, 300.0, 300.0));
        assert!(should_send(&rec, 1000.0, 300.0));
    }

    #[test]
    fn test_due_but_ineligible() {
        let mut rec = complete_record();
        rec.callsign = None;
        assert!(is_due(&rec, 0.0, 300.0));
        assert!(!should_send(&rec, 0.0, 300.0));
    }

    #[test]
    fn test_zero_interval_always_due() {
        let mut rec = complete_record();
        rec.last_broadcast = Some(5.0);
        assert!(should_send(&rec, 5.0, 0.0));
    }
}
