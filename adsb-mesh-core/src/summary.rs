//! Sink-agnostic aircraft summary and its compact text rendering.

use serde::Serialize;

use crate::store::AircraftRecord;
use crate::types::icao_to_string;

/// The fields every sink renders from. Built once per dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftSummary {
    pub icao: String,
    pub callsign: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: Option<i32>,
    pub ground_speed_kts: Option<f64>,
    pub track_deg: Option<f64>,
    pub squawk: Option<String>,
    pub timestamp: f64,
}

impl AircraftSummary {
    /// Build from an eligible record. Returns `None` if callsign or position is missing.
    pub fn from_record(rec: &AircraftRecord, now: f64) -> Option<Self> {
        let callsign = rec.callsign.clone()?;
        let pos = rec.position()?;
        Some(AircraftSummary {
            icao: icao_to_string(&rec.icao),
            callsign,
            lat: pos.lat,
            lon: pos.lon,
            altitude_ft: rec.altitude_ft,
            ground_speed_kts: rec.ground_speed_kts,
            track_deg: rec.track_deg,
            squawk: rec.squawk.clone(),
            timestamp: now,
        })
    }

    /// Compact text for low-bandwidth radio links.
    ///
    /// `UAL123 35000ft 37.00N/122.00W 450kt 270deg`
    pub fn to_text(&self) -> String {
        let mut parts = vec![self.callsign.clone()];
        if let Some(alt) = self.altitude_ft {
            parts.push(format!("{alt}ft"));
        }
        parts.push(format!(
            "{:.2}{}/{:.2}{}",
            self.lat.abs(),
            if self.lat >= 0.0 { 'N' } else { 'S' },
            self.lon.abs(),
            if self.lon >= 0.0 { 'E' } else { 'W' },
        ));
        if let Some(spd) = self.ground_speed_kts {
            parts.push(format!("{spd:.0}kt"));
        }
        if let Some(trk) = self.track_deg {
            parts.push(format!("{trk:.0}deg"));
        }
        parts.join(" ")
    }
}
