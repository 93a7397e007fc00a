//! Shared types, error enums, and decoded message types for adsb-mesh-core.

use serde::Serialize;
use thiserror::Error;

/// Errors produced outside the per-line decode path.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to read config file '{path}': {source}")]
    ConfigRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Why a single feed line could not be turned into an update.
///
/// Always non-fatal: the caller skips the line and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },
    #[error("unsupported record type: {0}")]
    UnsupportedRecord(String),
    #[error("unknown transmission type: {0}")]
    UnknownTransmissionType(String),
    #[error("missing hex ident")]
    MissingIdent,
    #[error("invalid hex ident: {0}")]
    InvalidIdent(String),
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 3-byte ICAO address. Stored as raw bytes to avoid per-line String allocation.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char uppercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    format!("{:02X}{:02X}{:02X}", icao[0], icao[1], icao[2])
}

/// Parse a 6-char hex string into an ICAO address. Case-insensitive.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some([
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ])
}

// ---------------------------------------------------------------------------
// Decoded message types
// ---------------------------------------------------------------------------

/// A latitude/longitude pair. Only ever constructed with both halves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// One SBS-1 `MSG` record, one variant per transmission type.
///
/// Each variant names exactly the fields that transmission type carries;
/// every field is optional because dump1090 leaves unknown values blank.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SbsMessage {
    /// MSG,1: ES identification and category.
    Identification { callsign: Option<String> },
    /// MSG,2: ES surface position.
    SurfacePosition {
        altitude_ft: Option<i32>,
        ground_speed_kts: Option<f64>,
        track_deg: Option<f64>,
        position: Option<Position>,
        on_ground: Option<bool>,
    },
    /// MSG,3: ES airborne position.
    AirbornePosition {
        altitude_ft: Option<i32>,
        position: Option<Position>,
        alert: Option<bool>,
        emergency: Option<bool>,
        spi: Option<bool>,
        on_ground: Option<bool>,
    },
    /// MSG,4: ES airborne velocity.
    AirborneVelocity {
        ground_speed_kts: Option<f64>,
        track_deg: Option<f64>,
        vertical_rate_fpm: Option<i32>,
    },
    /// MSG,5: surveillance altitude reply.
    SurveillanceAltitude {
        altitude_ft: Option<i32>,
        alert: Option<bool>,
        spi: Option<bool>,
        on_ground: Option<bool>,
    },
    /// MSG,6: surveillance identity reply.
    SurveillanceId {
        altitude_ft: Option<i32>,
        squawk: Option<String>,
        alert: Option<bool>,
        emergency: Option<bool>,
        spi: Option<bool>,
        on_ground: Option<bool>,
    },
    /// MSG,7: air-to-air message.
    AirToAir {
        altitude_ft: Option<i32>,
        on_ground: Option<bool>,
    },
    /// MSG,8: all-call reply.
    AllCallReply { on_ground: Option<bool> },
}

impl SbsMessage {
    /// SBS transmission type number (1-8).
    pub fn transmission_type(&self) -> u8 {
        match self {
            SbsMessage::Identification { .. } => 1,
            SbsMessage::SurfacePosition { .. } => 2,
            SbsMessage::AirbornePosition { .. } => 3,
            SbsMessage::AirborneVelocity { .. } => 4,
            SbsMessage::SurveillanceAltitude { .. } => 5,
            SbsMessage::SurveillanceId { .. } => 6,
            SbsMessage::AirToAir { .. } => 7,
            SbsMessage::AllCallReply { .. } => 8,
        }
    }
}

/// A decoded feed line: the aircraft it concerns plus its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SbsFrame {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub message: SbsMessage,
}

fn serialize_icao<S: serde::Serializer>(icao: &Icao, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&icao_to_string(icao))
}

/// Sparse set of field assignments for one aircraft.
///
/// `None` always means "not present in this update", never "clear the field".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    pub icao: Icao,
    pub transmission_type: u8,
    pub callsign: Option<String>,
    pub position: Option<Position>,
    pub altitude_ft: Option<i32>,
    pub ground_speed_kts: Option<f64>,
    pub track_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub squawk: Option<String>,
    pub alert: Option<bool>,
    pub emergency: Option<bool>,
    pub spi: Option<bool>,
    pub on_ground: Option<bool>,
}

impl SbsFrame {
    /// Flatten the per-type variant into a sparse update for the store.
    pub fn to_update(&self) -> FieldUpdate {
        let mut u = FieldUpdate {
            icao: self.icao,
            transmission_type: self.message.transmission_type(),
            ..FieldUpdate::default()
        };
        match &self.message {
            SbsMessage::Identification { callsign } => {
                u.callsign = callsign.clone();
            }
            SbsMessage::SurfacePosition {
                altitude_ft,
                ground_speed_kts,
                track_deg,
                position,
                on_ground,
            } => {
                u.altitude_ft = *altitude_ft;
                u.ground_speed_kts = *ground_speed_kts;
                u.track_deg = *track_deg;
                u.position = *position;
                u.on_ground = *on_ground;
            }
            SbsMessage::AirbornePosition {
                altitude_ft,
                position,
                alert,
                emergency,
                spi,
                on_ground,
            } => {
                u.altitude_ft = *altitude_ft;
                u.position = *position;
                u.alert = *alert;
                u.emergency = *emergency;
                u.spi = *spi;
                u.on_ground = *on_ground;
            }
            SbsMessage::AirborneVelocity {
                ground_speed_kts,
                track_deg,
                vertical_rate_fpm,
            } => {
                u.ground_speed_kts = *ground_speed_kts;
                u.track_deg = *track_deg;
                u.vertical_rate_fpm = *vertical_rate_fpm;
            }
            SbsMessage::SurveillanceAltitude {
                altitude_ft,
                alert,
                spi,
                on_ground,
            } => {
                u.altitude_ft = *altitude_ft;
                u.alert = *alert;
                u.spi = *spi;
                u.on_ground = *on_ground;
            }
            SbsMessage::SurveillanceId {
                altitude_ft,
                squawk,
                alert,
                emergency,
                spi,
                on_ground,
            } => {
                u.altitude_ft = *altitude_ft;
                u.squawk = squawk.clone();
                u.alert = *alert;
                u.emergency = *emergency;
                u.spi = *spi;
                u.on_ground = *on_ground;
            }
            SbsMessage::AirToAir {
                altitude_ft,
                on_ground,
            } => {
                u.altitude_ft = *altitude_ft;
                u.on_ground = *on_ground;
            }
            SbsMessage::AllCallReply { on_ground } => {
                u.on_ground = *on_ground;
            }
        }
        u
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icao_from_hex() {
        assert_eq!(icao_from_hex("A1B2C3"), Some([0xA1, 0xB2, 0xC3]));
        assert_eq!(icao_from_hex("a1b2c3"), Some([0xA1, 0xB2, 0xC3]));
        assert_eq!(icao_to_string(&[0xA1, 0xB2, 0xC3]), "A1B2C3");
    }

    #[test]
    fn test_icao_from_hex_rejects_bad_input() {
        assert_eq!(icao_from_hex("A1B2C"), None);
        assert_eq!(icao_from_hex("A1B2C3D"), None);
        assert_eq!(icao_from_hex("+1B2C3"), None);
        assert_eq!(icao_from_hex("ZZZZZZ"), None);
    }

    #[test]
    fn test_to_update_velocity_only_touches_velocity_fields() {
        let frame = SbsFrame {
            icao: [0x40, 0x62, 0x1D],
            message: SbsMessage::AirborneVelocity {
                ground_speed_kts: Some(450.0),
                track_deg: Some(270.0),
                vertical_rate_fpm: Some(-64),
            },
        };
        let u = frame.to_update();
        assert_eq!(u.transmission_type, 4);
        assert_eq!(u.ground_speed_kts, Some(450.0));
        assert_eq!(u.vertical_rate_fpm, Some(-64));
        assert!(u.callsign.is_none());
        assert!(u.position.is_none());
        assert!(u.altitude_ft.is_none());
    }

    #[test]
    fn test_transmission_type_numbers() {
        assert_eq!(
            SbsMessage::Identification { callsign: None }.transmission_type(),
            1
        );
        assert_eq!(SbsMessage::AllCallReply { on_ground: None }.transmission_type(), 8);
    }
}
