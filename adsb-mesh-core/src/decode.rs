//! Decode SBS-1 (BaseStation) feed lines into typed aircraft messages.
//!
//! dump1090 emits one comma-separated record per line on port 30003:
//!
//! ```text
//! MSG,3,1,1,A1B2C3,1,2024/01/15,12:34:56.789,2024/01/15,12:34:56.789,,35000,,,37.0,-122.0,,,0,0,0,0
//! ```
//!
//! Field layout is positional and identical for every transmission type;
//! each type only fills in its own subset and leaves the rest blank.

use crate::types::{icao_from_hex, DecodeError, Position, SbsFrame, SbsMessage};

/// Number of comma-separated fields in every SBS-1 record.
pub const SBS_FIELD_COUNT: usize = 22;

// Field indices
const F_MESSAGE_TYPE: usize = 0;
const F_TRANSMISSION_TYPE: usize = 1;
const F_HEX_IDENT: usize = 4;
const F_CALLSIGN: usize = 10;
const F_ALTITUDE: usize = 11;
const F_GROUND_SPEED: usize = 12;
const F_TRACK: usize = 13;
const F_LAT: usize = 14;
const F_LON: usize = 15;
const F_VERTICAL_RATE: usize = 16;
const F_SQUAWK: usize = 17;
const F_ALERT: usize = 18;
const F_EMERGENCY: usize = 19;
const F_SPI: usize = 20;
const F_IS_ON_GROUND: usize = 21;

/// BaseStation record types other than `MSG`. Valid, but carry no telemetry.
const NON_MSG_RECORDS: &[&str] = &["SEL", "ID", "AIR", "STA", "CLK"];

/// Decode one feed line. Trailing CR/LF is ignored.
pub fn decode_line(line: &str) -> Result<SbsFrame, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(',').collect();

    let record = fields[F_MESSAGE_TYPE].trim();
    if record != "MSG" {
        return Err(DecodeError::UnsupportedRecord(record.to_string()));
    }
    if fields.len() != SBS_FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            expected: SBS_FIELD_COUNT,
            actual: fields.len(),
        });
    }

    let ident = field(&fields, F_HEX_IDENT).ok_or(DecodeError::MissingIdent)?;
    let icao = icao_from_hex(ident).ok_or_else(|| DecodeError::InvalidIdent(ident.to_string()))?;

    let tt = fields[F_TRANSMISSION_TYPE].trim();
    let message = match tt {
        "1" => SbsMessage::Identification {
            callsign: callsign(&fields),
        },
        "2" => SbsMessage::SurfacePosition {
            altitude_ft: parse_num(&fields, F_ALTITUDE, "altitude")?,
            ground_speed_kts: parse_num(&fields, F_GROUND_SPEED, "ground speed")?,
            track_deg: parse_num(&fields, F_TRACK, "track")?,
            position: position(&fields)?,
            on_ground: parse_flag(&fields, F_IS_ON_GROUND, "is_on_ground")?,
        },
        "3" => SbsMessage::AirbornePosition {
            altitude_ft: parse_num(&fields, F_ALTITUDE, "altitude")?,
            position: position(&fields)?,
            alert: parse_flag(&fields, F_ALERT, "alert")?,
            emergency: parse_flag(&fields, F_EMERGENCY, "emergency")?,
            spi: parse_flag(&fields, F_SPI, "spi")?,
            on_ground: parse_flag(&fields, F_IS_ON_GROUND, "is_on_ground")?,
        },
        "4" => SbsMessage::AirborneVelocity {
            ground_speed_kts: parse_num(&fields, F_GROUND_SPEED, "ground speed")?,
            track_deg: parse_num(&fields, F_TRACK, "track")?,
            vertical_rate_fpm: parse_num(&fields, F_VERTICAL_RATE, "vertical rate")?,
        },
        "5" => SbsMessage::SurveillanceAltitude {
            altitude_ft: parse_num(&fields, F_ALTITUDE, "altitude")?,
            alert: parse_flag(&fields, F_ALERT, "alert")?,
            spi: parse_flag(&fields, F_SPI, "spi")?,
            on_ground: parse_flag(&fields, F_IS_ON_GROUND, "is_on_ground")?,
        },
        "6" => SbsMessage::SurveillanceId {
            altitude_ft: parse_num(&fields, F_ALTITUDE, "altitude")?,
            squawk: squawk(&fields)?,
            alert: parse_flag(&fields, F_ALERT, "alert")?,
            emergency: parse_flag(&fields, F_EMERGENCY, "emergency")?,
            spi: parse_flag(&fields, F_SPI, "spi")?,
            on_ground: parse_flag(&fields, F_IS_ON_GROUND, "is_on_ground")?,
        },
        "7" => SbsMessage::AirToAir {
            altitude_ft: parse_num(&fields, F_ALTITUDE, "altitude")?,
            on_ground: parse_flag(&fields, F_IS_ON_GROUND, "is_on_ground")?,
        },
        "8" => SbsMessage::AllCallReply {
            on_ground: parse_flag(&fields, F_IS_ON_GROUND, "is_on_ground")?,
        },
        other => return Err(DecodeError::UnknownTransmissionType(other.to_string())),
    };

    Ok(SbsFrame { icao, message })
}

/// True if the record type is a known BaseStation type we deliberately skip.
pub fn is_ignorable(err: &DecodeError) -> bool {
    matches!(err, DecodeError::UnsupportedRecord(r) if NON_MSG_RECORDS.contains(&r.as_str()))
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Trimmed field value, or `None` if blank.
fn field<'a>(fields: &[&'a str], idx: usize) -> Option<&'a str> {
    let v = fields[idx].trim();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn parse_num<T: std::str::FromStr>(
    fields: &[&str],
    idx: usize,
    name: &'static str,
) -> Result<Option<T>, DecodeError> {
    match field(fields, idx) {
        None => Ok(None),
        Some(v) => v.parse::<T>().map(Some).map_err(|_| DecodeError::InvalidField {
            field: name,
            value: v.to_string(),
        }),
    }
}

/// SBS flags are `0` for false and `-1` (occasionally `1`) for true.
fn parse_flag(
    fields: &[&str],
    idx: usize,
    name: &'static str,
) -> Result<Option<bool>, DecodeError> {
    Ok(parse_num::<i32>(fields, idx, name)?.map(|v| v != 0))
}

fn callsign(fields: &[&str]) -> Option<String> {
    field(fields, F_CALLSIGN).map(str::to_string)
}

fn squawk(fields: &[&str]) -> Result<Option<String>, DecodeError> {
    match field(fields, F_SQUAWK) {
        None => Ok(None),
        Some(v) if v.len() == 4 && v.bytes().all(|b| (b'0'..=b'7').contains(&b)) => {
            Ok(Some(v.to_string()))
        }
        Some(v) => Err(DecodeError::InvalidField {
            field: "squawk",
            value: v.to_string(),
        }),
    }
}

/// Both coordinates or nothing. A lone coordinate is dropped.
fn position(fields: &[&str]) -> Result<Option<Position>, DecodeError> {
    let lat: Option<f64> = parse_num(fields, F_LAT, "lat")?;
    let lon: Option<f64> = parse_num(fields, F_LON, "lon")?;

    if let Some(v) = lat {
        if !v.is_finite() || !(-90.0..=90.0).contains(&v) {
            return Err(DecodeError::InvalidField {
                field: "lat",
                value: v.to_string(),
            });
        }
    }
    if let Some(v) = lon {
        if !v.is_finite() || !(-180.0..=180.0).contains(&v) {
            return Err(DecodeError::InvalidField {
                field: "lon",
                value: v.to_string(),
            });
        }
    }

    Ok(match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Position { lat, lon }),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ID_LINE: &str =
        "MSG,1,1,1,A1B2C3,1,2024/01/15,12:34:56.789,2024/01/15,12:34:56.789,UAL123  ,,,,,,,,,,,0";
    const POS_LINE: &str =
        "MSG,3,1,1,A1B2C3,1,2024/01/15,12:34:57.001,2024/01/15,12:34:57.001,,35000,,,37.0,-122.0,,,0,0,0,0";
    const VEL_LINE: &str =
        "MSG,4,1,1,A1B2C3,1,2024/01/15,12:34:58.000,2024/01/15,12:34:58.000,,,451,270.5,,,-64,,0,0,0,0";

    #[test]
    fn test_identification() {
        let frame = decode_line(ID_LINE).unwrap();
        assert_eq!(frame.icao, [0xA1, 0xB2, 0xC3]);
        assert_eq!(
            frame.message,
            SbsMessage::Identification {
                callsign: Some("UAL123".into())
            }
        );
    }

    #[test]
    fn test_airborne_position() {
        let frame = decode_line(POS_LINE).unwrap();
        match frame.message {
            SbsMessage::AirbornePosition {
                altitude_ft,
                position,
                alert,
                on_ground,
                ..
            } => {
                assert_eq!(altitude_ft, Some(35000));
                assert_eq!(
                    position,
                    Some(Position {
                        lat: 37.0,
                        lon: -122.0
                    })
                );
                assert_eq!(alert, Some(false));
                assert_eq!(on_ground, Some(false));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_airborne_velocity() {
        let frame = decode_line(VEL_LINE).unwrap();
        assert_eq!(
            frame.message,
            SbsMessage::AirborneVelocity {
                ground_speed_kts: Some(451.0),
                track_deg: Some(270.5),
                vertical_rate_fpm: Some(-64),
            }
        );
    }

    #[test]
    fn test_squawk_and_true_flags() {
        let line = "MSG,6,1,1,A1B2C3,1,,,,,,12000,,,,,,7700,-1,-1,0,0";
        let frame = decode_line(line).unwrap();
        match frame.message {
            SbsMessage::SurveillanceId {
                squawk,
                alert,
                emergency,
                spi,
                ..
            } => {
                assert_eq!(squawk.as_deref(), Some("7700"));
                assert_eq!(alert, Some(true));
                assert_eq!(emergency, Some(true));
                assert_eq!(spi, Some(false));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_all_transmission_types_decode() {
        for tt in 1..=8 {
            let line = format!("MSG,{tt},1,1,ABCDEF,1,,,,,,,,,,,,,,,,");
            let frame = decode_line(&line).unwrap();
            assert_eq!(frame.message.transmission_type(), tt);
        }
    }

    #[test]
    fn test_blank_fields_are_absent_not_zero() {
        let line = "MSG,3,1,1,A1B2C3,1,,,,,,,,,,,,,,,,";
        let frame = decode_line(line).unwrap();
        let u = frame.to_update();
        assert!(u.altitude_ft.is_none());
        assert!(u.position.is_none());
        assert!(u.alert.is_none());
    }

    #[test]
    fn test_crlf_stripped() {
        let line = format!("{POS_LINE}\r\n");
        assert!(decode_line(&line).is_ok());
    }

    #[test]
    fn test_wrong_field_count() {
        let err = decode_line("MSG,3,1,1,A1B2C3,1,,,,,,35000").unwrap_err();
        assert_eq!(
            err,
            DecodeError::FieldCount {
                expected: 22,
                actual: 12
            }
        );
    }

    #[test]
    fn test_non_numeric_latitude() {
        let line = "MSG,3,1,1,A1B2C3,1,,,,,,35000,,,abc,-122.0,,,0,0,0,0";
        let err = decode_line(line).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "lat", .. }));
    }

    #[test]
    fn test_latitude_out_of_range() {
        let line = "MSG,3,1,1,A1B2C3,1,,,,,,35000,,,91.0,-122.0,,,0,0,0,0";
        assert!(decode_line(line).is_err());
    }

    #[test]
    fn test_lone_coordinate_dropped() {
        let line = "MSG,3,1,1,A1B2C3,1,,,,,,35000,,,37.0,,,,0,0,0,0";
        let u = decode_line(line).unwrap().to_update();
        assert!(u.position.is_none());
        assert_eq!(u.altitude_ft, Some(35000));
    }

    #[test]
    fn test_missing_ident() {
        let line = "MSG,3,1,1,,1,,,,,,35000,,,37.0,-122.0,,,0,0,0,0";
        assert_eq!(decode_line(line).unwrap_err(), DecodeError::MissingIdent);
    }

    #[test]
    fn test_invalid_ident() {
        let line = "MSG,3,1,1,~1B2C3,1,,,,,,35000,,,37.0,-122.0,,,0,0,0,0";
        assert!(matches!(
            decode_line(line).unwrap_err(),
            DecodeError::InvalidIdent(_)
        ));
    }

    #[test]
    fn test_unknown_transmission_type() {
        let line = "MSG,9,1,1,A1B2C3,1,,,,,,,,,,,,,,,,";
        assert!(matches!(
            decode_line(line).unwrap_err(),
            DecodeError::UnknownTransmissionType(_)
        ));
    }

    #[test]
    fn test_non_msg_records_ignorable() {
        let err = decode_line("STA,,5,179,400AE7,10103,2008/11/28,14:58:51.153,2008/11/28,14:58:51.153,RM").unwrap_err();
        assert!(is_ignorable(&err));

        let err = decode_line("garbage").unwrap_err();
        assert!(!is_ignorable(&err));
        assert!(decode_line("").is_err());
    }

    #[test]
    fn test_bad_squawk() {
        let line = "MSG,6,1,1,A1B2C3,1,,,,,,,,,,,,77A0,0,0,0,0";
        assert!(decode_line(line).is_err());
    }

    #[test]
    fn test_fields_outside_schema_ignored() {
        // Velocity line that also carries a callsign and position: only velocity is used
        let line = "MSG,4,1,1,A1B2C3,1,,,,,UAL123,35000,451,270,37.0,-122.0,-64,,0,0,0,0";
        let u = decode_line(line).unwrap().to_update();
        assert!(u.callsign.is_none());
        assert!(u.position.is_none());
        assert!(u.altitude_ft.is_none());
        assert_eq!(u.ground_speed_kts, Some(451.0));
    }

    #[test]
    fn test_decode_error_propagates_through_question_mark() {
        fn callsign_of(line: &str) -> Result<Option<String>, DecodeError> {
            match decode_line(line)?.message {
                SbsMessage::Identification { callsign } => Ok(callsign),
                _ => Ok(None),
            }
        }

        assert_eq!(callsign_of(ID_LINE), Ok(Some("UAL123".to_string())));
        assert_eq!(callsign_of(POS_LINE), Ok(None));
        assert_eq!(
            callsign_of("MSG,1,1,1,,1,,,,,UAL123,,,,,,,,,,,0"),
            Err(DecodeError::MissingIdent)
        );
    }
}
