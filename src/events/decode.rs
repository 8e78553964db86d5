//! Payload decoding
//!
//! Each inbound topic carries a flat JSON object. The route decides which
//! schema applies; anything that does not match is a `DecodeError` and the
//! message is dropped by the caller.

use serde::Deserialize;
use thiserror::Error;

use super::normalize::normalize_door_method;
use super::types::{
    DeviceKind, DeviceStatus, DeviceStatusEvent, InboundEvent, SensorKind, TelemetrySample,
};

/// Which schema a topic's payload follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicRoute {
    Sensor(SensorKind),
    Device(DeviceKind),
}

/// Errors raised while decoding an inbound payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

#[derive(Deserialize)]
struct TemperaturePayload {
    temperature: f64,
}

#[derive(Deserialize)]
struct HumidityPayload {
    humidity: f64,
}

#[derive(Deserialize)]
struct GasPayload {
    ppm: i64,
}

#[derive(Deserialize)]
struct LightPayload {
    lux: i64,
}

#[derive(Deserialize)]
struct DoorPayload {
    status: String,
    #[serde(default)]
    method: String,
}

#[derive(Deserialize)]
struct LampPayload {
    status: String,
    #[serde(default)]
    mode: String,
}

#[derive(Deserialize)]
struct CurtainPayload {
    position: i64,
    #[serde(default)]
    mode: String,
}

/// Decode a payload according to its topic route
pub fn decode(route: TopicRoute, payload: &[u8]) -> Result<InboundEvent, DecodeError> {
    match route {
        TopicRoute::Sensor(kind) => decode_sensor(kind, payload).map(InboundEvent::Telemetry),
        TopicRoute::Device(kind) => decode_device(kind, payload).map(InboundEvent::Device),
    }
}

fn decode_sensor(kind: SensorKind, payload: &[u8]) -> Result<TelemetrySample, DecodeError> {
    let value = match kind {
        SensorKind::Temperature => {
            let p: TemperaturePayload = serde_json::from_slice(payload)?;
            p.temperature
        }
        SensorKind::Humidity => {
            let p: HumidityPayload = serde_json::from_slice(payload)?;
            if !(0.0..=100.0).contains(&p.humidity) {
                return Err(DecodeError::InvalidField {
                    field: "humidity",
                    reason: format!("{} is outside 0-100", p.humidity),
                });
            }
            p.humidity
        }
        SensorKind::Gas => {
            let p: GasPayload = serde_json::from_slice(payload)?;
            non_negative("ppm", p.ppm)? as f64
        }
        SensorKind::Light => {
            let p: LightPayload = serde_json::from_slice(payload)?;
            non_negative("lux", p.lux)? as f64
        }
    };

    Ok(TelemetrySample::new(kind, value))
}

fn decode_device(kind: DeviceKind, payload: &[u8]) -> Result<DeviceStatusEvent, DecodeError> {
    let status = match kind {
        DeviceKind::Door => {
            let p: DoorPayload = serde_json::from_slice(payload)?;
            DeviceStatus::Door {
                status: non_empty("status", p.status)?,
                method: normalize_door_method(&p.method).to_string(),
            }
        }
        DeviceKind::Lamp => {
            let p: LampPayload = serde_json::from_slice(payload)?;
            DeviceStatus::Lamp {
                status: non_empty("status", p.status)?,
                mode: p.mode,
            }
        }
        DeviceKind::Curtain => {
            let p: CurtainPayload = serde_json::from_slice(payload)?;
            DeviceStatus::Curtain {
                position: non_negative("position", p.position)?,
                mode: p.mode,
            }
        }
    };

    Ok(DeviceStatusEvent::new(status))
}

fn non_negative(field: &'static str, value: i64) -> Result<i64, DecodeError> {
    if value < 0 {
        return Err(DecodeError::InvalidField {
            field,
            reason: format!("{} is negative", value),
        });
    }
    Ok(value)
}

fn non_empty(field: &'static str, value: String) -> Result<String, DecodeError> {
    if value.trim().is_empty() {
        return Err(DecodeError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_gas() {
        let event = decode(TopicRoute::Sensor(SensorKind::Gas), br#"{"ppm": 650, "unit": "ppm"}"#)
            .unwrap();
        assert_eq!(event.gas_ppm(), Some(650));
    }

    #[test]
    fn test_decode_temperature() {
        let event = decode(
            TopicRoute::Sensor(SensorKind::Temperature),
            br#"{"temperature": 25.3}"#,
        )
        .unwrap();
        match event {
            InboundEvent::Telemetry(sample) => {
                assert_eq!(sample.kind(), SensorKind::Temperature);
                assert_eq!(sample.value(), 25.3);
            }
            _ => panic!("Expected Telemetry"),
        }
    }

    #[test]
    fn test_decode_door_normalizes_method() {
        let event = decode(
            TopicRoute::Device(DeviceKind::Door),
            br#"{"status":"locked","method":"keypad"}"#,
        )
        .unwrap();
        match event {
            InboundEvent::Device(event) => assert_eq!(
                event.status(),
                &DeviceStatus::Door {
                    status: "locked".to_string(),
                    method: "pin".to_string(),
                }
            ),
            _ => panic!("Expected Device"),
        }
    }

    #[test]
    fn test_decode_curtain() {
        let event = decode(
            TopicRoute::Device(DeviceKind::Curtain),
            br#"{"position": 40, "mode": "auto"}"#,
        )
        .unwrap();
        match event {
            InboundEvent::Device(event) => {
                assert_eq!(event.kind(), DeviceKind::Curtain);
            }
            _ => panic!("Expected Device"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = decode(TopicRoute::Sensor(SensorKind::Gas), b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_wrong_schema() {
        // A temperature payload on the gas topic
        let err = decode(
            TopicRoute::Sensor(SensorKind::Gas),
            br#"{"temperature": 21.0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_negative_ppm() {
        let err = decode(TopicRoute::Sensor(SensorKind::Gas), br#"{"ppm": -5}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "ppm", .. }));
    }

    #[test]
    fn test_decode_rejects_empty_status() {
        let err = decode(
            TopicRoute::Device(DeviceKind::Lamp),
            br#"{"status": "", "mode": "manual"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "status", .. }));
    }
}
