//! Event types
//!
//! Core data structures produced by decoding device payloads and consumed by
//! the persistence worker and the broadcast hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::automation::Severity;

/// Kind of environmental sensor reporting a numeric reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Gas,
    Light,
}

impl SensorKind {
    /// All sensor kinds, in subscription order
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Gas,
        SensorKind::Light,
    ];

    /// Lowercase name, also used as the topic segment
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Gas => "gas",
            SensorKind::Light => "light",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of actuated device reporting its status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Door,
    Lamp,
    Curtain,
}

impl DeviceKind {
    /// All device kinds, in subscription order
    pub const ALL: [DeviceKind; 3] = [DeviceKind::Door, DeviceKind::Lamp, DeviceKind::Curtain];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Door => "door",
            DeviceKind::Lamp => "lamp",
            DeviceKind::Curtain => "curtain",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sensor reading
///
/// Fields are private so a sample cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    kind: SensorKind,
    value: f64,
    captured_at: DateTime<Utc>,
}

impl TelemetrySample {
    /// Create a sample captured now
    pub fn new(kind: SensorKind, value: f64) -> Self {
        Self::with_timestamp(kind, value, Utc::now())
    }

    /// Create a sample with an explicit capture time
    pub fn with_timestamp(kind: SensorKind, value: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            value,
            captured_at,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Gas concentration in ppm, `None` for any other sensor kind
    pub fn as_ppm(&self) -> Option<i64> {
        match self.kind {
            SensorKind::Gas => Some(self.value.round() as i64),
            _ => None,
        }
    }
}

/// Device-specific status fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "device", rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Door lock state and the method that produced it (already normalized)
    Door { status: String, method: String },
    /// Lamp power state and control mode
    Lamp { status: String, mode: String },
    /// Curtain position (percent open) and control mode
    Curtain { position: i64, mode: String },
}

impl DeviceStatus {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceStatus::Door { .. } => DeviceKind::Door,
            DeviceStatus::Lamp { .. } => DeviceKind::Lamp,
            DeviceStatus::Curtain { .. } => DeviceKind::Curtain,
        }
    }
}

/// A device status report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatusEvent {
    status: DeviceStatus,
    captured_at: DateTime<Utc>,
}

impl DeviceStatusEvent {
    pub fn new(status: DeviceStatus) -> Self {
        Self::with_timestamp(status, Utc::now())
    }

    pub fn with_timestamp(status: DeviceStatus, captured_at: DateTime<Utc>) -> Self {
        Self {
            status,
            captured_at,
        }
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn kind(&self) -> DeviceKind {
        self.status.kind()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// A successfully decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Telemetry(TelemetrySample),
    Device(DeviceStatusEvent),
}

impl InboundEvent {
    /// Gas concentration if this is a gas reading
    pub fn gas_ppm(&self) -> Option<i64> {
        match self {
            InboundEvent::Telemetry(sample) => sample.as_ppm(),
            InboundEvent::Device(_) => None,
        }
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        match self {
            InboundEvent::Telemetry(sample) => sample.captured_at(),
            InboundEvent::Device(event) => event.captured_at(),
        }
    }
}

/// What the persistence collaborator receives for every decoded event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Telemetry {
        sample: TelemetrySample,
        /// Set for gas readings only
        severity: Option<Severity>,
    },
    Device(DeviceStatusEvent),
}

impl EventRecord {
    /// Build the record for a decoded event
    pub fn from_event(event: &InboundEvent, severity: Option<Severity>) -> Self {
        match event {
            InboundEvent::Telemetry(sample) => EventRecord::Telemetry {
                sample: sample.clone(),
                severity,
            },
            InboundEvent::Device(event) => EventRecord::Device(event.clone()),
        }
    }

    /// Short label for log lines
    pub fn label(&self) -> &'static str {
        match self {
            EventRecord::Telemetry { sample, .. } => sample.kind().as_str(),
            EventRecord::Device(event) => event.kind().as_str(),
        }
    }
}

/// An outbound control message
///
/// Only `action` and the auxiliary fields that are set end up in the
/// payload, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlCommand {
    #[serde(skip)]
    target_topic: String,
    action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl ControlCommand {
    pub fn new(target_topic: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target_topic: target_topic.into(),
            action: action.into(),
            method: None,
            mode: None,
            position: None,
            source: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn target_topic(&self) -> &str {
        &self.target_topic
    }

    /// Serialize the wire payload
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_sample_ppm() {
        let sample = TelemetrySample::new(SensorKind::Gas, 650.0);
        assert_eq!(sample.as_ppm(), Some(650));

        let sample = TelemetrySample::new(SensorKind::Temperature, 25.3);
        assert_eq!(sample.as_ppm(), None);
    }

    #[test]
    fn test_control_command_payload_skips_unset_fields() {
        let cmd = ControlCommand::new("home/buzzer/control", "on").source("auto_alert");
        let payload = String::from_utf8(cmd.to_payload().unwrap()).unwrap();
        assert_eq!(payload, r#"{"action":"on","source":"auto_alert"}"#);
        assert_eq!(cmd.target_topic(), "home/buzzer/control");
    }

    #[test]
    fn test_control_command_field_order() {
        let cmd = ControlCommand::new("home/curtain/control", "open")
            .mode("manual")
            .position(100);
        let payload = String::from_utf8(cmd.to_payload().unwrap()).unwrap();
        assert_eq!(payload, r#"{"action":"open","mode":"manual","position":100}"#);
    }

    #[test]
    fn test_record_label() {
        let event = InboundEvent::Device(DeviceStatusEvent::new(DeviceStatus::Lamp {
            status: "on".to_string(),
            mode: "auto".to_string(),
        }));
        let record = EventRecord::from_event(&event, None);
        assert_eq!(record.label(), "lamp");
    }
}
