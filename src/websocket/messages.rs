//! Viewer message types
//!
//! JSON envelopes pushed to dashboard viewers. Viewers never send
//! application messages back; only control and close frames are read.

use serde::Serialize;

use crate::automation::Severity;
use crate::events::{DeviceKind, DeviceStatus, InboundEvent, SensorKind};

/// Messages sent from the bridge to viewers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerEnvelope {
    /// A new sensor reading
    SensorUpdate {
        sensor: SensorKind,
        value: f64,
        /// Gas readings only
        #[serde(skip_serializing_if = "Option::is_none")]
        severity: Option<Severity>,
        /// Capture time in milliseconds
        timestamp: i64,
    },
    /// A device reported a new status
    DeviceUpdate {
        device: DeviceKind,
        /// Door only
        #[serde(skip_serializing_if = "Option::is_none")]
        locked: Option<bool>,
        /// Door only
        #[serde(skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        /// Lamp only
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<bool>,
        /// Curtain only
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
        timestamp: i64,
    },
}

impl ViewerEnvelope {
    /// Build the envelope for a decoded event
    pub fn from_event(event: &InboundEvent, severity: Option<Severity>) -> Self {
        let timestamp = event.captured_at().timestamp_millis();

        match event {
            InboundEvent::Telemetry(sample) => ViewerEnvelope::SensorUpdate {
                sensor: sample.kind(),
                value: sample.value(),
                severity,
                timestamp,
            },
            InboundEvent::Device(device) => {
                let mut envelope = DeviceFields::default();
                match device.status() {
                    DeviceStatus::Door { status, method } => {
                        envelope.locked = Some(status == "locked");
                        envelope.method = Some(method.clone());
                    }
                    DeviceStatus::Lamp { status, mode } => {
                        envelope.state = Some(status == "on");
                        envelope.mode = Some(mode.clone());
                    }
                    DeviceStatus::Curtain { position, mode } => {
                        envelope.position = Some(*position);
                        envelope.mode = Some(mode.clone());
                    }
                }
                ViewerEnvelope::DeviceUpdate {
                    device: device.kind(),
                    locked: envelope.locked,
                    method: envelope.method,
                    state: envelope.state,
                    position: envelope.position,
                    mode: envelope.mode,
                    timestamp,
                }
            }
        }
    }

    /// Serialize to the bytes handed to the hub
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[derive(Default)]
struct DeviceFields {
    locked: Option<bool>,
    method: Option<String>,
    state: Option<bool>,
    position: Option<i64>,
    mode: Option<String>,
}
