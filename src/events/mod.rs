//! Device Events
//!
//! Typed events decoded from inbound MQTT payloads.
//!
//! - [`types`]: telemetry samples, device status events, persistence records
//!   and outbound control commands
//! - [`decode`]: per-topic payload schemas
//! - [`normalize`]: door method alias table

pub mod decode;
pub mod normalize;
pub mod types;

pub use decode::{decode, DecodeError, TopicRoute};
pub use normalize::{normalize_door_method, DOOR_METHOD_ALIASES};
pub use types::{
    ControlCommand, DeviceKind, DeviceStatus, DeviceStatusEvent, EventRecord, InboundEvent,
    SensorKind, TelemetrySample,
};
