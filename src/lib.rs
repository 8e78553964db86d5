//! # Homewatch
//!
//! Home telemetry bridge. Subscribes to sensor and device topics on an MQTT
//! broker, stores every event, relays it live to WebSocket dashboards, and
//! sounds the buzzer when gas readings cross the configured thresholds.
//!
//! ## Modules
//!
//! - [`events`]: typed events decoded from inbound payloads
//! - [`automation`]: gas severity classification and alarm decisions
//! - [`bridge`]: MQTT session, topic dispatcher and command publisher
//! - [`websocket`]: broadcast hub and viewer connections
//! - [`persistence`]: best-effort event store
//! - [`api`]: HTTP surface with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Data flow
//!
//! ```text
//! device -> broker -> Dispatcher -> Pipeline -+-> PersistenceWorker -> EventStore
//!                                             +-> BroadcastHub -> viewers
//!                                             +-> AutomationEngine -> CommandPublisher -> broker
//! ```

pub mod api;
pub mod automation;
pub mod bridge;
pub mod config;
pub mod events;
pub mod persistence;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use automation::{
    classify, decide_alarm, AlarmAction, AlarmDecision, AlarmPolicy, AutomationEngine,
    AutomationError, Severity, Thresholds,
};

pub use bridge::{
    CommandPublisher, ControlTopics, Dispatcher, MqttSession, Pipeline, PublishError, TopicTable,
    Transport, TransportError,
};

pub use config::{Config, ConfigError, LoggingConfig};

pub use events::{
    ControlCommand, DecodeError, DeviceKind, DeviceStatus, DeviceStatusEvent, EventRecord,
    InboundEvent, SensorKind, TelemetrySample, TopicRoute,
};

pub use persistence::{
    DiscardStore, EventStore, PersistenceError, PersistenceStats, PersistenceWorker, SqliteStore,
};

pub use websocket::{BroadcastHub, HubConfig, HubError, HubHandle, ViewerEnvelope};
