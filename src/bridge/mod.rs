//! MQTT Bridge
//!
//! Everything between the broker and the rest of the system:
//!
//! - [`transport`]: the publish/subscribe seam over `rumqttc`
//! - [`dispatcher`]: inbound topic table and the per-topic pipeline
//! - [`publisher`]: outbound control commands
//! - [`session`]: event loop, reconnects and re-subscription

pub mod dispatcher;
pub mod publisher;
pub mod session;
pub mod transport;

pub use dispatcher::{subscribe_all, Dispatcher, Pipeline, Processed, SubscribeReport, Subscription, TopicTable};
pub use publisher::{CommandPublisher, ControlTopics, PublishError};
pub use session::{connect, MqttSession};
pub use transport::{Transport, TransportError};
