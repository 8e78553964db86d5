//! Command Publisher
//!
//! Builds and publishes outbound control commands. Safety-relevant commands
//! (door, lamp, curtain, manual buzzer) return their error to the caller;
//! the automatic buzzer command is best-effort and only logs.

use rumqttc::QoS;
use std::sync::Arc;
use thiserror::Error;

use super::transport::{Transport, TransportError};
use crate::automation::AlarmAction;
use crate::events::ControlCommand;

/// `source` field for buzzer commands issued by the automation engine
pub const SOURCE_AUTO_ALERT: &str = "auto_alert";

/// `source` field for buzzer commands issued through the HTTP API
pub const SOURCE_MANUAL_API: &str = "manual_api";

/// Action sent with a curtain command that only sets a position
pub const CURTAIN_SET_ACTION: &str = "set";

/// Outbound control topics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTopics {
    pub door: String,
    pub lamp: String,
    pub curtain: String,
    pub buzzer: String,
}

impl ControlTopics {
    /// `{prefix}/{device}/control` for every controllable device
    pub fn from_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let topic = |device: &str| format!("{}/{}/control", prefix, device);
        Self {
            door: topic("door"),
            lamp: topic("lamp"),
            curtain: topic("curtain"),
            buzzer: topic("buzzer"),
        }
    }
}

/// Errors returned for caller-visible publishes
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish to '{topic}': {source}")]
    Transport {
        topic: String,
        #[source]
        source: TransportError,
    },
}

/// Publishes control commands to devices
///
/// Stateless: identical calls produce identical payloads and nothing is
/// deduplicated.
#[derive(Clone)]
pub struct CommandPublisher {
    transport: Arc<dyn Transport>,
    topics: Arc<ControlTopics>,
}

impl CommandPublisher {
    pub fn new(transport: Arc<dyn Transport>, topics: ControlTopics) -> Self {
        Self {
            transport,
            topics: Arc::new(topics),
        }
    }

    /// Lock or unlock the door
    pub async fn publish_door_control(&self, action: &str, method: &str) -> Result<(), PublishError> {
        let command = ControlCommand::new(&self.topics.door, action).method(method);
        self.send(&command, QoS::AtLeastOnce).await?;
        tracing::info!(action = %action, method = %method, "Door command sent");
        Ok(())
    }

    /// Switch the lamp
    pub async fn publish_lamp_control(&self, action: &str, mode: &str) -> Result<(), PublishError> {
        let command = ControlCommand::new(&self.topics.lamp, action).mode(mode);
        self.send(&command, QoS::AtLeastOnce).await?;
        tracing::info!(action = %action, mode = %mode, "Lamp command sent");
        Ok(())
    }

    /// Move the curtain to `position` percent open
    pub async fn publish_curtain_control(
        &self,
        position: i64,
        mode: &str,
        action: Option<&str>,
    ) -> Result<(), PublishError> {
        let command = ControlCommand::new(&self.topics.curtain, action.unwrap_or(CURTAIN_SET_ACTION))
            .mode(mode)
            .position(position);
        self.send(&command, QoS::AtLeastOnce).await?;
        tracing::info!(position, mode = %mode, "Curtain command sent");
        Ok(())
    }

    /// Automatic buzzer command from the gas automation
    ///
    /// Never fails; a lost `on` is logged at error level.
    pub async fn publish_buzzer_control(&self, action: AlarmAction) {
        let command = ControlCommand::new(&self.topics.buzzer, action.as_str()).source(SOURCE_AUTO_ALERT);

        match self.send(&command, QoS::AtMostOnce).await {
            Ok(()) => match action {
                AlarmAction::On => tracing::warn!("Gas danger detected, buzzer ON sent"),
                AlarmAction::Off => tracing::debug!("Buzzer OFF sent"),
            },
            Err(e) => match action {
                AlarmAction::On => {
                    tracing::error!(error = %e, "Failed to sound buzzer for gas alert")
                }
                AlarmAction::Off => tracing::warn!(error = %e, "Failed to silence buzzer"),
            },
        }
    }

    /// Buzzer command requested by a user
    pub async fn publish_buzzer_manual(&self, action: AlarmAction) -> Result<(), PublishError> {
        let command = ControlCommand::new(&self.topics.buzzer, action.as_str()).source(SOURCE_MANUAL_API);
        self.send(&command, QoS::AtLeastOnce).await?;
        tracing::info!(action = %action, "Manual buzzer command sent");
        Ok(())
    }

    async fn send(&self, command: &ControlCommand, qos: QoS) -> Result<(), PublishError> {
        let payload = command.to_payload()?;
        self.transport
            .publish(command.target_topic(), qos, payload)
            .await
            .map_err(|source| PublishError::Transport {
                topic: command.target_topic().to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::transport::memory::MemoryTransport;

    fn publisher() -> (CommandPublisher, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let publisher = CommandPublisher::new(
            transport.clone(),
            ControlTopics::from_prefix("iotcihuy/home"),
        );
        (publisher, transport)
    }

    #[test]
    fn test_control_topics() {
        let topics = ControlTopics::from_prefix("iotcihuy/home/");
        assert_eq!(topics.door, "iotcihuy/home/door/control");
        assert_eq!(topics.buzzer, "iotcihuy/home/buzzer/control");
    }

    #[tokio::test]
    async fn test_door_control_payload() {
        let (publisher, transport) = publisher();

        publisher.publish_door_control("unlock", "remote").await.unwrap();

        let sent = transport.published_to("iotcihuy/home/door/control");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload_str(), r#"{"action":"unlock","method":"remote"}"#);
        assert_eq!(sent[0].qos, QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn test_door_control_surfaces_transport_error() {
        let (publisher, transport) = publisher();
        transport.set_fail_publish(true);

        let result = publisher.publish_door_control("lock", "remote").await;
        assert!(matches!(result, Err(PublishError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_buzzer_control_payload() {
        let (publisher, transport) = publisher();

        publisher.publish_buzzer_control(AlarmAction::On).await;

        let sent = transport.published_to("iotcihuy/home/buzzer/control");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload_str(), r#"{"action":"on","source":"auto_alert"}"#);
        assert_eq!(sent[0].qos, QoS::AtMostOnce);
    }

    #[tokio::test]
    async fn test_buzzer_off_twice_is_identical() {
        let (publisher, transport) = publisher();

        publisher.publish_buzzer_control(AlarmAction::Off).await;
        publisher.publish_buzzer_control(AlarmAction::Off).await;

        let sent = transport.published();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn test_buzzer_control_swallows_errors() {
        let (publisher, transport) = publisher();
        transport.set_fail_publish(true);

        // Must not panic or propagate
        publisher.publish_buzzer_control(AlarmAction::On).await;
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_curtain_without_action_uses_set() {
        let (publisher, transport) = publisher();

        publisher.publish_curtain_control(75, "manual", None).await.unwrap();

        let sent = transport.published_to("iotcihuy/home/curtain/control");
        assert_eq!(
            sent[0].payload_str(),
            r#"{"action":"set","mode":"manual","position":75}"#
        );
    }

    #[tokio::test]
    async fn test_manual_buzzer_source() {
        let (publisher, transport) = publisher();

        publisher.publish_buzzer_manual(AlarmAction::Off).await.unwrap();

        let sent = transport.published();
        assert_eq!(sent[0].payload_str(), r#"{"action":"off","source":"manual_api"}"#);
    }
}
