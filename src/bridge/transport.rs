//! Message transport
//!
//! The seam between the bridge and the MQTT client. Production code uses
//! `rumqttc::AsyncClient`; tests use an in-memory recorder.

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use thiserror::Error;

/// Errors raised by the message transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Publish/subscribe operations the bridge needs
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>)
        -> Result<(), TransportError>;
}

/// Requests are queued to the rumqttc event loop; a returned `Ok` means the
/// request was handed off, not that the broker acknowledged it.
#[async_trait]
impl Transport for AsyncClient {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        AsyncClient::subscribe(self, topic, qos).await?;
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        AsyncClient::publish(self, topic, qos, false, payload).await?;
        Ok(())
    }
}
