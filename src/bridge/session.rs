//! MQTT session
//!
//! Owns the rumqttc event loop. Inbound publishes go straight to the
//! dispatcher; connection errors are retried with exponential backoff and
//! the topic table is re-issued whenever the broker reports a fresh session.

use rumqttc::{AsyncClient, ConnAck, Event, EventLoop, MqttOptions, Packet, SubAck, SubscribeReasonCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::dispatcher::{subscribe_all, Dispatcher, SubscribeReport, TopicTable};
use super::transport::Transport;
use crate::config::MqttConfig;

/// First retry delay after a connection error
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Retry delays never grow past this
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Client id used when none is configured
pub fn default_client_id() -> String {
    format!("homewatch_{}", Uuid::new_v4().simple())
}

/// Build the MQTT options for `config`
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let client_id = config
        .client_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(default_client_id);

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keepalive_secs));
    options.set_clean_session(config.clean_session);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }

    options
}

/// Create the client and its (not yet polled) event loop
pub fn connect(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    AsyncClient::new(mqtt_options(config), config.request_capacity.max(1))
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Reconnect bookkeeping carried across event-loop iterations
#[derive(Debug)]
struct Reconnect {
    backoff: Duration,
    connected_before: bool,
}

impl Reconnect {
    fn new() -> Self {
        Self {
            backoff: INITIAL_BACKOFF,
            connected_before: false,
        }
    }

    /// Returns whether this was a reconnect
    fn connected(&mut self) -> bool {
        self.backoff = INITIAL_BACKOFF;
        std::mem::replace(&mut self.connected_before, true)
    }

    /// Delay before the next attempt
    fn failed(&mut self) -> Duration {
        let delay = self.backoff;
        self.backoff = next_backoff(delay);
        delay
    }
}

/// Re-issue the topic table unless the broker kept the session
///
/// Subscribing waits on the request channel that the event loop drains, so
/// it runs in its own task.
fn resubscribe(
    transport: Arc<dyn Transport>,
    table: &TopicTable,
    ack: &ConnAck,
) -> Option<JoinHandle<SubscribeReport>> {
    if ack.session_present {
        return None;
    }

    let table = table.clone();
    Some(tokio::spawn(async move {
        let report = subscribe_all(transport.as_ref(), &table).await;
        if !report.is_complete() {
            tracing::warn!(failed = ?report.failed, "Some topics could not be subscribed");
        }
        report
    }))
}

/// A connected bridge session
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    table: TopicTable,
    dispatcher: Dispatcher,
}

impl MqttSession {
    pub fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        table: TopicTable,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            client,
            eventloop,
            table,
            dispatcher,
        }
    }

    /// Poll the event loop until `shutdown` flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let transport: Arc<dyn Transport> = Arc::new(self.client.clone());
        let mut reconnect = Reconnect::new();

        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.dispatcher
                        .dispatch(&publish.topic, publish.payload.to_vec());
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    let is_reconnect = reconnect.connected();
                    tracing::info!(
                        session_present = ack.session_present,
                        reconnect = is_reconnect,
                        "Connected to MQTT broker"
                    );
                    resubscribe(transport.clone(), &self.table, &ack);
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => log_suback(&ack),
                Ok(_) => {}
                Err(e) => {
                    let delay = reconnect.failed();
                    tracing::warn!(error = %e, retry_in = ?delay, "MQTT connection error");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "MQTT disconnect request failed");
        }
        tracing::info!("MQTT session stopped");
    }
}

fn log_suback(ack: &SubAck) {
    for (index, code) in ack.return_codes.iter().enumerate() {
        if matches!(code, SubscribeReasonCode::Failure) {
            tracing::error!(pkid = ack.pkid, index, "Broker rejected subscription");
        }
    }
}
