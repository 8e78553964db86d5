//! Topic Dispatcher
//!
//! Binds the fixed inbound topic table and runs every message through one
//! pipeline: decode, persist, broadcast, and for gas readings automate.
//!
//! Each topic has its own lane, a task fed by a bounded queue. Messages on
//! one topic are handled in delivery order; different topics never wait on
//! each other.

use rumqttc::QoS;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::publisher::CommandPublisher;
use super::transport::Transport;
use crate::automation::{AlarmDecision, AutomationEngine, Severity};
use crate::events::{decode, DecodeError, DeviceKind, EventRecord, SensorKind, TopicRoute};
use crate::persistence::PersistenceWorker;
use crate::websocket::{HubHandle, ViewerEnvelope};

/// QoS requested for every inbound subscription
pub const SUBSCRIBE_QOS: QoS = QoS::AtLeastOnce;

/// One inbound topic and the schema its payloads follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub route: TopicRoute,
}

/// The fixed set of inbound subscriptions
#[derive(Debug, Clone)]
pub struct TopicTable {
    subscriptions: Vec<Subscription>,
}

impl TopicTable {
    /// Sensor topics are `{prefix}/{sensor}`; device status topics are
    /// `{prefix}/{device}/status`
    pub fn from_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');

        let sensors = SensorKind::ALL.into_iter().map(|kind| Subscription {
            topic: format!("{}/{}", prefix, kind),
            route: TopicRoute::Sensor(kind),
        });
        let devices = DeviceKind::ALL.into_iter().map(|kind| Subscription {
            topic: format!("{}/{}/status", prefix, kind),
            route: TopicRoute::Device(kind),
        });

        Self {
            subscriptions: sensors.chain(devices).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    pub fn route_for(&self, topic: &str) -> Option<TopicRoute> {
        self.subscriptions
            .iter()
            .find(|s| s.topic == topic)
            .map(|s| s.route)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// Outcome of binding the topic table
#[derive(Debug, Default, Clone)]
pub struct SubscribeReport {
    pub bound: Vec<String>,
    pub failed: Vec<String>,
}

impl SubscribeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Subscribe to every topic in the table
///
/// Each topic is bound on its own; a failure is logged and the rest are
/// still attempted.
pub async fn subscribe_all(transport: &dyn Transport, table: &TopicTable) -> SubscribeReport {
    let mut report = SubscribeReport::default();

    for subscription in table.iter() {
        match transport.subscribe(&subscription.topic, SUBSCRIBE_QOS).await {
            Ok(()) => {
                tracing::debug!(topic = %subscription.topic, "Subscribed");
                report.bound.push(subscription.topic.clone());
            }
            Err(e) => {
                tracing::error!(topic = %subscription.topic, error = %e, "Failed to subscribe");
                report.failed.push(subscription.topic.clone());
            }
        }
    }

    tracing::info!(
        bound = report.bound.len(),
        failed = report.failed.len(),
        "Topic subscriptions issued"
    );
    report
}

/// What happened to one decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub severity: Option<Severity>,
    /// Set for gas readings
    pub alarm: Option<AlarmDecision>,
    /// False if the persistence queue dropped the record
    pub persisted: bool,
}

/// The decode, persist, broadcast, automate sequence shared by every topic
pub struct Pipeline {
    hub: HubHandle,
    persistence: PersistenceWorker,
    publisher: CommandPublisher,
    automation: AutomationEngine,
}

impl Pipeline {
    pub fn new(
        hub: HubHandle,
        persistence: PersistenceWorker,
        publisher: CommandPublisher,
        automation: AutomationEngine,
    ) -> Self {
        Self {
            hub,
            persistence,
            publisher,
            automation,
        }
    }

    /// Handle one inbound payload
    ///
    /// Only decoding can fail. Persistence and broadcast problems are
    /// logged; the buzzer command for a gas reading has been handed to the
    /// transport by the time this returns.
    pub async fn process(
        &self,
        route: TopicRoute,
        topic: &str,
        payload: &[u8],
    ) -> Result<Processed, DecodeError> {
        let event = decode(route, payload)?;
        let ppm = event.gas_ppm();
        let severity = ppm.map(|ppm| self.automation.classify(ppm));

        let persisted = self
            .persistence
            .submit(EventRecord::from_event(&event, severity));

        match ViewerEnvelope::from_event(&event, severity).to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.hub.broadcast(bytes).await {
                    tracing::warn!(topic = %topic, error = %e, "Broadcast hand-off failed");
                }
            }
            Err(e) => tracing::error!(topic = %topic, error = %e, "Failed to encode viewer envelope"),
        }

        let alarm = match ppm {
            Some(ppm) => {
                let decision = self.automation.evaluate(ppm);
                tracing::debug!(
                    ppm,
                    severity = %decision.severity,
                    action = %decision.action,
                    "Gas reading classified"
                );
                if decision.publish {
                    self.publisher.publish_buzzer_control(decision.action).await;
                }
                Some(decision)
            }
            None => None,
        };

        Ok(Processed {
            severity,
            alarm,
            persisted,
        })
    }
}

/// Routes inbound messages onto per-topic lanes
#[derive(Clone)]
pub struct Dispatcher {
    lanes: Arc<HashMap<String, mpsc::Sender<Vec<u8>>>>,
}

impl Dispatcher {
    /// Start one lane per subscription
    pub fn spawn(table: &TopicTable, pipeline: Arc<Pipeline>, lane_capacity: usize) -> Self {
        let mut lanes = HashMap::with_capacity(table.len());

        for subscription in table.iter() {
            let (tx, rx) = mpsc::channel(lane_capacity.max(1));
            tokio::spawn(run_lane(
                subscription.topic.clone(),
                subscription.route,
                rx,
                Arc::clone(&pipeline),
            ));
            lanes.insert(subscription.topic.clone(), tx);
        }

        Self {
            lanes: Arc::new(lanes),
        }
    }

    /// Queue a message on its topic's lane
    ///
    /// Never waits. Returns false if the topic is unknown or its lane is
    /// full or gone; the message is dropped in that case.
    pub fn dispatch(&self, topic: &str, payload: Vec<u8>) -> bool {
        let Some(lane) = self.lanes.get(topic) else {
            tracing::debug!(topic = %topic, "No route for topic, message dropped");
            return false;
        };

        match lane.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(topic = %topic, "Topic lane full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(topic = %topic, "Topic lane stopped, message dropped");
                false
            }
        }
    }
}

async fn run_lane(
    topic: String,
    route: TopicRoute,
    mut rx: mpsc::Receiver<Vec<u8>>,
    pipeline: Arc<Pipeline>,
) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = pipeline.process(route, &topic, &payload).await {
            tracing::warn!(topic = %topic, error = %e, "Discarding malformed payload");
        }
    }
    tracing::debug!(topic = %topic, "Topic lane stopped");
}
