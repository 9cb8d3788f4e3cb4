//! MQTT transport
//!
//! Subscribes to raw device records with QoS 1 (at-least-once) and feeds each
//! publish into the pipeline inline, so records from one device are processed
//! in the order the broker delivers them.
//!
//! Shutdown has two steps. `shutdown` stops the inbound side and releases the
//! pipeline while the event loop keeps carrying outbound publishes; `close`
//! sends the Disconnect and ends the task.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{OutboundTopic, RecordSink, SinkError};
use crate::config::MqttConfig;
use crate::pipeline::Pipeline;

/// Inbound raw records, one sub-topic per device
pub const RAW_DATA_TOPIC: &str = "cpe/raw-data/#";

const REQUEST_CAPACITY: usize = 256;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub fn connect(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
    opts.set_keep_alive(Duration::from_secs(15));
    AsyncClient::new(opts, REQUEST_CAPACITY)
}

/// Publishes outbound records through the shared MQTT client
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
}

impl MqttSink {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl RecordSink for MqttSink {
    fn publish(&self, topic: OutboundTopic, key: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        self.client
            .try_publish(topic.topic_for(key), QoS::AtLeastOnce, false, payload)
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}

/// Drive the MQTT event loop until `close`
pub fn spawn_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    pipeline: Arc<Pipeline>,
    mut shutdown: watch::Receiver<bool>,
    mut close: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("MQTT listener started");
        let mut inbound = Some(pipeline);

        loop {
            tokio::select! {
                _ = shutdown.changed(), if inbound.is_some() => {
                    inbound = None;
                    if let Err(e) = client.try_unsubscribe(RAW_DATA_TOPIC) {
                        tracing::debug!("MQTT unsubscribe request failed: {}", e);
                    }
                    tracing::info!("MQTT inbound stopped, outbound publishes still flowing");
                }
                _ = close.changed() => break,
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) if inbound.is_some() => {
                        // subscriptions do not survive a clean-session reconnect
                        match client.try_subscribe(RAW_DATA_TOPIC, QoS::AtLeastOnce) {
                            Ok(()) => tracing::info!("MQTT connected, subscribed to {}", RAW_DATA_TOPIC),
                            Err(e) => tracing::error!("MQTT subscribe failed: {}", e),
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => match &inbound {
                        Some(pipeline) => {
                            tracing::trace!(topic = %publish.topic, bytes = publish.payload.len(), "raw record received");
                            let _ = pipeline.ingest_payload(&publish.payload);
                        }
                        None => tracing::debug!(topic = %publish.topic, "raw record ignored during shutdown"),
                    },
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MQTT connection error: {}", e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }

        disconnect(&client, &mut eventloop).await;
        tracing::info!("MQTT listener stopped");
    })
}

/// Queue a Disconnect and poll until it is written or the connection fails
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        tracing::debug!("MQTT disconnect request failed: {}", e);
        return;
    }

    let sent = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;

    if sent.is_err() {
        tracing::warn!("MQTT disconnect not confirmed before timeout");
    }
}
