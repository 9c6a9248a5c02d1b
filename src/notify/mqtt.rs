// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! MQTT alert sink

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AlertPayload, MqttConfig, NotificationSink};
use crate::error::DispatchError;
use crate::sensors::Reading;

/// Publishes alerts with QoS 1.
///
/// The client is opened once at startup. A background task drives the
/// event loop, resubscribes to the control topic on every CONNACK and logs
/// inbound control messages; it never blocks the pipeline.
///
/// An alert counts as delivered only once the broker's PUBACK for it
/// arrives. Alert publishes are serialized so the next outgoing QoS 1
/// packet id always belongs to the alert being sent.
pub struct MqttSink {
    client: AsyncClient,
    config: MqttConfig,
    connected: watch::Receiver<bool>,
    sent_ids: Mutex<mpsc::UnboundedReceiver<u16>>,
    acks: broadcast::Sender<u16>,
    event_task: JoinHandle<()>,
}

impl MqttSink {
    /// Create the client and wait for the first CONNACK
    pub async fn connect(config: &MqttConfig) -> Result<Self, DispatchError> {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let (state_tx, state_rx) = watch::channel(false);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (ack_tx, _) = broadcast::channel(64);
        let acks = ack_tx.clone();

        let control_client = client.clone();
        let control_topic = config.control_topic.clone();

        // Spawn eventloop handler
        let event_task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                        let _ = state_tx.send(true);
                        // only this task drains the request channel, so never wait on it here
                        if let Some(topic) = &control_topic {
                            if let Err(e) = control_client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                                warn!("MQTT subscribe to {} failed: {}", topic, e);
                            }
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Publish(pkid))) if pkid != 0 => {
                        let _ = sent_tx.send(pkid);
                    }
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        debug!("MQTT PUBACK {}", ack.pkid);
                        let _ = ack_tx.send(ack.pkid);
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        info!(
                            "MQTT control message on {}: {}",
                            msg.topic,
                            String::from_utf8_lossy(&msg.payload)
                        );
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        let _ = state_tx.send(false);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = state_tx.send(false);
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        let sink = Self {
            client,
            config: config.clone(),
            connected: state_rx,
            sent_ids: Mutex::new(sent_rx),
            acks,
            event_task,
        };

        let timeout = Duration::from_secs(config.connect_timeout_secs.max(1));
        let mut state = sink.connected.clone();
        let wait = async {
            while !*state.borrow_and_update() {
                if state.changed().await.is_err() {
                    break;
                }
            }
        };

        if tokio::time::timeout(timeout, wait).await.is_err() || !sink.is_connected() {
            sink.event_task.abort();
            return Err(DispatchError::Sink {
                sink: "mqtt".to_string(),
                reason: format!(
                    "no CONNACK from {}:{} within {:?}",
                    config.broker, config.port, timeout
                ),
            });
        }

        info!("MQTT client ready for {}:{}", config.broker, config.port);
        Ok(sink)
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn fail(&self, reason: impl Into<String>) -> DispatchError {
        DispatchError::Sink {
            sink: "mqtt".to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for MqttSink {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn publish(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        // refuse while offline so the dispatcher backs off instead of queueing blindly
        if !self.is_connected() {
            return Err(self.fail("not connected"));
        }

        let json = serde_json::to_vec(payload)?;

        let mut sent_ids = self.sent_ids.lock().await;
        // ids left over from attempts that timed out
        while sent_ids.try_recv().is_ok() {}
        let mut acks = self.acks.subscribe();

        self.client
            .publish(self.config.alert_topic.as_str(), QoS::AtLeastOnce, false, json)
            .await
            .map_err(|e| self.fail(format!("publish failed: {}", e)))?;

        // bounded by the dispatcher's publish timeout
        let pkid = sent_ids
            .recv()
            .await
            .ok_or_else(|| self.fail("event loop stopped"))?;

        loop {
            match acks.recv().await {
                Ok(acked) if acked == pkid => return Ok(()),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(self.fail("event loop stopped")),
            }
        }
    }

    async fn publish_reading(&self, reading: &Reading) -> Result<(), DispatchError> {
        if !self.is_connected() {
            return Err(self.fail("not connected"));
        }

        let json = serde_json::to_vec(reading)?;
        debug!("Publishing reading to {}", self.config.telemetry_topic);
        self.client
            .publish(self.config.telemetry_topic.as_str(), QoS::AtMostOnce, false, json)
            .await
            .map_err(|e| self.fail(format!("publish failed: {}", e)))
    }

    async fn close(&self) -> Result<(), DispatchError> {
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| self.fail(format!("disconnect failed: {}", e)));
        self.event_task.abort();
        result
    }
}
