// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Notification module - MQTT, webhook and log file sinks

mod dispatcher;
mod log_file;
mod mqtt;
mod webhook;

pub use dispatcher::{Ack, Dispatcher, RetryPolicy};
pub use log_file::LogFileSink;
pub use mqtt::MqttSink;
pub use webhook::WebhookSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::decision::Decision;
use crate::error::{ConfigError, DispatchError};
use crate::sensors::Reading;

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Title put in the `alert` field of every payload
    pub alert_title: String,

    /// Tries per sink before giving up on it
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub publish_timeout_secs: u64,

    /// Also publish every reading as telemetry (MQTT only, best effort)
    pub publish_readings: bool,

    pub mqtt: MqttConfig,
    pub log_file: LogFileConfig,
    pub webhook: WebhookConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            alert_title: "Sensor Threshold Alert".to_string(),
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            publish_timeout_secs: 5,
            publish_readings: false,
            mqtt: MqttConfig::default(),
            log_file: LogFileConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl NotifyConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::NotPositive { key: "notify.max_attempts" });
        }
        if self.publish_timeout_secs == 0 {
            return Err(ConfigError::NotPositive { key: "notify.publish_timeout_secs" });
        }
        if self.mqtt.enabled && self.mqtt.broker.is_empty() {
            return Err(ConfigError::Missing { key: "notify.mqtt.broker", section: "notify.mqtt" });
        }
        if self.webhook.enabled && self.webhook.url.is_empty() {
            return Err(ConfigError::Missing { key: "notify.webhook.url", section: "notify.webhook" });
        }
        if self.log_file.enabled && self.log_file.path.as_os_str().is_empty() {
            return Err(ConfigError::Missing { key: "notify.log_file.path", section: "notify.log_file" });
        }
        Ok(())
    }
}

/// MQTT sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub alert_topic: String,
    pub telemetry_topic: String,
    /// Inbound control messages are logged from this topic
    pub control_topic: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// How long startup waits for the first CONNACK
    pub connect_timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "fieldwatch".to_string(),
            alert_topic: "fieldwatch/alerts".to_string(),
            telemetry_topic: "fieldwatch/readings".to_string(),
            control_topic: Some("fieldwatch/control".to_string()),
            username: None,
            password: None,
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Append-only notification log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/notifications.log"),
        }
    }
}

/// HTTP webhook sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Structured alert as published to every sink.
///
/// `id` stays the same across retries so receivers can drop duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub id: Uuid,
    pub alert: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub values: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
}

impl AlertPayload {
    pub fn new(title: &str, decision: &Decision, reading: &Reading) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert: title.to_string(),
            message: decision.reason.clone(),
            timestamp: reading.timestamp(),
            confidence: decision.confidence,
            values: reading.measurements().clone(),
            sensor_id: reading.sensor_id().map(str::to_string),
        }
    }
}

/// A notification transport
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one alert. The dispatcher handles retries and timeouts.
    async fn publish(&self, payload: &AlertPayload) -> Result<(), DispatchError>;

    /// Best-effort telemetry for every reading. Most sinks ignore it.
    async fn publish_reading(&self, _reading: &Reading) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Release the transport
    async fn close(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let reading = Reading::from_pairs([("temperature", 31.0), ("humidity", 50.0)]);
        let decision = Decision::trigger(1.0, "temperature 31 exceeds threshold 30");
        let payload = AlertPayload::new("Temperature/Humidity Alert", &decision, &reading);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["alert"], "Temperature/Humidity Alert");
        assert_eq!(json["message"], "temperature 31 exceeds threshold 30");
        assert_eq!(json["values"]["temperature"], 31.0);
        assert_eq!(json["confidence"], 1.0);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_validate_enabled_sinks() {
        let mut config = NotifyConfig::default();
        assert_eq!(config.validate(), Ok(()));

        config.webhook.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::Missing { .. })));

        let mut config = NotifyConfig::default();
        config.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NotPositive { .. })));
    }
}
