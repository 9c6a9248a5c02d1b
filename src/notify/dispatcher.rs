// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Alert dispatch with bounded retries

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AlertPayload, LogFileSink, MqttSink, NotificationSink, NotifyConfig, WebhookSink};
use crate::decision::Decision;
use crate::error::DispatchError;
use crate::sensors::Reading;

/// Retry budget for one sink
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub publish_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            publish_timeout: Duration::from_secs(config.publish_timeout_secs),
        }
    }

    /// Wait before retry number `retry` (1-based)
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << (retry - 1).min(16);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&NotifyConfig::default())
    }
}

/// Delivery receipt
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub alert_id: Uuid,
    /// Sinks that accepted the alert
    pub delivered: Vec<String>,
    /// Publish attempts across all sinks
    pub attempts: u32,
}

/// Fans an alert out to every configured sink.
///
/// Each sink is retried on its own, so a sink that already accepted the
/// alert is never sent it twice. The dispatch succeeds when at least one
/// sink delivered; it fails only when every sink exhausted its retries.
pub struct Dispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
    retry: RetryPolicy,
    alert_title: String,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>, retry: RetryPolicy, alert_title: &str) -> Self {
        Self {
            sinks,
            retry,
            alert_title: alert_title.to_string(),
        }
    }

    /// Open every enabled sink. Sinks opened before a failure are closed
    /// again before the error is returned.
    pub async fn from_config(config: &NotifyConfig) -> Result<Self> {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();

        if let Err(e) = open_sinks(config, &mut sinks).await {
            for sink in &sinks {
                if let Err(close_err) = sink.close().await {
                    warn!("Failed to close sink '{}': {}", sink.name(), close_err);
                }
            }
            return Err(e);
        }

        if sinks.is_empty() {
            info!("No notification sinks enabled, alerts go to the log only");
        }

        Ok(Self::new(sinks, RetryPolicy::from_config(config), &config.alert_title))
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Deliver an alert for a triggered decision
    pub async fn send(&self, decision: &Decision, reading: &Reading) -> Result<Ack, DispatchError> {
        let payload = AlertPayload::new(&self.alert_title, decision, reading);

        if self.sinks.is_empty() {
            warn!(
                alert_id = %payload.id,
                confidence = payload.confidence,
                "ALERT {}: {}", payload.alert, payload.message
            );
            return Ok(Ack {
                alert_id: payload.id,
                delivered: vec!["log".to_string()],
                attempts: 1,
            });
        }

        let mut delivered = Vec::new();
        let mut attempts = 0;
        let mut last_error = None;

        for sink in &self.sinks {
            match self.deliver(sink.as_ref(), &payload).await {
                Ok(tries) => {
                    attempts += tries;
                    delivered.push(sink.name().to_string());
                }
                Err((tries, e)) => {
                    attempts += tries;
                    warn!("Alert {} not delivered to '{}': {}", payload.id, sink.name(), e);
                    last_error = Some(e);
                }
            }
        }

        if delivered.is_empty() {
            return Err(DispatchError::Exhausted {
                attempts,
                last: last_error.map(|e| e.to_string()).unwrap_or_default(),
            });
        }

        info!("Alert {} delivered to {:?}", payload.id, delivered);
        Ok(Ack {
            alert_id: payload.id,
            delivered,
            attempts,
        })
    }

    async fn deliver(
        &self,
        sink: &dyn NotificationSink,
        payload: &AlertPayload,
    ) -> Result<u32, (u32, DispatchError)> {
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.retry.publish_timeout, sink.publish(payload)).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout {
                    sink: sink.name().to_string(),
                    timeout: self.retry.publish_timeout,
                }),
            };

            match result {
                Ok(()) => {
                    if attempt > 1 {
                        info!("Sink '{}' accepted alert on attempt {}", sink.name(), attempt);
                    }
                    return Ok(attempt);
                }
                Err(e) if attempt >= self.retry.max_attempts => return Err((attempt, e)),
                Err(e) => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        "Sink '{}' attempt {}/{} failed: {} (retrying in {:?})",
                        sink.name(), attempt, self.retry.max_attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Single best-effort telemetry publish per sink
    pub async fn publish_reading(&self, reading: &Reading) {
        for sink in &self.sinks {
            match tokio::time::timeout(self.retry.publish_timeout, sink.publish_reading(reading)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Telemetry to '{}' failed: {}", sink.name(), e),
                Err(_) => debug!("Telemetry to '{}' timed out", sink.name()),
            }
        }
    }

    /// Close every sink
    pub async fn shutdown(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                warn!("Failed to close sink '{}': {}", sink.name(), e);
            }
        }
    }
}

async fn open_sinks(config: &NotifyConfig, sinks: &mut Vec<Box<dyn NotificationSink>>) -> Result<()> {
    if config.log_file.enabled {
        sinks.push(Box::new(LogFileSink::open(&config.log_file.path)?));
    }

    if config.mqtt.enabled {
        sinks.push(Box::new(MqttSink::connect(&config.mqtt).await?));
    }

    if config.webhook.enabled {
        sinks.push(Box::new(WebhookSink::new(&config.webhook)?));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails the first `failures` publishes, then accepts
    struct FlakySink {
        name: String,
        failures: u32,
        calls: Arc<AtomicU32>,
        delivered: Arc<AtomicU32>,
    }

    impl FlakySink {
        fn new(name: &str, failures: u32) -> (Self, Arc<AtomicU32>, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            let delivered = Arc::new(AtomicU32::new(0));
            let sink = Self {
                name: name.to_string(),
                failures,
                calls: calls.clone(),
                delivered: delivered.clone(),
            };
            (sink, calls, delivered)
        }
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn publish(&self, _payload: &AlertPayload) -> Result<(), DispatchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(DispatchError::Sink {
                    sink: self.name.clone(),
                    reason: "broker unavailable".into(),
                });
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            publish_timeout: Duration::from_secs(1),
        }
    }

    fn alert() -> (Decision, Reading) {
        (
            Decision::trigger(1.0, "temperature 31 exceeds threshold 30"),
            Reading::from_pairs([("temperature", 31.0)]),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_delivers_once() {
        let (sink, calls, delivered) = FlakySink::new("mqtt", 1);
        let dispatcher = Dispatcher::new(vec![Box::new(sink)], retry(), "Alert");
        let (decision, reading) = alert();

        let ack = dispatcher.send(&decision, &reading).await.unwrap();

        assert_eq!(ack.attempts, 2);
        assert_eq!(ack.delivered, vec!["mqtt".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_attempts() {
        let (sink, calls, _) = FlakySink::new("webhook", 10);
        let dispatcher = Dispatcher::new(vec![Box::new(sink)], retry(), "Alert");
        let (decision, reading) = alert();

        let err = dispatcher.send(&decision, &reading).await.unwrap_err();

        assert!(matches!(err, DispatchError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_sink_not_resent() {
        let (good, good_calls, _) = FlakySink::new("log", 0);
        let (bad, bad_calls, _) = FlakySink::new("mqtt", 2);
        let dispatcher = Dispatcher::new(vec![Box::new(good), Box::new(bad)], retry(), "Alert");
        let (decision, reading) = alert();

        let ack = dispatcher.send(&decision, &reading).await.unwrap();

        assert_eq!(ack.delivered, vec!["log".to_string(), "mqtt".to_string()]);
        assert_eq!(good_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bad_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_still_acks() {
        let (good, _, _) = FlakySink::new("log", 0);
        let (bad, _, _) = FlakySink::new("mqtt", 99);
        let dispatcher = Dispatcher::new(vec![Box::new(good), Box::new(bad)], retry(), "Alert");
        let (decision, reading) = alert();

        let ack = dispatcher.send(&decision, &reading).await.unwrap();
        assert_eq!(ack.delivered, vec!["log".to_string()]);
        assert_eq!(ack.attempts, 4);
    }

    #[tokio::test]
    async fn test_no_sinks_logs_and_acks() {
        let dispatcher = Dispatcher::new(Vec::new(), retry(), "Alert");
        let (decision, reading) = alert();

        let ack = dispatcher.send(&decision, &reading).await.unwrap();
        assert_eq!(ack.delivered, vec!["log".to_string()]);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = retry();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_secs(1));
    }
}
