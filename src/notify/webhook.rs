//! HTTP webhook sink

use async_trait::async_trait;
use std::time::Duration;

use super::{AlertPayload, NotificationSink, WebhookConfig};
use crate::error::DispatchError;

/// POSTs the alert as JSON; any non-2xx response counts as a failure
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(config: &WebhookConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .use_rustls_tls()
            .build()
            .map_err(|e| DispatchError::Sink {
                sink: "webhook".to_string(),
                reason: format!("client setup failed: {}", e),
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn publish(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        let fail = |reason: String| DispatchError::Sink {
            sink: "webhook".to_string(),
            reason,
        };

        self.client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?
            .error_for_status()
            .map_err(|e| fail(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use crate::sensors::Reading;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one request with `status`, after reading it in full
    async fn endpoint(status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);

                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let body_len = text
                        .lines()
                        .find_map(|l| {
                            let l = l.to_ascii_lowercase();
                            l.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }

            let response = format!("HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status);
            let _ = stream.write_all(response.as_bytes()).await;
        });

        format!("http://{}/hook", addr)
    }

    fn sink(url: String) -> WebhookSink {
        WebhookSink::new(&WebhookConfig {
            enabled: true,
            url,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn payload() -> AlertPayload {
        let reading = Reading::from_pairs([("humidity", 85.0)]);
        AlertPayload::new("Alert", &Decision::trigger(1.0, "humidity 85 exceeds threshold 80"), &reading)
    }

    #[tokio::test]
    async fn test_success_status_delivers() {
        let sink = sink(endpoint("200 OK").await);
        sink.publish(&payload()).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_failure() {
        let sink = sink(endpoint("500 Internal Server Error").await);
        let err = sink.publish(&payload()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Sink { sink: ref name, .. } if name == "webhook"));
    }
}
