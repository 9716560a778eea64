use crate::database::Database;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";
const MAX_CONCURRENT_SENDS: usize = 8;

/// Outcome of one device send. Stale tokens are pruned from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Delivered,
    StaleToken,
    Failed,
}

/// Pushes signal-change notifications to registered devices through the
/// FCM legacy HTTP API.
pub struct Notifier<'a> {
    http: &'a Client,
    server_key: String,
}

impl<'a> Notifier<'a> {
    pub fn new(http: &'a Client, server_key: String) -> Self {
        Self { http, server_key }
    }

    /// Sends the notification to every registered device, with bounded
    /// concurrency, and removes tokens FCM reports as gone. Returns the
    /// number of successful deliveries.
    pub async fn broadcast(&self, db: &Database, title: &str, body: &str) -> Result<usize> {
        let devices = db.get_devices().await?;
        if devices.is_empty() {
            info!("No registered devices, skipping notification '{}'", title);
            return Ok(0);
        }

        let outcomes: Vec<(String, Result<SendOutcome>)> = stream::iter(devices)
            .map(|device| async move {
                let outcome = self.send_to(&device.fcm_token, title, body).await;
                (device.fcm_token, outcome)
            })
            .buffer_unordered(MAX_CONCURRENT_SENDS)
            .collect()
            .await;

        let mut delivered = 0usize;
        let mut stale_tokens = Vec::new();
        for (token, outcome) in outcomes {
            match outcome {
                Ok(SendOutcome::Delivered) => delivered += 1,
                Ok(SendOutcome::StaleToken) => stale_tokens.push(token),
                Ok(SendOutcome::Failed) => {
                    warn!("FCM rejected a notification; keeping the token for retry")
                }
                Err(err) => warn!("FCM send failed: {}", err),
            }
        }

        for token in &stale_tokens {
            if let Err(err) = db.delete_device(token).await {
                warn!("Failed to prune stale device token: {}", err);
            }
        }
        if !stale_tokens.is_empty() {
            info!("Pruned {} stale device token(s)", stale_tokens.len());
        }

        info!(
            "Notification '{}' delivered to {} device(s)",
            title, delivered
        );
        Ok(delivered)
    }

    async fn send_to(&self, token: &str, title: &str, body: &str) -> Result<SendOutcome> {
        let payload = json!({
            "to": token,
            "notification": {
                "title": title,
                "body": body,
            },
        });

        let response = self
            .http
            .post(FCM_SEND_URL)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await
            .context("FCM request failed")?
            .error_for_status()
            .context("FCM request returned error")?;

        let reply: FcmResponse = response
            .json()
            .await
            .context("failed to parse FCM response")?;
        Ok(classify_fcm_response(&reply))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FcmResponse {
    #[serde(default)]
    failure: i64,
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    #[serde(default)]
    error: Option<String>,
}

pub(crate) fn classify_fcm_response(reply: &FcmResponse) -> SendOutcome {
    if reply.failure == 0 {
        return SendOutcome::Delivered;
    }
    let stale = reply.results.iter().any(|result| {
        matches!(
            result.error.as_deref(),
            Some("NotRegistered") | Some("InvalidRegistration")
        )
    });
    if stale {
        SendOutcome::StaleToken
    } else {
        SendOutcome::Failed
    }
}
