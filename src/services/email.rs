//! Customer notification delivery.
//!
//! The planner only decides who gets told what; `EmailSender` implementations
//! own rendering and transport. `LogEmailSender` is the default when no email
//! API is configured.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryNotification {
    pub to: String,
    pub customer_name: String,
    pub eta: String,
    pub summary: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, notification: &DeliveryNotification) -> Result<(), AppError>;
}

const BODY_TEMPLATE: &str = "Dear {CUSTOMER_NAME},

This is a confirmation for your upcoming delivery scheduled on {DELIVERY_DATE}.
Your estimated time of arrival (ETA) is {ETA}.

Here is a quick summary of your delivery:
{SUMMARY}

Thank you for your order.";

pub fn render_subject(notification: &DeliveryNotification) -> String {
    format!("Your Upcoming Delivery Details for {}", notification.summary)
}

pub fn render_body(notification: &DeliveryNotification, delivery_date: &str) -> String {
    BODY_TEMPLATE
        .replace("{CUSTOMER_NAME}", &notification.customer_name)
        .replace("{DELIVERY_DATE}", delivery_date)
        .replace("{ETA}", &notification.eta)
        .replace("{SUMMARY}", &notification.summary)
}

fn today_label() -> String {
    Local::now().format("%A, %B %-d, %Y").to_string()
}

pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, notification: &DeliveryNotification) -> Result<(), AppError> {
        info!(
            to = %notification.to,
            subject = %render_subject(notification),
            "email not configured; logging notification instead\n{}",
            render_body(notification, &today_label()),
        );
        Ok(())
    }
}

/// Posts rendered messages to a JSON email API with bearer authentication.
pub struct HttpEmailSender {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, notification: &DeliveryNotification) -> Result<(), AppError> {
        let body = json!({
            "from": self.from,
            "to": notification.to,
            "subject": render_subject(notification),
            "text": render_body(notification, &today_label()),
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "email api returned {status}: {detail}"
            )));
        }

        info!(to = %notification.to, "notification email sent");
        Ok(())
    }
}

/// Keeps sent notifications in memory; recipients listed in `rejecting`
/// fail. Used by tests and local demos.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<DeliveryNotification>>,
    rejecting: Vec<String>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: Mutex::new(Vec::new()),
            rejecting: recipients.into_iter().map(Into::into).collect(),
        }
    }

    pub async fn sent(&self) -> Vec<DeliveryNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, notification: &DeliveryNotification) -> Result<(), AppError> {
        if self.rejecting.iter().any(|r| r == &notification.to) {
            return Err(AppError::ExternalService(format!(
                "recipient {} rejected",
                notification.to
            )));
        }
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}
