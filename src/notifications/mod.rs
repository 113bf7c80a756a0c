//! Best-effort customer email notifications.
//!
//! Delivery happens after the database transaction has committed. Failures
//! and timeouts are logged and counted; they never reach the caller.

use crate::entities::{order, OrderStatus};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound email transport
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

/// Used when no provider key is configured
#[derive(Debug, Default, Clone)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        debug!(to = %message.to, subject = %message.subject, "email provider not configured, skipping");
        Ok(())
    }
}

/// Sends mail through the Resend HTTP API
#[derive(Clone)]
pub struct ResendNotifier {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ResendNotifier {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: RESEND_ENDPOINT.to_string(),
        })
    }

    /// Overrides the API endpoint, e.g. for a local mock server
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotificationError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Builds status-change emails and hands them to a [`Notifier`]
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    store_name: String,
    email_from: String,
    frontend_url: String,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        store_name: impl Into<String>,
        email_from: impl Into<String>,
        frontend_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            notifier,
            store_name: store_name.into(),
            email_from: email_from.into(),
            frontend_url: frontend_url.into(),
            timeout,
        }
    }

    /// Dispatcher that drops every message
    pub fn disabled() -> Self {
        Self::new(
            Arc::new(NoopNotifier),
            "",
            "",
            "http://localhost",
            Duration::from_secs(1),
        )
    }

    /// Email for `order` entering `status`, or `None` when the order has no address.
    pub fn status_changed_message(
        &self,
        order: &order::Model,
        status: OrderStatus,
    ) -> Option<EmailMessage> {
        let to = order
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())?;

        let tracking_url = format!(
            "{}/order.html?id={}",
            self.frontend_url.trim_end_matches('/'),
            order.id
        );
        let html = format!(
            concat!(
                "<div style=\"font-family:sans-serif;max-width:560px\">",
                "<h2>{store}</h2>",
                "<p>Hi {name},</p>",
                "<p>Your order <strong>{order_id}</strong> is now <strong>{label}</strong>.</p>",
                "{invoice}",
                "<p><a href=\"{url}\">Track your order</a></p>",
                "<p>Thank you for shopping with {store}.</p>",
                "</div>"
            ),
            store = escape_html(&self.store_name),
            name = escape_html(&order.customer_name),
            order_id = order.id,
            label = status.label(),
            invoice = order
                .invoice_number
                .as_deref()
                .map(|n| format!("<p>Invoice number: {}</p>", escape_html(n)))
                .unwrap_or_default(),
            url = escape_html(&tracking_url),
        );

        Some(EmailMessage {
            from: self.email_from.clone(),
            to: to.to_string(),
            subject: format!("{} - {}", status.label(), self.store_name),
            html,
        })
    }

    /// Sends the status-change email if possible. Never fails.
    #[instrument(skip(self, order), fields(order_id = %order.id, status = %status))]
    pub async fn notify_status_change(&self, order: &order::Model, status: OrderStatus) {
        let Some(message) = self.status_changed_message(order, status) else {
            debug!("order has no email address, skipping notification");
            return;
        };

        match tokio::time::timeout(self.timeout, self.notifier.send(&message)).await {
            Ok(Ok(())) => {
                info!("status notification sent");
                metrics::counter!("storefront.notifications.sent", 1);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "status notification failed");
                metrics::counter!("storefront.notifications.failed", 1);
            }
            Err(_) => {
                let e = NotificationError::Timeout(self.timeout);
                warn!(error = %e, "status notification failed");
                metrics::counter!("storefront.notifications.failed", 1);
            }
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recording(Mutex<Vec<EmailMessage>>);

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
            self.0.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct Slow;

    #[async_trait]
    impl Notifier for Slow {
        async fn send(&self, _message: &EmailMessage) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn order(email: Option<&str>) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: Uuid::new_v4(),
            customer_name: "Asha <b>".into(),
            phone: "9999999999".into(),
            email: email.map(str::to_string),
            product_id: Uuid::new_v4(),
            variant_id: None,
            quantity: 1,
            image_url: None,
            payment_screenshot_url: None,
            is_customized: false,
            unit_price: dec!(299),
            total_price: dec!(299),
            status: OrderStatus::PaymentReceived,
            invoice_number: Some("INV-2026-0001".into()),
            invoiced_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn dispatcher(notifier: Arc<dyn Notifier>) -> NotificationDispatcher {
        NotificationDispatcher::new(
            notifier,
            "Abstract Realms",
            "Store <orders@example.com>",
            "https://shop.example.com/",
            Duration::from_millis(50),
        )
    }

    #[test]
    fn message_uses_label_tracking_link_and_escapes() {
        let order = order(Some("asha@example.com"));
        let msg = dispatcher(Arc::new(NoopNotifier))
            .status_changed_message(&order, OrderStatus::PaymentReceived)
            .unwrap();

        assert_eq!(msg.to, "asha@example.com");
        assert_eq!(msg.subject, "Payment Received - Abstract Realms");
        assert!(msg
            .html
            .contains(&format!("https://shop.example.com/order.html?id={}", order.id)));
        assert!(msg.html.contains("Asha &lt;b&gt;"));
        assert!(msg.html.contains("INV-2026-0001"));
    }

    #[test]
    fn no_email_means_no_message() {
        let d = dispatcher(Arc::new(NoopNotifier));
        assert!(d
            .status_changed_message(&order(None), OrderStatus::Completed)
            .is_none());
        assert!(d
            .status_changed_message(&order(Some("  ")), OrderStatus::Completed)
            .is_none());
    }

    #[tokio::test]
    async fn dispatch_reaches_notifier() {
        let recording = Arc::new(Recording::default());
        dispatcher(recording.clone())
            .notify_status_change(&order(Some("a@b.co")), OrderStatus::InProgress)
            .await;
        assert_eq!(recording.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slow_notifier_is_cut_off() {
        let started = std::time::Instant::now();
        dispatcher(Arc::new(Slow))
            .notify_status_change(&order(Some("a@b.co")), OrderStatus::InProgress)
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
