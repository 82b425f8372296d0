//! `deliver(digest_html, digest_text, recipients) -> success/failure with a
//! provider id`; retries are the adapter's own responsibility, not the
//! core's. spec.md §6 "Delivery adapter contract".

use crate::config::SmtpConfig;
use crate::errors::DeliveryError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn deliver(&self, digest_html: &str, digest_text: &str, recipients: &[String]) -> Result<String, DeliveryError>;
}

/// Sends the digest as a multipart HTML+text email, grounded in the
/// teacher's `alert_engine::send_notifications` email arm generalized to
/// multiple recipients and a combined body.
pub struct SmtpDeliveryAdapter {
    config: SmtpConfig,
}

impl SmtpDeliveryAdapter {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeliveryAdapter for SmtpDeliveryAdapter {
    async fn deliver(&self, digest_html: &str, digest_text: &str, recipients: &[String]) -> Result<String, DeliveryError> {
        let host = self.config.host.as_ref().ok_or(DeliveryError::NotConfigured)?;

        let transport: AsyncSmtpTransport<Tokio1Executor> = if let (Some(user), Some(pass)) = (&self.config.user, &self.config.pass) {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| DeliveryError::TransportFailed { recipients: recipients.to_vec(), message: e.to_string() })?
                .credentials(Credentials::new(user.clone(), pass.clone()))
                .port(self.config.port)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| DeliveryError::TransportFailed { recipients: recipients.to_vec(), message: e.to_string() })?
                .port(self.config.port)
                .build()
        };

        let from = self
            .config
            .from
            .parse()
            .map_err(|_| DeliveryError::TransportFailed { recipients: recipients.to_vec(), message: format!("invalid from address {}", self.config.from) })?;

        let mut builder = Message::builder().from(from).subject("Analytics Digest");
        for recipient in recipients {
            let to = recipient.parse().map_err(|_| DeliveryError::TransportFailed { recipients: recipients.to_vec(), message: format!("invalid recipient address {recipient}") })?;
            builder = builder.to(to);
        }

        let email = builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(digest_text.to_string()))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(digest_html.to_string())),
            )
            .map_err(|e| DeliveryError::TransportFailed { recipients: recipients.to_vec(), message: e.to_string() })?;

        transport
            .send(email)
            .await
            .map(|_| "smtp".to_string())
            .map_err(|e| DeliveryError::TransportFailed { recipients: recipients.to_vec(), message: e.to_string() })
    }
}

/// Logs instead of sending. Used for `--dry-run` and for tests, mirroring
/// the teacher's `execute_or_log` dry-run posture.
pub struct NullDeliveryAdapter;

#[async_trait]
impl DeliveryAdapter for NullDeliveryAdapter {
    async fn deliver(&self, digest_html: &str, digest_text: &str, recipients: &[String]) -> Result<String, DeliveryError> {
        tracing::info!(recipients = ?recipients, html_bytes = digest_html.len(), text_bytes = digest_text.len(), "dry-run: digest not sent");
        Ok("dry-run".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_adapter_always_succeeds() {
        let result = NullDeliveryAdapter.deliver("<html></html>", "text", &["ops@example.com".to_string()]).await;
        assert_eq!(result.unwrap(), "dry-run");
    }

    #[tokio::test]
    async fn smtp_adapter_without_host_is_not_configured() {
        let adapter = SmtpDeliveryAdapter::new(SmtpConfig::default());
        let result = adapter.deliver("<html></html>", "text", &["ops@example.com".to_string()]).await;
        assert!(matches!(result, Err(DeliveryError::NotConfigured)));
    }
}
