use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::Notifier;
use crate::config::SmtpConfig;
use crate::utils::error::AppError;

/// Sends HTML mail through an SMTP relay.
#[derive(Clone)]
pub struct SmtpNotifier {
    host: String,
    port: u16,
    credentials: Credentials,
    from: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            credentials: Credentials::new(config.username.clone(), config.password.clone()),
            from: config.from.clone(),
        }
    }

    // A transport per message; the relay sees little traffic.
    fn build_transport(&self) -> Result<SmtpTransport, AppError> {
        Ok(SmtpTransport::starttls_relay(&self.host)
            .map_err(|e| AppError::ExternalServiceError(format!("SMTP relay error: {}", e)))?
            .port(self.port)
            .credentials(self.credentials.clone())
            .build())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AppError::ExternalServiceError(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| AppError::ExternalServiceError(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to build email: {}", e)))?;

        let mailer = self.build_transport()?;

        tokio::task::spawn_blocking(move || {
            mailer
                .send(&email)
                .map_err(|e| AppError::ExternalServiceError(format!("Failed to send email: {}", e)))
        })
        .await
        .map_err(|e| AppError::ExternalServiceError(format!("Email task failed: {}", e)))?
        .map(|_| ())
    }
}
