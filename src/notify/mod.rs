use async_trait::async_trait;
use tracing::info;

use crate::utils::error::AppError;

mod smtp;
pub mod templates;

pub use smtp::SmtpNotifier;

/// Outbound email. Implementations report failure; whether a failure
/// matters is the caller's decision.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError>;
}

/// Stand-in used when no SMTP relay is configured: records the send in the
/// log and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        info!(to, subject, bytes = html.len(), "Email delivery disabled, not sending");
        Ok(())
    }
}
