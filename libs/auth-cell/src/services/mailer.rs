use async_trait::async_trait;
use tracing::{debug, info};

/// Outbound channel for account e-mails. Tokens are passed raw; only their hashes are stored.
#[async_trait]
pub trait AccountMailer: Send + Sync {
    async fn send_verification_email(&self, to: &str, name: &str, token: &str) -> anyhow::Result<()>;

    async fn send_password_reset_email(&self, to: &str, name: &str, token: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMailer;

#[async_trait]
impl AccountMailer for LoggingMailer {
    async fn send_verification_email(&self, to: &str, name: &str, token: &str) -> anyhow::Result<()> {
        info!(to, name, "Verification e-mail");
        debug!(token, "Verification token");
        Ok(())
    }

    async fn send_password_reset_email(&self, to: &str, name: &str, token: &str) -> anyhow::Result<()> {
        info!(to, name, "Password reset e-mail");
        debug!(token, "Password reset token");
        Ok(())
    }
}
