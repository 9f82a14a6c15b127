//! Console email delivery for development and testing.

use async_trait::async_trait;
use keyward_core::Result;
use tracing::info;

use super::email::{AuthEmail, EmailDelivery, EmailKind};

/// Console email delivery.
///
/// Logs emails instead of sending them. Useful for development where you
/// don't want to send real emails; the link is printed so it can be opened
/// by hand.
///
/// # Examples
///
/// ```ignore
/// use keyward_auth::providers::ConsoleEmailDelivery;
///
/// let delivery = ConsoleEmailDelivery::new();
/// delivery.send(&email).await?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct ConsoleEmailDelivery;

impl ConsoleEmailDelivery {
    /// Create a new console email delivery.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailDelivery for ConsoleEmailDelivery {
    async fn send(&self, email: &AuthEmail) -> Result<()> {
        let subject = match &email.kind {
            EmailKind::EmailVerification { .. } => "Verify your email address",
            EmailKind::PasswordReset { .. } => "Reset your password",
        };
        info!(
            to = %email.to,
            user_id = %email.user_id,
            subject,
            link = %email.kind.link(),
            "📧 Auth email (development mode)"
        );
        Ok(())
    }
}
