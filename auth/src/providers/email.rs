//! Email delivery trait.

use async_trait::async_trait;
use keyward_core::Result;

/// Which email is being sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailKind {
    /// Link that verifies the address.
    EmailVerification {
        /// Full verification link.
        link: String,
    },

    /// Link to the password reset page.
    PasswordReset {
        /// Full reset link.
        link: String,
    },
}

impl EmailKind {
    /// The link carried by the email.
    #[must_use]
    pub fn link(&self) -> &str {
        match self {
            Self::EmailVerification { link } | Self::PasswordReset { link } => link,
        }
    }
}

/// An email the auth modules want delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEmail {
    /// Recipient address.
    pub to: String,

    /// Recipient user id.
    pub user_id: String,

    /// Content.
    pub kind: EmailKind,
}

/// Email delivery.
///
/// This trait abstracts over email delivery services
/// (SMTP, SendGrid, AWS SES, ...).
#[async_trait]
pub trait EmailDelivery: Send + Sync {
    /// Deliver one email.
    ///
    /// # Errors
    ///
    /// Returns error if the delivery service rejects the message or is
    /// unreachable.
    async fn send(&self, email: &AuthEmail) -> Result<()>;
}
