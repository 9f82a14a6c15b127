//! Mock email delivery for testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keyward_core::{Error, Result};

use crate::providers::{AuthEmail, EmailDelivery};

/// Records every email instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmailDelivery {
    sent: Arc<Mutex<Vec<AuthEmail>>>,
    /// Whether to simulate success or failure.
    pub should_fail: bool,
}

impl RecordingEmailDelivery {
    /// Delivery that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivery that always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Emails recorded so far.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn sent(&self) -> Result<Vec<AuthEmail>> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .map_err(|_| Error::Internal("Mutex lock failed".to_string()))
    }

    /// `token` query parameter of the last link sent to `to`.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn last_token_for(&self, to: &str) -> Result<Option<String>> {
        Ok(self
            .sent()?
            .iter()
            .rev()
            .find(|email| email.to == to)
            .and_then(|email| token_from_link(email.kind.link())))
    }
}

fn token_from_link(link: &str) -> Option<String> {
    let (_, query) = link.split_once('?')?;
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .ok()?
        .into_iter()
        .find(|(name, _)| name == "token")
        .map(|(_, value)| value)
}

#[async_trait]
impl EmailDelivery for RecordingEmailDelivery {
    async fn send(&self, email: &AuthEmail) -> Result<()> {
        if self.should_fail {
            return Err(Error::Internal("email delivery failed".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| Error::Internal("Mutex lock failed".to_string()))?
            .push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::providers::EmailKind;

    #[tokio::test]
    async fn records_and_extracts_tokens() {
        let delivery = RecordingEmailDelivery::new();
        delivery
            .send(&AuthEmail {
                to: "a@b.com".into(),
                user_id: "u1".into(),
                kind: EmailKind::EmailVerification {
                    link: "https://example.com/auth/verify-email?token=abc%2B1&rid=emailverification".into(),
                },
            })
            .await
            .unwrap();

        assert_eq!(delivery.sent().unwrap().len(), 1);
        assert_eq!(delivery.last_token_for("a@b.com").unwrap().as_deref(), Some("abc+1"));
        assert_eq!(delivery.last_token_for("x@y.com").unwrap(), None);
    }

    #[tokio::test]
    async fn failing_delivery_errors() {
        let delivery = RecordingEmailDelivery::failing();
        let email = AuthEmail {
            to: "a@b.com".into(),
            user_id: "u1".into(),
            kind: EmailKind::PasswordReset { link: "x".into() },
        };
        assert!(delivery.send(&email).await.is_err());
    }
}
