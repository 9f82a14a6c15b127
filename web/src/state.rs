//! Shared state for the auth middleware and extractors.

use std::sync::Arc;

use keyward_auth::session::SessionModule;
use keyward_core::Registry;

/// The built registry plus the session module it contains.
///
/// The session module is held separately so extractors can verify sessions
/// on application routes without going through dispatch.
#[derive(Clone, Debug)]
pub struct AuthState {
    /// Every registered module.
    pub registry: Arc<Registry>,

    /// Session module registered in `registry`.
    pub session: Arc<SessionModule>,
}

impl AuthState {
    /// Create the shared state.
    #[must_use]
    pub const fn new(registry: Arc<Registry>, session: Arc<SessionModule>) -> Self {
        Self { registry, session }
    }
}
