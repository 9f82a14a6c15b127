//! # Keyward authentication modules
//!
//! Capability modules that plug into a [`keyward_core::Registry`]:
//!
//! - [`session::SessionModule`]: token triad issuance, verification,
//!   rotation and revocation, plus the session error handler
//! - [`emailpassword::EmailPasswordModule`]: sign-up, sign-in, password reset
//! - [`thirdparty::ThirdPartyModule`]: OAuth sign-in-or-up
//! - [`emailverification::EmailVerificationModule`]: verification links
//! - [`openid::OpenIdModule`]: discovery document and key set
//! - [`thirdpartyemailpassword::ThirdPartyEmailPasswordModule`]: the
//!   composite of the two sign-in styles sharing one email verification
//!
//! Users, tokens and sessions live in an external core service reached
//! through the traits in [`providers`]; [`providers::HttpCore`] talks to it
//! over HTTP.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use keyward_auth::config::SessionConfig;
//! use keyward_auth::emailpassword::{EmailPasswordConfig, EmailPasswordModule};
//! use keyward_auth::providers::HttpCore;
//! use keyward_auth::session::SessionModule;
//! use keyward_core::{AppInfo, RegistryBuilder};
//!
//! let app_info = AppInfo::new("My App", "https://api.example.com", "https://example.com");
//! let core = Arc::new(HttpCore::new("http://localhost:3567"));
//!
//! let session = Arc::new(SessionModule::new(&app_info, SessionConfig::new(), core.clone())?);
//! let email_password = Arc::new(EmailPasswordModule::new(
//!     &app_info,
//!     EmailPasswordConfig::new(),
//!     core,
//!     session.recipe(),
//! )?);
//!
//! let registry = RegistryBuilder::new(app_info)
//!     .with_module(email_password)?
//!     .with_module(session)?
//!     .build()?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod config;
pub mod constants;
pub mod emailpassword;
pub mod emailverification;
pub mod openid;
pub mod providers;
pub mod session;
pub mod thirdparty;
pub mod thirdpartyemailpassword;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::{AntiCsrf, SessionConfig, SessionSettings};
pub use emailpassword::{EmailPasswordConfig, EmailPasswordModule};
pub use emailverification::{EmailVerificationConfig, EmailVerificationFeature, EmailVerificationModule};
pub use keyward_core::{Error, Result};
pub use openid::{OpenIdConfig, OpenIdModule};
pub use session::{SessionContainer, SessionModule, VerifySessionOptions};
pub use thirdparty::{ThirdPartyConfig, ThirdPartyModule};
pub use thirdpartyemailpassword::{ThirdPartyEmailPasswordConfig, ThirdPartyEmailPasswordModule};
