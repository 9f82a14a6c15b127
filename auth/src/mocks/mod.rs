//! Mock provider implementations for testing.
//!
//! This module provides simple, in-memory implementations of all provider traits
//! for use in unit and integration tests.

pub mod core_service;
pub mod email;
pub mod provider;

pub use core_service::MockCore;
pub use email::RecordingEmailDelivery;
pub use provider::MockProvider;
