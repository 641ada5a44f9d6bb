//! Shared utilities, configuration, and error handling for Chatline
//!
//! This crate provides common functionality used across the Chatline workspace:
//! - Configuration management following 12-factor principles
//! - Error types and their HTTP mapping
//! - State machine error types
//! - Request extractors

pub mod config;
pub mod error;
pub mod extractors;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use extractors::{OwnerId, ValidatedJson, OWNER_HEADER};
pub use state::StateError;
