//! API endpoint integration tests
//!
//! Drives the composed router with the in-memory store and the mock
//! completion service.

#![allow(dead_code)]

mod common;
mod conversations;
mod health;
mod messages;
mod pipeline;
