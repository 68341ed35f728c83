//! Test utilities for unit and HTTP-level testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory implementations of the directory and billing-provider ports
//! - Webhook verifier and event handler doubles for dispatcher tests
//! - A builder for `AppState` wired to the in-memory ports

mod app_state_builder;
mod billing_mocks;
mod directory_mocks;
mod factories;
mod webhook_mocks;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use directory_mocks::*;
pub use factories::*;
pub use webhook_mocks::*;
