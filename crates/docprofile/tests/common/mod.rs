//! Shared test utilities for docprofile integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an orchestrator to an in-memory database
//! - Fake collaborators with controllable failures and timing
//! - Builders for document fixtures

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
