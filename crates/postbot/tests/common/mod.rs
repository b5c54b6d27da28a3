//! Shared test utilities for postbot integration tests.
//!
//! This module provides:
//! - `TestHarness` for an isolated job store in a temp directory
//! - Fake venue, feed, generator, image backend and toxicity scorer

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
