//! Shared test utilities for invoflow integration tests.
//!
//! This module provides:
//! - `TestHarness`, an in-memory pipeline with scripted collaborators
//! - Builders for configs and file rows

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RecordingNotifier, ScriptedAnalysis, TestHarness, OWNER_EMAIL, OWNER_ID};
