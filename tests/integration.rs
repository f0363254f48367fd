//! Integration test entry point.
//!
//! Individual test modules live in tests/integration/.
//!
//! Run all integration tests:
//!   cargo test --test integration
//!
//! Run a specific module:
//!   cargo test --test integration analyzer

#[path = "integration/analyzer_tests.rs"]
mod analyzer_tests;

#[path = "integration/fixture_tests.rs"]
mod fixture_tests;
