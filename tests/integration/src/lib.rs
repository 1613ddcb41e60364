//! End-to-end tests for the LuminaFly dispatch engine
//!
//! This test suite validates:
//! - Repair scenarios (burn-out, dispatch, repair, retirement)
//! - Mutual exclusion of repairs and per-drone exclusivity under concurrency
//! - Engine start/stop semantics and cancellation
//! - Recovery of drones stranded by failed mission legs
//! - The same flows against the SQLite store

pub mod test_utils;

#[cfg(test)]
mod scenario_tests;

#[cfg(test)]
mod concurrency_tests;

#[cfg(test)]
mod engine_tests;

#[cfg(test)]
mod recovery_tests;
