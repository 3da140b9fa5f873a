//! Goal-based recurring investment engine for Solana.
//!
//! Tracks each contribution as a batch of per-step transaction rows, derives
//! batch state from the rows instead of storing it, and reconciles in-flight
//! swaps against the ledger in the background.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
