//! Shared test helpers and mock collaborators.

pub mod mocks;

pub use mocks::{
    MockConfig, MockDatabaseClient, MockLedgerClient, MockNotifier, MockSessionProvider,
    MockSwapClient, RecordedEvent, sample_goal,
};
