//! Outbound event notification implementations.

pub mod webhook;

pub use webhook::{WebhookConfig, WebhookNotifier};
