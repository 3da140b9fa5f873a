//! The API layer, containing web handlers and routing.

pub mod admin;
pub mod handlers;
pub mod router;

pub use admin::{ReconcileRequest, ReconcileResponse, reconcile_handler};
pub use handlers::ApiDoc;
pub use router::create_router;
