//! Quote and swap implementations.

pub mod jupiter;

pub use jupiter::{DEFAULT_JUPITER_URL, JupiterConfig, JupiterSwapClient};
