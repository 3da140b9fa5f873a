//! Ledger finality implementations.

pub mod rpc;

pub use rpc::{LedgerRpcConfig, RpcLedgerClient};
