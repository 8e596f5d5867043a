//! JSON-RPC client plumbing for EVM nodes: batching, throttling
//! classification, metrics, wire records, and quantity helpers.

pub mod client;
pub mod helpers;
pub mod metrics;
pub mod options;
pub mod types;

pub use client::{is_rate_limited, AsyncRpcClient, ChainClient, RpcError};
pub use helpers::{parse_quantity, to_quantity};
pub use metrics::RpcMetricsSnapshot;
pub use options::RpcClientOptions;
pub use types::{Block, LogRecord, ReceiptRecord, TxRecord};
