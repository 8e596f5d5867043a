pub mod processor;
pub mod rpc;
pub mod runtime;

pub use processor::batch::{BatchFetcher, BlockRange, CycleReport, FetchedRange, TxUnit};
pub use processor::cursor::Cursor;
pub use processor::tailer::BlockTailer;
pub use processor::worker_pool::TxProcessorPool;
pub use rpc::{is_rate_limited, AsyncRpcClient, ChainClient, RpcClientOptions, RpcError};
pub use runtime::config::{TailerConfig, TailerConfigBuilder, TailerConfigParams};
pub use runtime::networks::{NetworkEntry, NetworkRegistry};
pub use runtime::runner::{run_network, Runner};
pub use runtime::sink::{render_unit, JsonStdoutSink, SinkError, SinkStage, TransactionSink};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
