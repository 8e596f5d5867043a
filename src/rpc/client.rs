//! RPC client implementation and reusable abstractions for reading blocks,
//! transactions, and receipts from EVM nodes via JSON-RPC. Houses the
//! `AsyncRpcClient`, error types, and the `ChainClient` trait consumed by the
//! tailer.

use crate::rpc::helpers::{parse_quantity, to_quantity};
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::types::{Block, ReceiptRecord, TxRecord};
use crate::runtime::config::TailerConfig;
use alloy_primitives::B256;
use anyhow::{anyhow, bail, Context, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    http_helpers::HttpError,
    params::BatchRequestBuilder,
};
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::types::ErrorObject;
use serde::de::DeserializeOwned;
use std::{fmt, sync::Arc};
use tokio::time::{timeout, Instant};

/// HTTP status and JSON-RPC code providers use to signal throttling.
const RATE_LIMIT_STATUS: u16 = 429;
/// EIP-1474 "limit exceeded".
const LIMIT_EXCEEDED_CODE: i32 = -32005;

#[derive(Debug)]
pub enum RpcError {
    RateLimited {
        method: &'static str,
        code: i64,
    },
    Timeout {
        method: &'static str,
    },
    ResponseTooLarge {
        method: &'static str,
    },
    MissingRecord {
        method: &'static str,
        key: String,
    },
    CountMismatch {
        method: &'static str,
        expected: usize,
        got: usize,
    },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::RateLimited { method, code } => {
                write!(f, "rpc {method} was rate limited (code={code})")
            }
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::ResponseTooLarge { method } => {
                write!(f, "rpc {method} response exceeded HTTP size limits")
            }
            RpcError::MissingRecord { method, key } => {
                write!(f, "rpc {method} returned null for {key}")
            }
            RpcError::CountMismatch {
                method,
                expected,
                got,
            } => write!(
                f,
                "rpc {method} returned mismatched result count (expected {expected}, got {got})"
            ),
        }
    }
}

impl std::error::Error for RpcError {}

/// Returns `true` when any error in the chain is a throttling signal from the node.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<RpcError>(),
            Some(RpcError::RateLimited { .. })
        )
    })
}

/// Remote chain capability consumed by the tailer. Batched methods answer in
/// request order or fail as a whole.
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> BoxFuture<'_, Result<u64>>;

    fn current_height(&self) -> BoxFuture<'_, Result<u64>>;

    fn batch_get_blocks<'a>(&'a self, heights: &'a [u64]) -> BoxFuture<'a, Result<Vec<Block>>>;

    fn batch_get_transactions<'a>(
        &'a self,
        hashes: &'a [B256],
    ) -> BoxFuture<'a, Result<Vec<TxRecord>>>;

    fn batch_get_receipts<'a>(
        &'a self,
        hashes: &'a [B256],
    ) -> BoxFuture<'a, Result<Vec<ReceiptRecord>>>;
}

#[derive(Debug, Clone)]
pub struct AsyncRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
}

impl ChainClient for AsyncRpcClient {
    fn chain_id(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.chain_id())
    }

    fn current_height(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.current_height())
    }

    fn batch_get_blocks<'a>(&'a self, heights: &'a [u64]) -> BoxFuture<'a, Result<Vec<Block>>> {
        Box::pin(self.batch_get_blocks(heights))
    }

    fn batch_get_transactions<'a>(
        &'a self,
        hashes: &'a [B256],
    ) -> BoxFuture<'a, Result<Vec<TxRecord>>> {
        Box::pin(self.batch_get_transactions(hashes))
    }

    fn batch_get_receipts<'a>(
        &'a self,
        hashes: &'a [B256],
    ) -> BoxFuture<'a, Result<Vec<ReceiptRecord>>> {
        Box::pin(self.batch_get_receipts(hashes))
    }
}

impl AsyncRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: RpcClientOptions) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    pub fn from_config(config: &TailerConfig) -> Result<Self> {
        config.validate()?;
        let options = RpcClientOptions {
            max_concurrent_requests: std::cmp::max(32, config.worker_count().saturating_mul(4)),
            request_timeout: config.rpc_timeout(),
            max_request_body_bytes: config.rpc_max_request_body_bytes(),
            max_response_body_bytes: config.rpc_max_response_body_bytes(),
        };
        Self::with_options(config.rpc_url().to_owned(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let raw: String = self.request("eth_chainId").await?;
        parse_quantity(&raw).context("failed to parse eth_chainId response")
    }

    pub async fn current_height(&self) -> Result<u64> {
        let raw: String = self.request("eth_blockNumber").await?;
        let height = parse_quantity(&raw).context("failed to parse eth_blockNumber response")?;
        tracing::debug!(height, "refreshed chain height");
        Ok(height)
    }

    pub async fn batch_get_blocks(&self, heights: &[u64]) -> Result<Vec<Block>> {
        const METHOD: &str = "eth_getBlockByNumber";

        if heights.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = BatchRequestBuilder::new();
        for height in heights {
            batch
                .insert(METHOD, rpc_params![to_quantity(*height), false])
                .context("failed to serialize eth_getBlockByNumber params")?;
        }

        let entries: Vec<Option<Block>> = self.execute_batch(batch, METHOD, heights.len()).await?;

        let mut blocks = Vec::with_capacity(entries.len());
        for (height, entry) in heights.iter().copied().zip(entries) {
            let block = entry.ok_or_else(|| RpcError::MissingRecord {
                method: METHOD,
                key: format!("height {height}"),
            })?;
            if block.number != height {
                bail!(
                    "rpc {METHOD} returned block {} for requested height {height}",
                    block.number
                );
            }
            blocks.push(block);
        }

        Ok(blocks)
    }

    pub async fn batch_get_transactions(&self, hashes: &[B256]) -> Result<Vec<TxRecord>> {
        self.batch_by_hash("eth_getTransactionByHash", hashes).await
    }

    pub async fn batch_get_receipts(&self, hashes: &[B256]) -> Result<Vec<ReceiptRecord>> {
        self.batch_by_hash("eth_getTransactionReceipt", hashes)
            .await
    }

    async fn batch_by_hash<R>(&self, method: &'static str, hashes: &[B256]) -> Result<Vec<R>>
    where
        R: DeserializeOwned + fmt::Debug + Send + 'static,
    {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = BatchRequestBuilder::new();
        for hash in hashes {
            batch
                .insert(method, rpc_params![hash])
                .with_context(|| format!("failed to serialize {method} params"))?;
        }

        let entries: Vec<Option<R>> = self.execute_batch(batch, method, hashes.len()).await?;

        hashes
            .iter()
            .zip(entries)
            .map(|(hash, entry)| {
                entry.ok_or_else(|| {
                    RpcError::MissingRecord {
                        method,
                        key: format!("hash {hash}"),
                    }
                    .into()
                })
            })
            .collect()
    }

    async fn request<R>(&self, method: &'static str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let outcome = match timeout(
            self.options.request_timeout,
            self.client.request(method, rpc_params![]),
        )
        .await
        {
            Ok(result) => result.map_err(|err| map_rpc_error(method, err)),
            Err(_) => Err(RpcError::Timeout { method }.into()),
        };
        self.record_outcome(start, &outcome);
        outcome
    }

    async fn execute_batch<'a, R>(
        &self,
        batch: BatchRequestBuilder<'a>,
        method: &'static str,
        expected: usize,
    ) -> Result<Vec<R>>
    where
        R: DeserializeOwned + fmt::Debug + 'static,
    {
        let start = Instant::now();
        let outcome = self.execute_batch_once(batch, method, expected).await;
        self.record_outcome(start, &outcome);

        if let Ok(values) = &outcome {
            tracing::debug!(
                method,
                count = values.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "batch RPC call completed"
            );
        }

        outcome
    }

    async fn execute_batch_once<'a, R>(
        &self,
        batch: BatchRequestBuilder<'a>,
        method: &'static str,
        expected: usize,
    ) -> Result<Vec<R>>
    where
        R: DeserializeOwned + fmt::Debug + 'static,
    {
        let response = timeout(
            self.options.request_timeout,
            self.client.batch_request(batch),
        )
        .await
        .map_err(|_| RpcError::Timeout { method })?
        .map_err(|err| map_rpc_error(method, err))?;

        let mut values = Vec::with_capacity(expected);
        for entry in response.into_iter() {
            match entry {
                Ok(value) => values.push(value),
                Err(err) => return Err(map_rpc_batch_error(method, &err)),
            }
        }

        if values.len() != expected {
            return Err(RpcError::CountMismatch {
                method,
                expected,
                got: values.len(),
            }
            .into());
        }

        Ok(values)
    }

    fn record_outcome<T>(&self, start: Instant, outcome: &Result<T>) {
        let elapsed = start.elapsed();
        match outcome {
            Ok(_) => self.metrics.record_success(elapsed),
            Err(err) => match err.downcast_ref::<RpcError>() {
                Some(RpcError::RateLimited { .. }) => self.metrics.record_rate_limited(elapsed),
                Some(RpcError::Timeout { .. }) => self.metrics.record_timeout(elapsed),
                _ => self.metrics.record_failure(elapsed),
            },
        }
    }
}

fn map_rpc_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method }.into();
    }
    if let Some(code) = rate_limit_code(&err) {
        return RpcError::RateLimited { method, code }.into();
    }
    anyhow!("rpc {method} call failed: {err}")
}

fn map_rpc_batch_error(method: &'static str, err: &ErrorObject<'_>) -> anyhow::Error {
    if is_rate_limit_code(err.code()) {
        return RpcError::RateLimited {
            method,
            code: i64::from(err.code()),
        }
        .into();
    }

    if let Some(data) = err.data() {
        anyhow!(
            "rpc {method} call failed (code={}, message={}, data={})",
            err.code(),
            err.message(),
            data.get()
        )
    } else {
        anyhow!(
            "rpc {method} call failed (code={}, message={})",
            err.code(),
            err.message()
        )
    }
}

fn is_rate_limit_code(code: i32) -> bool {
    code == i32::from(RATE_LIMIT_STATUS) || code == LIMIT_EXCEEDED_CODE
}

fn rate_limit_code(err: &JsonRpcError) -> Option<i64> {
    match err {
        JsonRpcError::Call(object) if is_rate_limit_code(object.code()) => {
            Some(i64::from(object.code()))
        }
        JsonRpcError::Transport(inner) => match inner.downcast_ref::<HttpTransportError>() {
            Some(HttpTransportError::Rejected { status_code })
                if *status_code == RATE_LIMIT_STATUS =>
            {
                Some(i64::from(*status_code))
            }
            _ => None,
        },
        _ => None,
    }
}

fn response_too_large(err: &JsonRpcError) -> bool {
    match err {
        JsonRpcError::Transport(inner) => {
            if let Some(transport_err) = inner.downcast_ref::<HttpTransportError>() {
                match transport_err {
                    HttpTransportError::Http(http_err) => matches!(http_err, HttpError::TooLarge),
                    HttpTransportError::RequestTooLarge => true,
                    _ => false,
                }
            } else {
                false
            }
        }
        _ => false,
    }
}
