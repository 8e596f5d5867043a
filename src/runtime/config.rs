use crate::rpc::options::{
    DEFAULT_HTTP_REQUEST_LIMIT_BYTES, DEFAULT_HTTP_RESPONSE_LIMIT_BYTES,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::runtime::networks::NetworkEntry;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_WORKER_COUNT: usize = 16;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_RATE_LIMIT_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_RATE_LIMIT_MAX_BACKOFF_SECS: u64 = 10;

/// Runtime configuration for the block tailer.
///
/// All instances must be constructed via [`TailerConfig::builder`] or [`TailerConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailerConfig {
    network: String,
    rpc_url: String,
    expected_chain_id: Option<u64>,
    worker_count: usize,
    poll_interval: Duration,
    rpc_timeout: Duration,
    rate_limit_initial_backoff: Duration,
    rate_limit_max_backoff: Duration,
    metrics_interval: Duration,
    rpc_max_request_body_bytes: usize,
    rpc_max_response_body_bytes: usize,
}

pub struct TailerConfigParams {
    pub network: String,
    pub rpc_url: String,
    pub expected_chain_id: Option<u64>,
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub rpc_timeout: Duration,
    pub rate_limit_initial_backoff: Duration,
    pub rate_limit_max_backoff: Duration,
    pub metrics_interval: Duration,
    pub rpc_max_request_body_bytes: usize,
    pub rpc_max_response_body_bytes: usize,
}

impl TailerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> TailerConfigBuilder {
        TailerConfigBuilder::default()
    }

    /// Seeds a builder with the name, endpoint, and chain id of a registry entry.
    pub fn for_network(entry: &NetworkEntry) -> TailerConfigBuilder {
        let builder = Self::builder()
            .network(entry.name.clone())
            .rpc_url(entry.endpoint.clone());
        match entry.chain_id {
            Some(chain_id) => builder.expected_chain_id(chain_id),
            None => builder,
        }
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`TailerConfig::builder`] when most values use defaults.
    pub fn new(params: TailerConfigParams) -> Result<Self> {
        let TailerConfigParams {
            network,
            rpc_url,
            expected_chain_id,
            worker_count,
            poll_interval,
            rpc_timeout,
            rate_limit_initial_backoff,
            rate_limit_max_backoff,
            metrics_interval,
            rpc_max_request_body_bytes,
            rpc_max_response_body_bytes,
        } = params;

        let config = Self {
            network: trimmed_string(network),
            rpc_url: trimmed_string(rpc_url),
            expected_chain_id,
            worker_count,
            poll_interval,
            rpc_timeout,
            rate_limit_initial_backoff,
            rate_limit_max_backoff,
            metrics_interval,
            rpc_max_request_body_bytes,
            rpc_max_response_body_bytes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Network identifier, used in logs.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Full RPC URL (including scheme) of the node.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Chain id the node must report at startup, if pinned.
    pub fn expected_chain_id(&self) -> Option<u64> {
        self.expected_chain_id
    }

    /// Maximum number of transactions processed concurrently.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Pause between height checks when the chain has not moved.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Per-RPC timeout applied to the JSON-RPC client.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn rate_limit_initial_backoff(&self) -> Duration {
        self.rate_limit_initial_backoff
    }

    pub fn rate_limit_max_backoff(&self) -> Duration {
        self.rate_limit_max_backoff
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Maximum allowed HTTP request body bytes for RPC calls.
    pub fn rpc_max_request_body_bytes(&self) -> usize {
        self.rpc_max_request_body_bytes
    }

    /// Maximum allowed HTTP response body bytes for RPC calls.
    pub fn rpc_max_response_body_bytes(&self) -> usize {
        self.rpc_max_response_body_bytes
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        ensure_not_empty(&self.network, "network")?;
        validate_url(&self.rpc_url)?;

        if self.worker_count == 0 {
            bail!("worker_count must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.rate_limit_initial_backoff.is_zero() {
            bail!("rate_limit_initial_backoff must be greater than 0");
        }

        if self.rate_limit_max_backoff < self.rate_limit_initial_backoff {
            bail!(
                "rate_limit_max_backoff ({:?}) must be at least rate_limit_initial_backoff ({:?})",
                self.rate_limit_max_backoff,
                self.rate_limit_initial_backoff,
            );
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.rpc_max_request_body_bytes == 0 {
            bail!("rpc_max_request_body_bytes must be greater than 0");
        }

        if self.rpc_max_response_body_bytes == 0 {
            bail!("rpc_max_response_body_bytes must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct TailerConfigBuilder {
    network: Option<String>,
    rpc_url: Option<String>,
    expected_chain_id: Option<u64>,
    worker_count: Option<usize>,
    poll_interval: Option<Duration>,
    rpc_timeout: Option<Duration>,
    rate_limit_initial_backoff: Option<Duration>,
    rate_limit_max_backoff: Option<Duration>,
    metrics_interval: Option<Duration>,
    rpc_max_request_body_bytes: Option<usize>,
    rpc_max_response_body_bytes: Option<usize>,
}

impl TailerConfigBuilder {
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn expected_chain_id(mut self, chain_id: u64) -> Self {
        self.expected_chain_id = Some(chain_id);
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn rate_limit_initial_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_initial_backoff = Some(backoff);
        self
    }

    pub fn rate_limit_max_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_max_backoff = Some(backoff);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn rpc_max_request_body_bytes(mut self, bytes: usize) -> Self {
        self.rpc_max_request_body_bytes = Some(bytes);
        self
    }

    pub fn rpc_max_response_body_bytes(mut self, bytes: usize) -> Self {
        self.rpc_max_response_body_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<TailerConfig> {
        let params = TailerConfigParams {
            network: self.network.context("network is required")?,
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            expected_chain_id: self.expected_chain_id,
            worker_count: self.worker_count.unwrap_or(DEFAULT_WORKER_COUNT),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            rate_limit_initial_backoff: self.rate_limit_initial_backoff.unwrap_or_else(|| {
                Duration::from_millis(DEFAULT_RATE_LIMIT_INITIAL_BACKOFF_MS)
            }),
            rate_limit_max_backoff: self
                .rate_limit_max_backoff
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RATE_LIMIT_MAX_BACKOFF_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            rpc_max_request_body_bytes: self
                .rpc_max_request_body_bytes
                .unwrap_or(DEFAULT_HTTP_REQUEST_LIMIT_BYTES),
            rpc_max_response_body_bytes: self
                .rpc_max_response_body_bytes
                .unwrap_or(DEFAULT_HTTP_RESPONSE_LIMIT_BYTES),
        };

        TailerConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("rpc_url must start with http:// or https://");
    }
    Ok(())
}
