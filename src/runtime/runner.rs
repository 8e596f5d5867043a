use crate::processor::tailer::BlockTailer;
use crate::processor::worker_pool::TxProcessorPool;
use crate::rpc::client::{AsyncRpcClient, ChainClient};
use crate::runtime::config::TailerConfig;
use crate::runtime::networks::NetworkRegistry;
use crate::runtime::sink::{JsonStdoutSink, TransactionSink};
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use anyhow::{bail, Context, Result};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wires the client, sink, and telemetry around a [`BlockTailer`] and handles
/// OS signals for graceful shutdowns.
pub struct Runner {
    config: TailerConfig,
    client: Arc<dyn ChainClient>,
    sink: Arc<dyn TransactionSink>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(
        config: TailerConfig,
        client: Arc<dyn ChainClient>,
        sink: Arc<dyn TransactionSink>,
    ) -> Self {
        Self::with_cancellation_token(config, client, sink, CancellationToken::new())
    }

    /// Same as [`Runner::new`] but driven by an externally owned root token.
    pub fn with_cancellation_token(
        config: TailerConfig,
        client: Arc<dyn ChainClient>,
        sink: Arc<dyn TransactionSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            client,
            sink,
            telemetry: Arc::new(Telemetry::default()),
            shutdown,
        }
    }

    /// Builds the JSON-RPC client described by `config`.
    pub fn from_config(config: TailerConfig, sink: Arc<dyn TransactionSink>) -> Result<Self> {
        let client = AsyncRpcClient::from_config(&config)?;
        Ok(Self::new(config, Arc::new(client), sink))
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Verifies the node answers and, when pinned, reports the expected chain id.
    pub async fn connect(&self) -> Result<u64> {
        let chain_id = self.client.chain_id().await.with_context(|| {
            format!(
                "failed to connect to network {} at {}",
                self.config.network(),
                self.config.rpc_url()
            )
        })?;

        if let Some(expected) = self.config.expected_chain_id() {
            if expected != chain_id {
                bail!(
                    "chain id mismatch for network {}: node reports {chain_id}, expected {expected}",
                    self.config.network()
                );
            }
        }

        tracing::info!(
            network = self.config.network(),
            chain_id,
            "connected to node"
        );
        Ok(chain_id)
    }

    /// Connects, then tails the chain until the root token is cancelled or a
    /// fatal error occurs. The poll loop never starts if the connection check fails.
    pub async fn run(&self) -> Result<()> {
        self.connect().await?;

        let reporter_shutdown = self.shutdown.child_token();
        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            reporter_shutdown.clone(),
            self.config.metrics_interval(),
        );

        let pool = TxProcessorPool::new(
            self.config.worker_count(),
            self.sink.clone(),
            self.telemetry.clone(),
        );
        let mut tailer = BlockTailer::new(
            &self.config,
            self.client.clone(),
            pool,
            self.telemetry.clone(),
        );

        tracing::info!(
            network = self.config.network(),
            workers = self.config.worker_count(),
            poll_interval_ms = self.config.poll_interval().as_millis() as u64,
            "tailer started"
        );
        let result = tailer.run(&self.shutdown).await;

        reporter_shutdown.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task failed");
        }

        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    ///
    /// On Ctrl-C the range being processed is allowed to drain before returning.
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        self.run_until_signal(signal::ctrl_c()).await
    }

    async fn run_until_signal<F>(&self, stop_signal: F) -> Result<()>
    where
        F: Future<Output = io::Result<()>>,
    {
        let run = self.run();
        tokio::pin!(run);

        let result = tokio::select! {
            result = &mut run => result,
            signal = stop_signal => {
                match signal {
                    Ok(()) => {
                        tracing::info!("Ctrl-C received; stopping tailer");
                        self.shutdown.cancel();
                    }
                    Err(err) => tracing::warn!(
                        error = %err,
                        "failed to listen for Ctrl-C; only the shutdown token stops the tailer"
                    ),
                }
                run.await
            }
        };

        if result.is_ok() {
            tracing::info!(network = self.config.network(), "monitoring stopped");
        }
        result
    }
}

/// Resolves `network` in the default registry and streams its transactions
/// to stdout until Ctrl-C or a fatal error.
pub async fn run_network(network: &str) -> Result<()> {
    let registry = NetworkRegistry::load_default()?;
    let entry = registry.resolve(network)?;
    let config = TailerConfig::for_network(entry).build()?;
    let runner = Runner::from_config(config, Arc::new(JsonStdoutSink::new()))?;
    runner.run_until_ctrl_c().await
}
