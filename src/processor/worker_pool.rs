//! Bounded fan-out of transaction units to the sink.
//!
//! A single semaphore lives for the whole run, so the concurrency bound is
//! shared by every cycle. A batch returns only after every unit finished;
//! failures are collected and the first one (by submission order) is
//! reported after the drain.

use crate::processor::batch::TxUnit;
use crate::runtime::sink::TransactionSink;
use crate::runtime::telemetry::Telemetry;
use alloy_primitives::B256;
use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

pub struct TxProcessorPool {
    permits: Arc<Semaphore>,
    worker_count: usize,
    sink: Arc<dyn TransactionSink>,
    telemetry: Arc<Telemetry>,
}

impl TxProcessorPool {
    pub fn new(
        worker_count: usize,
        sink: Arc<dyn TransactionSink>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        Self {
            permits: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            sink,
            telemetry,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Processes every unit, at most `worker_count` at a time.
    ///
    /// Returns the number of units processed. If any unit failed, the error of
    /// the earliest failing unit is returned once all units completed.
    pub async fn process_batch(&self, units: Vec<TxUnit>) -> Result<usize> {
        let submitted = units.len();
        let mut keys = Vec::with_capacity(submitted);
        let mut handles = Vec::with_capacity(submitted);

        for unit in units {
            keys.push((unit.height, unit.hash));
            let permits = self.permits.clone();
            let sink = self.sink.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .context("transaction processor pool is closed")?;
                sink.emit(&unit).await.map_err(anyhow::Error::new)
            }));
        }

        let outcomes = join_all(handles).await;

        let mut failed = 0u64;
        let mut first_error = None;
        for ((height, hash), outcome) in keys.into_iter().zip(outcomes) {
            let result = match outcome {
                Ok(result) => result,
                Err(join_err) => Err(join_failure(join_err)),
            };

            if let Err(err) = result {
                failed += 1;
                tracing::error!(
                    height,
                    tx = %hash,
                    error = %format!("{err:#}"),
                    "transaction processing failed"
                );
                if first_error.is_none() {
                    first_error = Some(unit_error(err, height, hash));
                }
            }
        }

        self.telemetry.record_failed_units(failed);

        match first_error {
            Some(err) => Err(err),
            None => Ok(submitted),
        }
    }
}

fn unit_error(err: anyhow::Error, height: u64, hash: B256) -> anyhow::Error {
    err.context(format!(
        "failed to process transaction {hash} in block {height}"
    ))
}

fn join_failure(err: JoinError) -> anyhow::Error {
    if err.is_panic() {
        let payload = err.into_panic();
        anyhow!("transaction worker panicked: {}", panic_message(payload.as_ref()))
    } else {
        anyhow!("transaction worker was cancelled")
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
