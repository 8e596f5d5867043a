//! Destination for processed transactions.
//!
//! Records are rendered with their serde representation: byte strings as
//! `0x`-prefixed lowercase hex, quantities as integers, wei amounts as
//! decimal strings.

use crate::processor::batch::TxUnit;
use crate::rpc::types::{ReceiptRecord, TxRecord};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::Write;

/// Where a sink failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStage {
    Render,
    Emit,
}

impl fmt::Display for SinkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkStage::Render => f.write_str("render"),
            SinkStage::Emit => f.write_str("emit"),
        }
    }
}

#[derive(Debug)]
pub struct SinkError {
    stage: SinkStage,
    source: anyhow::Error,
}

impl SinkError {
    pub fn render(source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage: SinkStage::Render,
            source: source.into(),
        }
    }

    pub fn emit(source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage: SinkStage::Emit,
            source: source.into(),
        }
    }

    pub fn stage(&self) -> SinkStage {
        self.stage
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink {} failed", self.stage)
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// Per-transaction work performed by the processor pool.
pub trait TransactionSink: Send + Sync {
    fn emit<'a>(&'a self, unit: &'a TxUnit) -> BoxFuture<'a, Result<(), SinkError>>;
}

#[derive(Serialize)]
struct RenderedUnit<'a> {
    transaction: &'a TxRecord,
    receipt: &'a ReceiptRecord,
}

/// Renders the transaction and its receipt as one JSON document.
pub fn render_unit(unit: &TxUnit) -> Result<Value, SinkError> {
    serde_json::to_value(RenderedUnit {
        transaction: &unit.transaction,
        receipt: &unit.receipt,
    })
    .map_err(SinkError::render)
}

/// Prints every unit to stdout as pretty JSON.
///
/// Each document is written while holding the stdout lock, so output from
/// concurrent workers never interleaves.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStdoutSink;

impl JsonStdoutSink {
    pub fn new() -> Self {
        Self
    }
}

fn write_document(out: &mut impl Write, document: &str) -> Result<(), SinkError> {
    writeln!(out, "{document}").map_err(SinkError::emit)?;
    out.flush().map_err(SinkError::emit)
}

impl TransactionSink for JsonStdoutSink {
    fn emit<'a>(&'a self, unit: &'a TxUnit) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let rendered = render_unit(unit)?;
            let document = serde_json::to_string_pretty(&rendered).map_err(SinkError::render)?;
            write_document(&mut std::io::stdout().lock(), &document)
        })
    }
}
