//! Wire records returned by EVM nodes.
//!
//! Byte strings (hashes, calldata, bloom filters, log data) use the
//! `alloy-primitives` types, which serialize as `0x`-prefixed lowercase hex.
//! Quantities are decoded from hex and serialized as plain numbers; wei
//! amounts are serialized as decimal strings. Fields that are not modelled
//! explicitly are kept verbatim in `other` so chain-specific extensions still
//! reach the sink.

use crate::rpc::helpers::{amount, quantity};
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Block header subset returned by `eth_getBlockByNumber(height, false)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(with = "quantity")]
    pub number: u64,
    pub hash: B256,
    /// Transaction hashes in on-chain order.
    #[serde(default)]
    pub transactions: Vec<B256>,
}

/// Transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRecord {
    pub hash: B256,
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default, with = "quantity::option")]
    pub transaction_index: Option<u64>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(with = "amount")]
    pub value: U256,
    #[serde(with = "quantity")]
    pub nonce: u64,
    #[serde(with = "quantity")]
    pub gas: u64,
    #[serde(default, with = "amount::option")]
    pub gas_price: Option<U256>,
    #[serde(default, with = "amount::option")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, with = "amount::option")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(rename = "type", default, with = "quantity::option")]
    pub tx_type: Option<u64>,
    #[serde(default, with = "quantity::option")]
    pub chain_id: Option<u64>,
    #[serde(default, with = "quantity::option", skip_serializing_if = "Option::is_none")]
    pub v: Option<u64>,
    #[serde(default, with = "quantity::option", skip_serializing_if = "Option::is_none")]
    pub y_parity: Option<u64>,
    /// EIP-4844 blob transactions only.
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub max_fee_per_blob_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_versioned_hashes: Option<Vec<B256>>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRecord {
    pub transaction_hash: B256,
    #[serde(default, with = "quantity::option")]
    pub transaction_index: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<u64>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(with = "quantity")]
    pub cumulative_gas_used: u64,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(default, with = "amount::option")]
    pub effective_gas_price: Option<U256>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<LogRecord>,
    #[serde(default)]
    pub logs_bloom: Bytes,
    /// `1` for success, `0` for revert. Absent on pre-Byzantium receipts.
    #[serde(default, with = "quantity::option")]
    pub status: Option<u64>,
    #[serde(rename = "type", default, with = "quantity::option")]
    pub tx_type: Option<u64>,
    #[serde(default, with = "quantity::option", skip_serializing_if = "Option::is_none")]
    pub blob_gas_used: Option<u64>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub blob_gas_price: Option<U256>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default, with = "quantity::option")]
    pub transaction_index: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default, with = "quantity::option")]
    pub log_index: Option<u64>,
    #[serde(default)]
    pub removed: bool,
}
