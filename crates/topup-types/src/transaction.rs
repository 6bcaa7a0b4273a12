//! Transaction types for the top-up system.
//!
//! This module defines the chain-agnostic transaction request handed to the
//! wallet, and the receipt and log model returned once a transaction is mined.

use crate::ChainId;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A transaction to be signed and submitted by the connected wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	/// Chain the transaction must be submitted on.
	pub chain_id: ChainId,
	/// Recipient contract or account.
	pub to: Address,
	/// Call data.
	#[serde(default)]
	pub data: Bytes,
	/// Native value attached to the call.
	#[serde(default)]
	pub value: U256,
	/// Fixed gas limit, estimated by the wallet when absent.
	#[serde(default)]
	pub gas_limit: Option<u64>,
}

impl Transaction {
	/// Creates a contract call without value or gas limit.
	pub fn call(chain_id: ChainId, to: Address, data: impl Into<Bytes>) -> Self {
		Self {
			chain_id,
			to,
			data: data.into(),
			value: U256::ZERO,
			gas_limit: None,
		}
	}

	/// Sets the native value attached to the transaction.
	pub fn with_value(mut self, value: U256) -> Self {
		self.value = value;
		self
	}

	/// Sets a fixed gas limit.
	pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
		self.gas_limit = Some(gas_limit);
		self
	}
}

/// Event log emitted by a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
	/// Contract address that emitted the log.
	pub address: Address,
	/// Indexed event parameters.
	/// Topic[0] is typically the event signature hash.
	pub topics: Vec<B256>,
	/// Non-indexed event data.
	pub data: Bytes,
	/// Position of the log within its block.
	pub log_index: Option<u64>,
}

/// Transaction receipt containing execution details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub transaction_hash: B256,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Position of the transaction within its block.
	pub transaction_index: Option<u64>,
	/// Whether the transaction executed successfully.
	pub success: bool,
	/// Event logs emitted during transaction execution.
	pub logs: Vec<Log>,
}
