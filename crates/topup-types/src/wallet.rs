//! Wallet-facing result types.

use crate::ChainId;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Outcome of a chain switch request.
///
/// A failed switch is reported here rather than raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSwitchResult {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl ChainSwitchResult {
	pub fn ok() -> Self {
		Self {
			success: true,
			error: None,
		}
	}

	pub fn failed(chain_id: ChainId) -> Self {
		Self {
			success: false,
			error: Some(format!("Failed to switch to chain (Chain ID: {}).", chain_id)),
		}
	}
}

/// Balance of a token for an address on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
	pub decimals: u8,
	pub formatted: String,
	pub symbol: String,
	pub value: U256,
}
