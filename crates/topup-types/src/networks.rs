//! Network configuration types for multi-chain top-up operations.
//!
//! This module defines the per-network settings the wallet and bridge crates
//! need: RPC endpoints, native currency metadata and the tokens that can be
//! used as a top-up source on each chain.

use crate::ChainId;
use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Configuration for a token on a specific network.
///
/// # Fields
///
/// * `address` - The on-chain address of the token contract
/// * `symbol` - The token symbol (e.g., "USDC")
/// * `decimals` - The number of decimal places for the token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TokenConfig {
	pub address: Address,
	pub symbol: String,
	pub decimals: u8,
}

/// Configuration for a single blockchain network.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Human readable network name, used in progress descriptions.
	pub name: String,
	/// HTTP RPC endpoints, the first one is used and the rest are fallbacks.
	pub rpc_urls: Vec<String>,
	/// Symbol of the native gas token.
	#[serde(default = "default_native_symbol")]
	pub native_symbol: String,
	/// Decimals of the native gas token.
	#[serde(default = "default_native_decimals")]
	pub native_decimals: u8,
	/// Tokens known on this network.
	#[serde(default)]
	pub tokens: Vec<TokenConfig>,
}

fn default_native_symbol() -> String {
	"ETH".to_string()
}

fn default_native_decimals() -> u8 {
	18
}

impl NetworkConfig {
	/// Get the first available HTTP URL.
	pub fn get_http_url(&self) -> Option<&str> {
		self.rpc_urls.first().map(String::as_str)
	}

	/// Looks up a configured token by address.
	pub fn find_token(&self, address: &Address) -> Option<&TokenConfig> {
		self.tokens.iter().find(|token| &token.address == address)
	}

	/// Looks up a configured token by symbol, case-insensitively.
	pub fn find_token_by_symbol(&self, symbol: &str) -> Option<&TokenConfig> {
		self.tokens
			.iter()
			.find(|token| token.symbol.eq_ignore_ascii_case(symbol))
	}
}

/// Networks configuration mapping chain IDs to their configurations.
///
/// Chain IDs are provided as string keys in TOML and converted to integers
/// by [`deserialize_networks`].
pub type NetworksConfig = HashMap<ChainId, NetworkConfig>;

/// Helper function to deserialize network configurations from TOML.
///
/// # Errors
///
/// Returns a deserialization error if a chain ID key cannot be parsed as a u64.
pub fn deserialize_networks<'de, D>(deserializer: D) -> Result<NetworksConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, NetworkConfig> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		result.insert(chain_id, value);
	}

	Ok(result)
}
