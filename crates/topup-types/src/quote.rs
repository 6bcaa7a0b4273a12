//! Exchange quotes returned by the bridge implementations.
//!
//! A quote answers "how much destination asset is received for a given
//! source amount". The aggregator variant keeps the full backend response so
//! it can be handed back verbatim to the transaction-build endpoint.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token descriptor as returned by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
	pub address: String,
	pub symbol: String,
	pub decimals: u8,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// One side (source or destination) of an aggregator quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLeg {
	pub chain_id: String,
	pub asset: AssetInfo,
	pub token_amount: String,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Estimated bridge fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeInfo {
	pub amount: String,
	pub decimals: u8,
	pub symbol: String,
}

/// Structured quote from the bridge aggregator HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NitroQuote {
	pub source: QuoteLeg,
	pub destination: QuoteLeg,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bridge_fee: Option<FeeInfo>,
	/// Estimated settlement time in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub estimated_time: Option<u64>,
	/// Spender the source token must be approved for.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub allowance_to: Option<Address>,
	/// Remaining transaction-construction parameters, passed through untouched.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Exchange quote, independent of the backing implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum Quote {
	/// Structured response from the bridge aggregator.
	Nitro(Box<NitroQuote>),
	/// Destination amount computed by a fixed-rate on-chain contract.
	FixedRate { amount: U256 },
}

impl Quote {
	/// Amount of destination asset that will be received, in base units.
	///
	/// Returns `None` when the aggregator reported an unparseable amount.
	pub fn destination_amount(&self) -> Option<U256> {
		match self {
			Quote::Nitro(quote) => quote.destination.token_amount.parse().ok(),
			Quote::FixedRate { amount } => Some(*amount),
		}
	}

	/// Estimated settlement time in seconds, if the backend reports one.
	pub fn estimated_time(&self) -> Option<u64> {
		match self {
			Quote::Nitro(quote) => quote.estimated_time,
			Quote::FixedRate { .. } => None,
		}
	}

	/// Returns the aggregator quote, if this is one.
	pub fn as_nitro(&self) -> Option<&NitroQuote> {
		match self {
			Quote::Nitro(quote) => Some(quote),
			Quote::FixedRate { .. } => None,
		}
	}
}
