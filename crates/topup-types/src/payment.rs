//! Payment identifiers for the paymaster settlement path.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deterministic identifier of a paymaster deposit.
///
/// Derived from the positional coordinates of the `PaymentInitiated` log in
/// the deposit receipt, so the same deposit always maps to the same id and
/// settlement lookups are idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub B256);

impl PaymentId {
	/// Returns true for the all-zero id, which the paymaster never issues.
	pub fn is_empty(&self) -> bool {
		self.0.is_zero()
	}
}

impl fmt::Display for PaymentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for PaymentId {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.trim()
			.parse::<B256>()
			.map(PaymentId)
			.map_err(|e| format!("Invalid payment id '{}': {}", s, e))
	}
}

impl From<B256> for PaymentId {
	fn from(value: B256) -> Self {
		Self(value)
	}
}
