//! Chain identifiers.

/// EIP-155 chain identifier.
pub type ChainId = u64;

/// Oasis Sapphire mainnet, home chain of ROFL applications.
pub const SAPPHIRE_MAINNET: ChainId = 23294;

/// Oasis Sapphire testnet.
pub const SAPPHIRE_TESTNET: ChainId = 23295;

/// Base mainnet, the usual source chain for paymaster deposits.
pub const BASE_MAINNET: ChainId = 8453;

/// Returns true if the chain is one of the Sapphire networks.
pub fn is_sapphire(chain_id: ChainId) -> bool {
	matches!(chain_id, SAPPHIRE_MAINNET | SAPPHIRE_TESTNET)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_is_sapphire() {
		assert!(is_sapphire(SAPPHIRE_MAINNET));
		assert!(is_sapphire(SAPPHIRE_TESTNET));
		assert!(!is_sapphire(BASE_MAINNET));
		assert!(!is_sapphire(1));
	}
}
