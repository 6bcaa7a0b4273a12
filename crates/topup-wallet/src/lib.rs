//! Wallet capability module for the ROFL top-up system.
//!
//! The orchestrator never talks to a wallet library directly. Instead it is
//! handed a [`WalletInterface`], the narrow set of primitives every wallet
//! connector offers: read and switch the active chain, send transactions,
//! read contracts, wait for receipts and read balances. On top of it this
//! crate builds the chain-switch coordinator, the ERC-20 allowance manager
//! and the balance reader.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;
use topup_types::{ChainId, Transaction, TransactionReceipt};

pub mod allowance;
pub mod balance;
pub mod chain_switch;
pub mod erc20;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

pub use allowance::AllowanceManager;
pub use balance::BalanceReader;
pub use chain_switch::{ChainSwitchSettings, ChainSwitcher};

/// Errors that can occur during wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
	/// No account is connected; a precondition violation rather than a failure.
	#[error("Wallet not connected")]
	NotConnected,
	/// The wallet has no RPC endpoint for the requested chain.
	#[error("No provider configured for chain ID {0}")]
	ChainNotConfigured(ChainId),
	/// The wallet is connected to a different chain than the request targets.
	#[error("Wallet is on chain {active}, request targets chain {requested}")]
	WrongChain { active: ChainId, requested: ChainId },
	/// Error reported by the wallet provider itself, e.g. a user rejection.
	#[error("{message}")]
	Provider {
		message: String,
		short_message: Option<String>,
	},
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// A read-only contract call failed or returned malformed data.
	#[error("Contract call failed: {0}")]
	ContractCall(String),
	/// A transaction was mined but reverted.
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
}

impl WalletError {
	/// Creates a provider error without a short message.
	pub fn provider(message: impl Into<String>) -> Self {
		WalletError::Provider {
			message: message.into(),
			short_message: None,
		}
	}

	/// Short, user-presentable message supplied by the wallet, if any.
	pub fn short_message(&self) -> Option<&str> {
		match self {
			WalletError::Provider { short_message, .. } => short_message.as_deref(),
			_ => None,
		}
	}
}

/// Trait defining the wallet primitives the top-up flow depends on.
///
/// Implementations wrap a concrete wallet connector. The active chain is
/// external, mutable state: callers must re-read it with [`get_chain_id`]
/// before deciding whether a switch is needed.
///
/// [`get_chain_id`]: WalletInterface::get_chain_id
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait WalletInterface: Send + Sync {
	/// Address of the connected account, `None` if disconnected.
	fn address(&self) -> Option<Address>;

	/// Chain the wallet is currently connected to.
	async fn get_chain_id(&self) -> Result<ChainId, WalletError>;

	/// Asks the wallet to change its active chain.
	async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError>;

	/// Signs and submits a transaction, returning its hash.
	async fn send_transaction(&self, tx: Transaction) -> Result<B256, WalletError>;

	/// Executes a read-only call and returns the raw return data.
	async fn read_contract(
		&self,
		chain_id: ChainId,
		to: Address,
		data: Bytes,
	) -> Result<Bytes, WalletError>;

	/// Blocks until the transaction is mined and returns its receipt.
	async fn wait_for_transaction_receipt(
		&self,
		hash: B256,
		chain_id: ChainId,
	) -> Result<TransactionReceipt, WalletError>;

	/// Gets the balance of an address.
	///
	/// For native tokens, pass None for the token parameter.
	async fn get_balance(
		&self,
		address: Address,
		token: Option<Address>,
		chain_id: ChainId,
	) -> Result<U256, WalletError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_short_message_only_for_provider_errors() {
		let err = WalletError::Provider {
			message: "User rejected the request. Details: ... Version: viem@2".to_string(),
			short_message: Some("User rejected the request.".to_string()),
		};
		assert_eq!(err.short_message(), Some("User rejected the request."));
		assert_eq!(
			err.to_string(),
			"User rejected the request. Details: ... Version: viem@2"
		);

		assert_eq!(WalletError::NotConnected.short_message(), None);
		assert_eq!(WalletError::provider("boom").short_message(), None);
	}
}
