//! Cross-chain bridge strategies for ROFL top-ups.
//!
//! A top-up always has the same shape: quote, approve, deposit, wait for
//! settlement. What differs between backends is where the quote comes from,
//! which transaction moves the funds and how settlement is observed. This
//! crate captures that difference behind [`BridgeInterface`] with two
//! implementations:
//!
//! - `router_nitro`: a bridge aggregator reached over HTTP, settlement is
//!   tracked through its status endpoint by source transaction hash.
//! - `paymaster`: a fixed-rate vault/paymaster contract pair, settlement is
//!   tracked on-chain by a payment id derived from the deposit receipt.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use topup_types::{ChainId, NetworksConfig, PaymentId, ProgressStep, Quote};
use topup_wallet::{WalletError, WalletInterface};

pub mod poller;

/// Re-export implementations
pub mod implementations {
	pub mod paymaster;
	pub mod router_nitro;
}

pub use poller::{poll, PollConfig};

/// Errors that can occur during bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
	/// The requested chain is not served by this bridge.
	#[error("Chain {0} is not supported by this bridge")]
	ChainInvalid(ChainId),
	/// Caller supplied an unusable argument.
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	/// Implementation configuration is missing or malformed.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	/// The bridge API answered with a non-success status.
	#[error("Bridge API error ({status}): {message}")]
	Api { status: u16, message: String },
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The bridge API answered with a body that could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The bridge reported the transfer as failed.
	#[error("Bridge transfer failed: {0}")]
	SettlementFailed(String),
	/// The operation was cancelled by the caller.
	#[error("Operation cancelled")]
	Cancelled,
	/// Error raised by the wallet.
	#[error(transparent)]
	Wallet(#[from] WalletError),
}

impl BridgeError {
	/// Returns true for errors that retrying cannot fix.
	///
	/// Pollers stop on terminal errors and keep retrying on everything else.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			BridgeError::ChainInvalid(_)
				| BridgeError::InvalidInput(_)
				| BridgeError::InvalidConfig(_)
				| BridgeError::SettlementFailed(_)
				| BridgeError::Cancelled
		)
	}

	/// Short, user-presentable message, if the underlying wallet supplied one.
	pub fn short_message(&self) -> Option<&str> {
		match self {
			BridgeError::Wallet(e) => e.short_message(),
			_ => None,
		}
	}
}

impl From<reqwest::Error> for BridgeError {
	fn from(err: reqwest::Error) -> Self {
		BridgeError::Network(err.to_string())
	}
}

/// Parameters of a top-up, shared by quoting and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpRequest {
	/// Chain the funds are taken from.
	pub from_chain: ChainId,
	/// Token spent on the source chain.
	pub from_token: Address,
	/// Amount of `from_token` in base units.
	pub amount: U256,
	/// Chain the funds arrive on.
	pub to_chain: ChainId,
	/// Token received on the destination chain.
	pub to_token: Address,
	/// Account paying on the source chain.
	pub sender: Address,
	/// Account credited on the destination chain.
	pub recipient: Address,
}

/// Spender approval needed before the deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Approval {
	pub token: Address,
	pub spender: Address,
	/// Allowance to grant, unlimited when `None`.
	pub amount: Option<U256>,
}

/// How settlement of a submitted deposit is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementHandle {
	/// By source transaction hash, through the bridge's status API.
	SourceTransaction(B256),
	/// By paymaster payment id, on the destination chain.
	Payment(PaymentId),
}

/// Result of submitting the funds-moving transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
	pub tx_hash: B256,
	/// `None` when the deposit went through but cannot be tracked.
	pub handle: Option<SettlementHandle>,
}

/// Confirmation that a transfer settled on the destination chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settlement {
	/// Destination transaction, when the bridge reports one.
	pub destination_tx_hash: Option<String>,
}

/// Trait defining the interface for bridge strategies.
///
/// Every operation that can wait on a remote party observes the provided
/// cancellation token.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait BridgeInterface: Send + Sync {
	/// Name of the implementation, as used in configuration.
	fn name(&self) -> &'static str;

	/// Progress steps presented for a top-up through this bridge.
	///
	/// `estimated_time` is the settlement estimate of the current quote, if
	/// the backend reports one.
	fn progress_steps(
		&self,
		request: &TopUpRequest,
		estimated_time: Option<u64>,
	) -> Vec<ProgressStep>;

	/// Obtains an exchange quote for the request.
	async fn get_quote(&self, request: &TopUpRequest) -> Result<Quote, BridgeError>;

	/// Approval the deposit depends on, `None` for native deposits.
	async fn approval(
		&self,
		request: &TopUpRequest,
		quote: &Quote,
	) -> Result<Option<Approval>, BridgeError>;

	/// Submits the funds-moving transaction and waits for it to be mined.
	async fn submit_deposit(
		&self,
		request: &TopUpRequest,
		quote: &Quote,
	) -> Result<Deposit, BridgeError>;

	/// Polls until the deposit settles.
	///
	/// Returns `Ok(None)` when the attempt budget ran out without a terminal
	/// answer; the transfer may still arrive.
	async fn await_settlement(
		&self,
		request: &TopUpRequest,
		handle: &SettlementHandle,
		cancel: &CancellationToken,
	) -> Result<Option<Settlement>, BridgeError>;

	/// Whether the destination native balance should be watched after
	/// settlement before the flow completes.
	fn waits_for_destination_balance(&self) -> bool;
}

/// Type alias for bridge factory functions.
pub type BridgeFactory = fn(
	&toml::Value,
	Arc<dyn WalletInterface>,
	Arc<NetworksConfig>,
) -> Result<Arc<dyn BridgeInterface>, BridgeError>;

/// Registry trait for bridge implementations.
pub trait BridgeRegistry: topup_types::ImplementationRegistry<Factory = BridgeFactory> {}

/// Get all registered bridge implementations.
///
/// Returns a vector of (name, factory) tuples for all available bridge
/// implementations.
pub fn get_all_implementations() -> Vec<(&'static str, BridgeFactory)> {
	use implementations::{paymaster, router_nitro};
	use topup_types::ImplementationRegistry;

	vec![
		(
			router_nitro::Registry::NAME,
			router_nitro::Registry::factory(),
		),
		(paymaster::Registry::NAME, paymaster::Registry::factory()),
	]
}

/// Builds the implementation registered under `name`.
pub fn create_bridge(
	name: &str,
	config: &toml::Value,
	wallet: Arc<dyn WalletInterface>,
	networks: Arc<NetworksConfig>,
) -> Result<Arc<dyn BridgeInterface>, BridgeError> {
	let factory = get_all_implementations()
		.into_iter()
		.find(|(registered, _)| *registered == name)
		.map(|(_, factory)| factory)
		.ok_or_else(|| BridgeError::InvalidConfig(format!("Unknown bridge implementation '{}'", name)))?;
	factory(config, wallet, networks)
}

/// Display name of a chain, falling back to its id.
pub(crate) fn network_name(networks: &NetworksConfig, chain_id: ChainId) -> String {
	networks
		.get(&chain_id)
		.map(|n| n.name.clone())
		.unwrap_or_else(|| format!("chain {}", chain_id))
}
