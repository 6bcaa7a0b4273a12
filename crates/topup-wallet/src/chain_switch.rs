//! Chain-switch coordinator.
//!
//! Asks the connected wallet to move to a target chain. A failed switch is
//! reported as a [`ChainSwitchResult`] rather than an error, and a wallet that
//! never answers is cut off by a timeout so it cannot hang the top-up flow.

use crate::{WalletError, WalletInterface};
use alloy_primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use topup_types::{ChainId, ChainSwitchResult};

/// Error text some wallets report after a switch that actually went through.
const UNSUPPORTED_CHAIN_MARKER: &str = "Unsupported Chain";

/// Timing and heuristics of the chain-switch coordinator.
#[derive(Debug, Clone)]
pub struct ChainSwitchSettings {
	/// Maximum time to wait for the wallet to acknowledge the switch.
	pub timeout: Duration,
	/// Delay after a successful switch before reporting success.
	pub settle_delay: Duration,
	/// Treat an "Unsupported Chain" error as a successful switch.
	pub trust_unsupported_chain_error: bool,
}

impl Default for ChainSwitchSettings {
	fn default() -> Self {
		Self {
			timeout: Duration::from_secs(3),
			settle_delay: Duration::from_secs(1),
			trust_unsupported_chain_error: true,
		}
	}
}

/// Coordinates wallet chain switches.
#[derive(Clone)]
pub struct ChainSwitcher {
	wallet: Arc<dyn WalletInterface>,
	settings: ChainSwitchSettings,
}

impl ChainSwitcher {
	pub fn new(wallet: Arc<dyn WalletInterface>, settings: ChainSwitchSettings) -> Self {
		Self { wallet, settings }
	}

	/// Switches the wallet to `target`.
	///
	/// Returns `Err(WalletError::NotConnected)` when no address is connected.
	/// Every other failure, including a timeout, is reported through the
	/// returned [`ChainSwitchResult`].
	pub async fn switch_to_chain(
		&self,
		target: ChainId,
		address: Option<Address>,
	) -> Result<ChainSwitchResult, WalletError> {
		if address.is_none() {
			return Err(WalletError::NotConnected);
		}

		// The user may have switched manually, so always re-read.
		match self.wallet.get_chain_id().await {
			Ok(current) if current == target => return Ok(ChainSwitchResult::ok()),
			Ok(current) => {
				tracing::debug!(from = current, to = target, "Switching wallet chain");
			},
			Err(e) => {
				tracing::warn!(to = target, error = %e, "Could not read current chain, switching anyway");
			},
		}

		match tokio::time::timeout(self.settings.timeout, self.wallet.switch_chain(target)).await {
			Ok(Ok(())) => {
				tokio::time::sleep(self.settings.settle_delay).await;
				tracing::info!(chain_id = target, "Switched wallet chain");
				Ok(ChainSwitchResult::ok())
			},
			Ok(Err(e)) if e.to_string().contains(UNSUPPORTED_CHAIN_MARKER) => {
				tracing::warn!(
					chain_id = target,
					error = %e,
					"Wallet reported an unsupported chain after switching"
				);
				if self.settings.trust_unsupported_chain_error {
					Ok(ChainSwitchResult::ok())
				} else {
					Ok(self.verify_active_chain(target).await)
				}
			},
			Ok(Err(e)) => {
				tracing::error!(chain_id = target, error = %e, "Chain switch failed");
				Ok(ChainSwitchResult::failed(target))
			},
			Err(_) => {
				tracing::warn!(
					chain_id = target,
					timeout_ms = self.settings.timeout.as_millis() as u64,
					"Chain switch timed out"
				);
				Ok(ChainSwitchResult::failed(target))
			},
		}
	}

	async fn verify_active_chain(&self, target: ChainId) -> ChainSwitchResult {
		match self.wallet.get_chain_id().await {
			Ok(current) if current == target => ChainSwitchResult::ok(),
			_ => ChainSwitchResult::failed(target),
		}
	}
}
