//! ERC-20 allowance management.

use crate::erc20::IERC20;
use crate::{WalletError, WalletInterface};
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use std::sync::Arc;
use topup_types::{is_native_token, ChainId, Transaction};

/// Ensures a spender may move at least a required amount of a user's tokens.
#[derive(Clone)]
pub struct AllowanceManager {
	wallet: Arc<dyn WalletInterface>,
}

impl AllowanceManager {
	pub fn new(wallet: Arc<dyn WalletInterface>) -> Self {
		Self { wallet }
	}

	/// Reads the current allowance of `spender` over `owner`'s `token`.
	pub async fn allowance(
		&self,
		chain_id: ChainId,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, WalletError> {
		let call = IERC20::allowanceCall { owner, spender };
		let result = self
			.wallet
			.read_contract(chain_id, token, call.abi_encode().into())
			.await?;
		IERC20::allowanceCall::abi_decode_returns(&result)
			.map_err(|e| WalletError::ContractCall(format!("Invalid allowance response: {}", e)))
	}

	/// Approves `spender` when the current allowance is below `required`.
	///
	/// Native tokens need no approval and return immediately. When an
	/// approval is needed it is for `allowance_to_set`, or unlimited when
	/// `None`, and this call only returns once the approval is mined.
	pub async fn check_and_set_erc20_allowance(
		&self,
		chain_id: ChainId,
		token: Address,
		spender: Address,
		required: U256,
		owner: Address,
		allowance_to_set: Option<U256>,
	) -> Result<(), WalletError> {
		if is_native_token(&token) {
			return Ok(());
		}

		let current = self.allowance(chain_id, token, owner, spender).await?;
		if current >= required {
			tracing::debug!(
				token = %token,
				spender = %spender,
				allowance = %current,
				"Allowance already sufficient"
			);
			return Ok(());
		}

		let amount = allowance_to_set.unwrap_or(U256::MAX);
		let call = IERC20::approveCall { spender, amount };
		let tx = Transaction::call(chain_id, token, call.abi_encode());
		let hash = self.wallet.send_transaction(tx).await?;
		tracing::info!(token = %token, spender = %spender, tx_hash = %hash, "Submitted approval");

		let receipt = self.wallet.wait_for_transaction_receipt(hash, chain_id).await?;
		if !receipt.success {
			return Err(WalletError::TransactionFailed(format!(
				"Approval {} reverted",
				hash
			)));
		}
		tracing::info!(token = %token, spender = %spender, "Approval confirmed");
		Ok(())
	}
}
