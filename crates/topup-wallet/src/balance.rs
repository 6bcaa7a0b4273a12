//! Token and native balance reads.

use crate::erc20::IERC20;
use crate::{WalletError, WalletInterface};
use alloy_primitives::Address;
use alloy_sol_types::SolCall;
use std::sync::Arc;
use topup_types::{format_units, is_native_token, Balance, ChainId, NetworksConfig};

/// Reads balances and decorates them with symbol and decimals.
///
/// Token metadata comes from the networks configuration when the token is
/// listed there, and from the token contract otherwise.
#[derive(Clone)]
pub struct BalanceReader {
	wallet: Arc<dyn WalletInterface>,
	networks: Arc<NetworksConfig>,
}

impl BalanceReader {
	pub fn new(wallet: Arc<dyn WalletInterface>, networks: Arc<NetworksConfig>) -> Self {
		Self { wallet, networks }
	}

	/// Gets the balance of `user` in `token` on `chain_id`.
	pub async fn get_balance(
		&self,
		token: Address,
		user: Address,
		chain_id: ChainId,
	) -> Result<Balance, WalletError> {
		let result = self.read_balance(token, user, chain_id).await;
		if let Err(e) = &result {
			tracing::error!(
				chain_id,
				token = %token,
				user = %user,
				error = %e,
				"Failed to read balance"
			);
		}
		result
	}

	async fn read_balance(
		&self,
		token: Address,
		user: Address,
		chain_id: ChainId,
	) -> Result<Balance, WalletError> {
		let network = self.networks.get(&chain_id);
		let native = is_native_token(&token);

		let (symbol, decimals) = if native {
			let network = network.ok_or(WalletError::ChainNotConfigured(chain_id))?;
			(network.native_symbol.clone(), network.native_decimals)
		} else if let Some(known) = network.and_then(|n| n.find_token(&token)) {
			(known.symbol.clone(), known.decimals)
		} else {
			self.token_metadata(chain_id, token).await?
		};

		let value = self
			.wallet
			.get_balance(user, (!native).then_some(token), chain_id)
			.await?;

		Ok(Balance {
			decimals,
			formatted: format_units(value, decimals),
			symbol,
			value,
		})
	}

	async fn token_metadata(
		&self,
		chain_id: ChainId,
		token: Address,
	) -> Result<(String, u8), WalletError> {
		let data = self
			.wallet
			.read_contract(chain_id, token, IERC20::decimalsCall {}.abi_encode().into())
			.await?;
		let decimals = IERC20::decimalsCall::abi_decode_returns(&data)
			.map_err(|e| WalletError::ContractCall(format!("Invalid decimals response: {}", e)))?;

		let data = self
			.wallet
			.read_contract(chain_id, token, IERC20::symbolCall {}.abi_encode().into())
			.await?;
		let symbol = IERC20::symbolCall::abi_decode_returns(&data)
			.map_err(|e| WalletError::ContractCall(format!("Invalid symbol response: {}", e)))?;

		Ok((symbol, decimals))
	}
}
