//! Decides whether a payment can be made directly or needs a top-up first.

use alloy_primitives::{Address, U256};
use topup_types::ChainId;
use topup_wallet::{BalanceReader, WalletError};

/// How a required amount will be funded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingPlan {
	/// The balance already covers the amount.
	Direct,
	/// The balance falls short by `shortfall` base units.
	TopUp { shortfall: U256 },
}

/// Re-reads the balance of `user` and compares it with `required`.
pub async fn plan_funding(
	balances: &BalanceReader,
	user: Address,
	chain_id: ChainId,
	token: Address,
	required: U256,
) -> Result<FundingPlan, WalletError> {
	let balance = balances.get_balance(token, user, chain_id).await?;
	let plan = if balance.value >= required {
		FundingPlan::Direct
	} else {
		FundingPlan::TopUp {
			shortfall: required - balance.value,
		}
	};
	tracing::debug!(
		chain_id,
		balance = %balance.formatted,
		symbol = %balance.symbol,
		?plan,
		"Planned funding"
	);
	Ok(plan)
}
