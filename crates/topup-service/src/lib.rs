//! Wiring for the ROFL top-up service.
//!
//! Builds the wallet, the configured bridge and the orchestrator from a
//! [`Config`], and resolves the token and amount arguments the command line
//! accepts into the typed values the orchestrator works with.

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, bail, Context};
use std::sync::Arc;
use std::time::Duration;
use topup_bridge::{create_bridge, TopUpRequest};
use topup_config::Config;
use topup_core::{TopUpOrchestrator, TopUpSettings};
use topup_types::{
	is_native_token_str, parse_units, ChainId, NetworkConfig, NetworksConfig, NATIVE_TOKEN_ADDRESS,
};
use topup_wallet::implementations::evm::alloy::create_alloy_wallet;
use topup_wallet::{BalanceReader, ChainSwitchSettings, WalletInterface};

/// A token resolved against the networks configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedToken {
	pub address: Address,
	pub decimals: u8,
}

/// Everything a command needs, built once from configuration.
pub struct TopUpService {
	pub networks: Arc<NetworksConfig>,
	pub wallet: Arc<dyn WalletInterface>,
	pub balances: BalanceReader,
	pub orchestrator: TopUpOrchestrator,
}

/// Builds the service from a validated configuration.
pub fn build_service_from_config(config: &Config) -> anyhow::Result<TopUpService> {
	let networks = Arc::new(config.networks.clone());
	let initial_chain = config
		.wallet
		.initial_chain_id
		.unwrap_or(config.app_chain_id());

	let wallet: Arc<dyn WalletInterface> = Arc::new(
		create_alloy_wallet(&networks, &config.wallet.private_key, initial_chain)
			.context("Failed to create wallet")?,
	);

	let primary = &config.bridge.primary;
	let bridge_config = config
		.bridge
		.implementations
		.get(primary)
		.ok_or_else(|| anyhow!("No configuration for bridge '{}'", primary))?;
	let bridge = create_bridge(primary, bridge_config, wallet.clone(), networks.clone())
		.with_context(|| format!("Failed to create bridge '{}'", primary))?;
	tracing::info!(bridge = bridge.name(), "Loaded bridge");

	let switch_settings = ChainSwitchSettings {
		timeout: config.chain_switch.timeout(),
		settle_delay: config.chain_switch.settle_delay(),
		trust_unsupported_chain_error: config.chain_switch.trust_unsupported_chain_error,
	};
	let settings = TopUpSettings {
		quote_debounce: Duration::from_millis(config.topup.quote_debounce_ms),
		balance_wait_interval: Duration::from_secs(config.topup.balance_wait_interval_seconds),
		balance_wait_timeout: Duration::from_secs(config.topup.balance_wait_timeout_seconds),
	};

	let orchestrator = TopUpOrchestrator::new(
		wallet.clone(),
		bridge,
		config.app_chain_id(),
		switch_settings,
		settings,
	);

	Ok(TopUpService {
		balances: BalanceReader::new(wallet.clone(), networks.clone()),
		networks,
		wallet,
		orchestrator,
	})
}

impl TopUpService {
	pub fn network(&self, chain_id: ChainId) -> anyhow::Result<&NetworkConfig> {
		self.networks
			.get(&chain_id)
			.ok_or_else(|| anyhow!("Chain {} is not configured", chain_id))
	}

	/// Connected account, failing when the wallet has none.
	pub fn account(&self) -> anyhow::Result<Address> {
		self.wallet
			.address()
			.ok_or_else(|| anyhow!("Wallet not connected"))
	}

	/// Builds a request moving `amount` of `token` from `from_chain` to the
	/// native token of the application chain.
	pub fn top_up_request(
		&self,
		from_chain: ChainId,
		token: &str,
		amount: &str,
		recipient: Option<Address>,
	) -> anyhow::Result<TopUpRequest> {
		let token = resolve_token(self.network(from_chain)?, token)?;
		let amount = parse_units(amount, token.decimals)?;
		if amount.is_zero() {
			bail!("Amount must be greater than zero");
		}
		let sender = self.account()?;
		Ok(TopUpRequest {
			from_chain,
			from_token: token.address,
			amount,
			to_chain: self.orchestrator.app_chain_id(),
			to_token: NATIVE_TOKEN_ADDRESS,
			sender,
			recipient: recipient.unwrap_or(sender),
		})
	}

	/// Parses a human readable amount of `token` on `chain_id` into base units.
	pub fn parse_amount(
		&self,
		chain_id: ChainId,
		token: &str,
		amount: &str,
	) -> anyhow::Result<(ResolvedToken, U256)> {
		let token = resolve_token(self.network(chain_id)?, token)?;
		Ok((token, parse_units(amount, token.decimals)?))
	}
}

/// Resolves `token` as `native`, the native symbol, a configured symbol or
/// a configured address.
pub fn resolve_token(network: &NetworkConfig, token: &str) -> anyhow::Result<ResolvedToken> {
	let token = token.trim();
	if token.eq_ignore_ascii_case("native")
		|| token.eq_ignore_ascii_case(&network.native_symbol)
		|| is_native_token_str(token)
	{
		return Ok(ResolvedToken {
			address: NATIVE_TOKEN_ADDRESS,
			decimals: network.native_decimals,
		});
	}

	let known = match token.parse::<Address>() {
		Ok(address) => network.find_token(&address),
		Err(_) => network.find_token_by_symbol(token),
	};
	known
		.map(|t| ResolvedToken {
			address: t.address,
			decimals: t.decimals,
		})
		.ok_or_else(|| anyhow!("Token '{}' is not configured on {}", token, network.name))
}
