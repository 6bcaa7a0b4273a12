//! Alloy-backed wallet.
//!
//! Signs with a local private key and keeps one provider per configured
//! network. The "active chain" is tracked locally, mirroring the connector
//! model the top-up flow is written against: transactions are only accepted
//! for the chain the wallet is currently switched to, while reads may target
//! any configured chain.

use crate::erc20::IERC20;
use crate::{WalletError, WalletInterface};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{
	fillers::{ChainIdFiller, GasFiller, NonceFiller, SimpleNonceManager},
	DynProvider, PendingTransactionConfig, PendingTransactionError, Provider, ProviderBuilder,
};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use alloy_transport::{layers::RetryBackoffLayer, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use topup_types::{
	ChainId, Log, NetworksConfig, SecretString, Transaction, TransactionReceipt,
};

/// Upper bound on waiting for a transaction to be mined.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Wallet backed by a local signer and Alloy HTTP providers.
pub struct AlloyWallet {
	/// Alloy providers for each configured network.
	providers: HashMap<ChainId, DynProvider>,
	address: Address,
	active_chain: AtomicU64,
}

impl AlloyWallet {
	/// Creates a wallet with a provider for every network in `networks`.
	///
	/// The wallet starts out on `initial_chain_id`, which must be one of the
	/// configured networks.
	pub fn new(
		networks: &NetworksConfig,
		signer: PrivateKeySigner,
		initial_chain_id: ChainId,
	) -> Result<Self, WalletError> {
		if !networks.contains_key(&initial_chain_id) {
			return Err(WalletError::ChainNotConfigured(initial_chain_id));
		}

		let address = signer.address();
		let mut providers = HashMap::new();

		for (chain_id, network) in networks {
			let http_url = network.get_http_url().ok_or_else(|| {
				WalletError::Network(format!("No HTTP RPC URL configured for network {}", chain_id))
			})?;
			let url = http_url.parse().map_err(|e| {
				WalletError::Network(format!("Invalid RPC URL for network {}: {}", chain_id, e))
			})?;

			let wallet = EthereumWallet::from(signer.clone().with_chain_id(Some(*chain_id)));

			// Retry up to 5 times, 1s initial backoff, 10 compute units per second
			let retry_layer = RetryBackoffLayer::new(5, 1000, 10);
			let client = RpcClient::builder().layer(retry_layer).http(url);

			let provider = ProviderBuilder::new()
				.filler(NonceFiller::new(SimpleNonceManager::default()))
				.filler(GasFiller)
				.filler(ChainIdFiller::default())
				.wallet(wallet)
				.connect_client(client);
			provider.client().set_poll_interval(Duration::from_secs(2));

			providers.insert(*chain_id, provider.erased());
		}

		Ok(Self {
			providers,
			address,
			active_chain: AtomicU64::new(initial_chain_id),
		})
	}

	fn get_provider(&self, chain_id: ChainId) -> Result<&DynProvider, WalletError> {
		self.providers
			.get(&chain_id)
			.ok_or(WalletError::ChainNotConfigured(chain_id))
	}
}

/// Maps a transport error to a wallet error, keeping the RPC error message
/// as the short message when the node returned one.
fn provider_error(context: &str, err: TransportError) -> WalletError {
	let short_message = err.as_error_resp().map(|payload| payload.message.to_string());
	WalletError::Provider {
		message: format!("{}: {}", context, err),
		short_message,
	}
}

fn convert_receipt(receipt: &alloy_rpc_types::TransactionReceipt) -> TransactionReceipt {
	let logs = receipt
		.inner
		.logs()
		.iter()
		.map(|log| Log {
			address: log.address(),
			topics: log.topics().to_vec(),
			data: log.inner.data.data.clone(),
			log_index: log.log_index,
		})
		.collect();

	TransactionReceipt {
		transaction_hash: receipt.transaction_hash,
		block_number: receipt.block_number.unwrap_or(0),
		transaction_index: receipt.transaction_index,
		success: receipt.status(),
		logs,
	}
}

#[async_trait]
impl WalletInterface for AlloyWallet {
	fn address(&self) -> Option<Address> {
		Some(self.address)
	}

	async fn get_chain_id(&self) -> Result<ChainId, WalletError> {
		Ok(self.active_chain.load(Ordering::SeqCst))
	}

	async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
		self.get_provider(chain_id)?;
		let previous = self.active_chain.swap(chain_id, Ordering::SeqCst);
		tracing::debug!(from = previous, to = chain_id, "Active chain changed");
		Ok(())
	}

	async fn send_transaction(&self, tx: Transaction) -> Result<B256, WalletError> {
		let active = self.active_chain.load(Ordering::SeqCst);
		if tx.chain_id != active {
			return Err(WalletError::WrongChain {
				active,
				requested: tx.chain_id,
			});
		}
		let provider = self.get_provider(tx.chain_id)?;

		let mut request = TransactionRequest::default()
			.to(tx.to)
			.input(tx.data.into())
			.value(tx.value);
		if let Some(gas_limit) = tx.gas_limit {
			request = request.gas_limit(gas_limit);
		}

		tracing::debug!(
			chain_id = tx.chain_id,
			to = %tx.to,
			value = %tx.value,
			gas_limit = ?tx.gas_limit,
			"Sending transaction"
		);

		let pending = provider.send_transaction(request).await.map_err(|e| {
			tracing::error!(chain_id = tx.chain_id, error = %e, "Transaction submission failed");
			provider_error("Failed to send transaction", e)
		})?;

		let hash = *pending.tx_hash();
		tracing::info!(chain_id = tx.chain_id, tx_hash = %hash, "Transaction submitted");
		Ok(hash)
	}

	async fn read_contract(
		&self,
		chain_id: ChainId,
		to: Address,
		data: Bytes,
	) -> Result<Bytes, WalletError> {
		let provider = self.get_provider(chain_id)?;
		provider
			.call(TransactionRequest::default().to(to).input(data.into()))
			.await
			.map_err(|e| WalletError::ContractCall(format!("Call to {} failed: {}", to, e)))
	}

	async fn wait_for_transaction_receipt(
		&self,
		hash: B256,
		chain_id: ChainId,
	) -> Result<TransactionReceipt, WalletError> {
		let provider = self.get_provider(chain_id)?;

		let config = PendingTransactionConfig::new(hash)
			.with_required_confirmations(1)
			.with_timeout(Some(RECEIPT_TIMEOUT));

		let pending = provider
			.watch_pending_transaction(config)
			.await
			.map_err(|e| match e {
				PendingTransactionError::FailedToRegister => {
					WalletError::Network("Failed to register transaction watcher".to_string())
				},
				other => WalletError::Network(format!("Transaction watch failed: {}", other)),
			})?;
		let confirmed = pending
			.await
			.map_err(|e| WalletError::Network(format!("Failed to confirm transaction: {}", e)))?;

		match provider.get_transaction_receipt(confirmed).await {
			Ok(Some(receipt)) => Ok(convert_receipt(&receipt)),
			Ok(None) => Err(WalletError::Network(format!(
				"Transaction {} not found on chain {}",
				confirmed, chain_id
			))),
			Err(e) => Err(WalletError::Network(format!(
				"Failed to get receipt on chain {}: {}",
				chain_id, e
			))),
		}
	}

	async fn get_balance(
		&self,
		address: Address,
		token: Option<Address>,
		chain_id: ChainId,
	) -> Result<U256, WalletError> {
		let provider = self.get_provider(chain_id)?;

		match token {
			None => provider
				.get_balance(address)
				.await
				.map_err(|e| WalletError::Network(format!("Failed to get balance: {}", e))),
			Some(token) => {
				let call = IERC20::balanceOfCall { account: address };
				let result = provider
					.call(
						TransactionRequest::default()
							.to(token)
							.input(Bytes::from(call.abi_encode()).into()),
					)
					.await
					.map_err(|e| WalletError::Network(format!("Failed to call balanceOf: {}", e)))?;
				IERC20::balanceOfCall::abi_decode_returns(&result).map_err(|e| {
					WalletError::ContractCall(format!("Invalid balanceOf response: {}", e))
				})
			},
		}
	}
}

/// Creates an [`AlloyWallet`] from the configured key and networks.
pub fn create_alloy_wallet(
	networks: &NetworksConfig,
	private_key: &SecretString,
	initial_chain_id: ChainId,
) -> Result<AlloyWallet, WalletError> {
	let signer: PrivateKeySigner = private_key.with_exposed(|key| {
		key.parse()
			.map_err(|_| WalletError::provider("Invalid private key format"))
	})?;
	AlloyWallet::new(networks, signer, initial_chain_id)
}

#[cfg(test)]
mod tests {
	use super::*;
	use topup_types::NetworkConfig;

	const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn network(name: &str) -> NetworkConfig {
		NetworkConfig {
			name: name.to_string(),
			rpc_urls: vec!["http://localhost:8545".to_string()],
			native_symbol: "ETH".to_string(),
			native_decimals: 18,
			tokens: vec![],
		}
	}

	fn networks() -> NetworksConfig {
		let mut networks = HashMap::new();
		networks.insert(8453, network("Base"));
		networks.insert(23294, network("Sapphire"));
		networks
	}

	fn wallet() -> AlloyWallet {
		create_alloy_wallet(&networks(), &SecretString::from(TEST_KEY), 23294).unwrap()
	}

	#[tokio::test]
	async fn test_wallet_starts_on_initial_chain() {
		let wallet = wallet();
		assert_eq!(wallet.get_chain_id().await.unwrap(), 23294);
		assert_eq!(
			wallet.address(),
			Some("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap())
		);
		assert!(wallet.providers.contains_key(&8453));
	}

	#[tokio::test]
	async fn test_switch_chain_updates_active_chain() {
		let wallet = wallet();
		wallet.switch_chain(8453).await.unwrap();
		assert_eq!(wallet.get_chain_id().await.unwrap(), 8453);
	}

	#[tokio::test]
	async fn test_switch_to_unconfigured_chain_fails() {
		let wallet = wallet();
		let err = wallet.switch_chain(1).await.unwrap_err();
		assert!(matches!(err, WalletError::ChainNotConfigured(1)));
		assert_eq!(wallet.get_chain_id().await.unwrap(), 23294);
	}

	#[tokio::test]
	async fn test_send_on_inactive_chain_is_rejected() {
		let wallet = wallet();
		let tx = Transaction::call(8453, Address::repeat_byte(0x01), Bytes::new());
		let err = wallet.send_transaction(tx).await.unwrap_err();
		assert!(matches!(
			err,
			WalletError::WrongChain {
				active: 23294,
				requested: 8453
			}
		));
	}

	#[test]
	fn test_initial_chain_must_be_configured() {
		let result = create_alloy_wallet(&networks(), &SecretString::from(TEST_KEY), 1);
		assert!(matches!(result, Err(WalletError::ChainNotConfigured(1))));
	}

	#[test]
	fn test_invalid_private_key() {
		let result = create_alloy_wallet(&networks(), &SecretString::from("not-a-key"), 8453);
		assert!(result.is_err());
	}
}
