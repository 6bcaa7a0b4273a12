//! ROFL paymaster bridge.
//!
//! Tokens are deposited into a vault contract on the source chain. The
//! paymaster on Sapphire credits the recipient with native ROSE at a
//! contract-defined rate and marks the payment processed. Payments are
//! identified by hashing the position of the vault's `PaymentInitiated`
//! log in the deposit receipt.

use crate::{
	network_name, poll, Approval, BridgeError, BridgeFactory, BridgeInterface, BridgeRegistry,
	Deposit, PollConfig, Settlement, SettlementHandle, TopUpRequest,
};
use crate::poller::integer_field;
use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall, SolEvent, SolValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use topup_types::{
	is_sapphire, ChainId, ImplementationRegistry, NetworksConfig, PaymentId, ProgressStep, Quote,
	Transaction, TransactionReceipt,
};
use topup_wallet::{WalletError, WalletInterface};

const DEFAULT_DEPOSIT_GAS_LIMIT: u64 = 300_000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 4;
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

sol! {
	interface IPaymasterVault {
		event PaymentInitiated(
			address indexed payer,
			address indexed token,
			uint256 amount,
			address recipient
		);

		function deposit(address token, uint256 amount, address recipient) external;
	}

	interface IRoflPaymaster {
		function calculateRoseAmount(address token, uint256 amount) external view returns (uint256);
		function isPaymentProcessed(bytes32 paymentId) external view returns (bool);
	}
}

/// Paymaster bridge implementation.
pub struct PaymasterBridge {
	wallet: Arc<dyn WalletInterface>,
	networks: Arc<NetworksConfig>,
	/// Vault contract per source chain.
	vaults: HashMap<ChainId, Address>,
	/// Paymaster contract per destination chain.
	paymasters: HashMap<ChainId, Address>,
	deposit_gas_limit: u64,
	poll_config: PollConfig,
}

/// Reads a `{ "<chain id>" = "<address>" }` table.
fn address_map(config: &toml::Value, key: &str) -> Result<HashMap<ChainId, Address>, BridgeError> {
	let table = config
		.get(key)
		.and_then(|v| v.as_table())
		.ok_or_else(|| BridgeError::InvalidConfig(format!("Missing '{}' table", key)))?;

	let mut map = HashMap::new();
	for (chain, address) in table {
		let chain_id = chain.parse::<ChainId>().map_err(|_| {
			BridgeError::InvalidConfig(format!("Invalid chain id '{}' in {}", chain, key))
		})?;
		let address = address
			.as_str()
			.and_then(|s| s.parse::<Address>().ok())
			.ok_or_else(|| {
				BridgeError::InvalidConfig(format!("Invalid address for chain {} in {}", chain, key))
			})?;
		map.insert(chain_id, address);
	}
	Ok(map)
}

/// Derives the payment id of a deposit from its receipt coordinates.
///
/// The five values are ABI-encoded as consecutive 32-byte words and hashed
/// with keccak256, matching the paymaster's own derivation.
pub fn compute_payment_id(
	chain_id: ChainId,
	vault: Address,
	block_number: u64,
	transaction_index: u64,
	log_index: u64,
) -> PaymentId {
	let encoded = (
		U256::from(chain_id),
		vault,
		U256::from(block_number),
		U256::from(transaction_index),
		U256::from(log_index),
	)
		.abi_encode();
	PaymentId(keccak256(encoded))
}

/// Finds the payment id of a deposit receipt.
///
/// Logs from other contracts, logs without topics and logs that do not decode
/// as `PaymentInitiated` are skipped. The last matching log wins. Returns
/// `None` when nothing matched or the receipt has no transaction index.
pub fn extract_payment_id(
	receipt: &TransactionReceipt,
	chain_id: ChainId,
	vault: Address,
) -> Option<PaymentId> {
	let mut matched_log_index = None;

	for log in &receipt.logs {
		if log.address != vault || log.topics.is_empty() {
			continue;
		}
		match IPaymasterVault::PaymentInitiated::decode_raw_log(log.topics.iter().copied(), &log.data) {
			Ok(_) => {
				if let Some(index) = log.log_index {
					matched_log_index = Some(index);
				}
			},
			Err(e) => {
				tracing::debug!(
					tx_hash = %receipt.transaction_hash,
					log_index = ?log.log_index,
					error = %e,
					"Skipping undecodable vault log"
				);
			},
		}
	}

	let log_index = matched_log_index?;
	let transaction_index = receipt.transaction_index?;
	Some(compute_payment_id(
		chain_id,
		vault,
		receipt.block_number,
		transaction_index,
		log_index,
	))
}

impl PaymasterBridge {
	/// Creates the bridge from its implementation table.
	pub fn new(
		config: &toml::Value,
		wallet: Arc<dyn WalletInterface>,
		networks: Arc<NetworksConfig>,
	) -> Result<Self, BridgeError> {
		let vaults = address_map(config, "vaults")?;
		let paymasters = address_map(config, "paymasters")?;

		if let Some(chain) = paymasters.keys().find(|c| !is_sapphire(**c)) {
			return Err(BridgeError::InvalidConfig(format!(
				"Paymaster configured for unsupported chain {}",
				chain
			)));
		}

		let deposit_gas_limit =
			integer_field(config, "deposit_gas_limit")?.unwrap_or(DEFAULT_DEPOSIT_GAS_LIMIT);

		Ok(Self {
			wallet,
			networks,
			vaults,
			paymasters,
			deposit_gas_limit,
			poll_config: PollConfig::from_table(
				config,
				DEFAULT_POLL_INTERVAL_SECS,
				DEFAULT_MAX_POLL_ATTEMPTS,
			)?,
		})
	}

	fn paymaster(&self, chain_id: ChainId) -> Result<Address, BridgeError> {
		if !is_sapphire(chain_id) {
			return Err(BridgeError::ChainInvalid(chain_id));
		}
		self.paymasters
			.get(&chain_id)
			.copied()
			.ok_or(BridgeError::ChainInvalid(chain_id))
	}

	fn vault(&self, chain_id: ChainId) -> Result<Address, BridgeError> {
		self.vaults
			.get(&chain_id)
			.copied()
			.ok_or(BridgeError::ChainInvalid(chain_id))
	}

	/// Amount of ROSE credited for `amount` of `token` on `chain_id`.
	pub async fn calculate_rose_amount(
		&self,
		token: Address,
		amount: U256,
		chain_id: ChainId,
	) -> Result<U256, BridgeError> {
		let paymaster = self.paymaster(chain_id)?;
		let call = IRoflPaymaster::calculateRoseAmountCall { token, amount };
		let data = self
			.wallet
			.read_contract(chain_id, paymaster, Bytes::from(call.abi_encode()))
			.await?;
		IRoflPaymaster::calculateRoseAmountCall::abi_decode_returns(&data)
			.map_err(|e| BridgeError::InvalidResponse(format!("Invalid calculateRoseAmount response: {}", e)))
	}

	/// Deposits `amount` of `token` into `vault` on `chain_id`.
	///
	/// Returns the transaction hash and the payment id, `None` when the
	/// receipt carries no `PaymentInitiated` log from the vault.
	pub async fn deposit(
		&self,
		vault: Address,
		token: Address,
		amount: U256,
		recipient: Address,
		chain_id: ChainId,
	) -> Result<Deposit, BridgeError> {
		let call = IPaymasterVault::depositCall {
			token,
			amount,
			recipient,
		};
		let tx = Transaction::call(chain_id, vault, call.abi_encode())
			.with_gas_limit(self.deposit_gas_limit);

		let tx_hash = self.wallet.send_transaction(tx).await?;
		tracing::info!(chain_id, tx_hash = %tx_hash, vault = %vault, "Paymaster deposit submitted");

		let receipt = self.wallet.wait_for_transaction_receipt(tx_hash, chain_id).await?;
		if !receipt.success {
			return Err(WalletError::TransactionFailed(format!(
				"Deposit {} reverted",
				tx_hash
			))
			.into());
		}

		let payment_id = extract_payment_id(&receipt, chain_id, vault);
		match &payment_id {
			Some(id) => tracing::info!(payment_id = %id, "Payment initiated"),
			None => tracing::warn!(tx_hash = %tx_hash, "Deposit receipt has no PaymentInitiated log"),
		}

		Ok(Deposit {
			tx_hash,
			handle: payment_id.map(SettlementHandle::Payment),
		})
	}

	/// Polls `isPaymentProcessed` until it reports true.
	///
	/// Query errors are retried. Returns `Ok(None)` when the attempt budget is
	/// spent.
	pub async fn poll_payment(
		&self,
		payment_id: PaymentId,
		chain_id: ChainId,
		cancel: &CancellationToken,
	) -> Result<Option<bool>, BridgeError> {
		let paymaster = self.paymaster(chain_id)?;
		if payment_id.is_empty() {
			return Err(BridgeError::InvalidInput("Payment id is empty".to_string()));
		}

		let calldata = Bytes::from(
			IRoflPaymaster::isPaymentProcessedCall {
				paymentId: payment_id.0,
			}
			.abi_encode(),
		);

		poll(self.poll_config, cancel, "paymaster_payment", |_| {
			let calldata = calldata.clone();
			async move {
				let data = self
					.wallet
					.read_contract(chain_id, paymaster, calldata)
					.await?;
				let processed = IRoflPaymaster::isPaymentProcessedCall::abi_decode_returns(&data)
					.map_err(|e| {
						BridgeError::InvalidResponse(format!("Invalid isPaymentProcessed response: {}", e))
					})?;
				Ok::<_, BridgeError>(processed.then_some(true))
			}
		})
		.await
	}
}

#[async_trait]
impl BridgeInterface for PaymasterBridge {
	fn name(&self) -> &'static str {
		Registry::NAME
	}

	fn progress_steps(
		&self,
		request: &TopUpRequest,
		_estimated_time: Option<u64>,
	) -> Vec<ProgressStep> {
		let source = network_name(&self.networks, request.from_chain);
		let destination = network_name(&self.networks, request.to_chain);
		let symbol = self
			.networks
			.get(&request.from_chain)
			.and_then(|n| n.find_token(&request.from_token))
			.map(|t| t.symbol.clone())
			.unwrap_or_else(|| "token".to_string());
		let settle_secs = self.poll_config.interval.as_secs() * 15;

		vec![
			ProgressStep::new(1, "Switch network", format!("Switching wallet to {}", source)),
			ProgressStep::new(2, "Approve", format!("Approving {} for the paymaster vault", symbol))
				.with_expected_time(15),
			ProgressStep::new(3, "Deposit", format!("Depositing {} on {}", symbol, source))
				.with_expected_time(15),
			ProgressStep::new(4, "Settle", format!("Waiting for ROSE to arrive on {}", destination))
				.with_expected_time(settle_secs),
			ProgressStep::new(5, "Switch back", format!("Switching wallet back to {}", destination)),
		]
	}

	async fn get_quote(&self, request: &TopUpRequest) -> Result<Quote, BridgeError> {
		match self
			.calculate_rose_amount(request.from_token, request.amount, request.to_chain)
			.await
		{
			Ok(amount) => Ok(Quote::FixedRate { amount }),
			Err(e) => {
				tracing::error!(
					to_chain = request.to_chain,
					token = %request.from_token,
					error = %e,
					"Failed to get paymaster quote"
				);
				Err(e)
			},
		}
	}

	async fn approval(
		&self,
		request: &TopUpRequest,
		_quote: &Quote,
	) -> Result<Option<Approval>, BridgeError> {
		Ok(Some(Approval {
			token: request.from_token,
			spender: self.vault(request.from_chain)?,
			amount: Some(request.amount),
		}))
	}

	async fn submit_deposit(
		&self,
		request: &TopUpRequest,
		_quote: &Quote,
	) -> Result<Deposit, BridgeError> {
		let vault = self.vault(request.from_chain)?;
		self.deposit(
			vault,
			request.from_token,
			request.amount,
			request.recipient,
			request.from_chain,
		)
		.await
	}

	async fn await_settlement(
		&self,
		request: &TopUpRequest,
		handle: &SettlementHandle,
		cancel: &CancellationToken,
	) -> Result<Option<Settlement>, BridgeError> {
		let SettlementHandle::Payment(payment_id) = *handle else {
			return Err(BridgeError::InvalidInput(
				"Paymaster settlement is tracked by payment id".to_string(),
			));
		};

		Ok(self
			.poll_payment(payment_id, request.to_chain, cancel)
			.await?
			.map(|_| Settlement::default()))
	}

	fn waits_for_destination_balance(&self) -> bool {
		true
	}
}

/// Factory function for creating paymaster bridge instances.
pub fn create_paymaster(
	config: &toml::Value,
	wallet: Arc<dyn WalletInterface>,
	networks: Arc<NetworksConfig>,
) -> Result<Arc<dyn BridgeInterface>, BridgeError> {
	Ok(Arc::new(PaymasterBridge::new(config, wallet, networks)?))
}

/// Registry for the paymaster implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "paymaster";
	type Factory = BridgeFactory;

	fn factory() -> Self::Factory {
		create_paymaster
	}
}

impl BridgeRegistry for Registry {}
