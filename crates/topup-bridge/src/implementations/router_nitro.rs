//! Router Nitro bridge aggregator.
//!
//! Quotes and transaction payloads come from the aggregator's HTTP API. The
//! deposit is whatever transaction the build endpoint returns, and settlement
//! is tracked by polling the status endpoint with the source transaction hash.

use crate::{
	network_name, poll, Approval, BridgeError, BridgeFactory, BridgeInterface, BridgeRegistry,
	Deposit, PollConfig, Settlement, SettlementHandle, TopUpRequest,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use reqwest::{
	header::{HeaderMap, HeaderValue, ACCEPT},
	Client, Response,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use topup_types::{
	is_native_token, ImplementationRegistry, NetworksConfig, NitroQuote, ProgressStep, Quote,
	Transaction,
};
use topup_wallet::{WalletError, WalletInterface};

const DEFAULT_QUOTE_API_URL: &str = "https://api-beta.pathfinder.routerprotocol.com/api/v2";
const DEFAULT_STATUS_API_URL: &str = "https://api.pro-nitro-explorer-public.routernitro.com";
const DEFAULT_SLIPPAGE_TOLERANCE: f64 = 1.0;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;
/// Settlement estimate shown when the quote carries none.
const DEFAULT_SETTLEMENT_SECS: u64 = 60;

/// Router Nitro bridge implementation.
pub struct RouterNitroBridge {
	client: Client,
	wallet: Arc<dyn WalletInterface>,
	networks: Arc<NetworksConfig>,
	quote_api_url: String,
	status_api_url: String,
	partner_id: Option<String>,
	/// Slippage tolerance in percent.
	slippage_tolerance: f64,
	poll_config: PollConfig,
}

/// Transaction fields returned by the build endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuiltTransaction {
	to: Address,
	data: Bytes,
	#[serde(default)]
	value: Option<String>,
	#[serde(default)]
	gas_limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BuildTransactionResponse {
	txn: BuiltTransaction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
	status: String,
	#[serde(default, alias = "dest_tx_hash")]
	dest_tx_hash: Option<String>,
}

impl RouterNitroBridge {
	/// Creates the bridge from its implementation table.
	pub fn new(
		config: &toml::Value,
		wallet: Arc<dyn WalletInterface>,
		networks: Arc<NetworksConfig>,
	) -> Result<Self, BridgeError> {
		let url = |key: &str, default: &str| {
			config
				.get(key)
				.and_then(|v| v.as_str())
				.unwrap_or(default)
				.trim_end_matches('/')
				.to_string()
		};
		let quote_api_url = url("quote_api_url", DEFAULT_QUOTE_API_URL);
		let status_api_url = url("status_api_url", DEFAULT_STATUS_API_URL);

		// Accept the partner id as either a string or an integer
		let partner_id = config.get("partner_id").and_then(|v| match v {
			toml::Value::String(s) => Some(s.clone()),
			toml::Value::Integer(i) => Some(i.to_string()),
			_ => None,
		});

		let slippage_tolerance = match config.get("slippage_tolerance") {
			None => DEFAULT_SLIPPAGE_TOLERANCE,
			Some(v) => v
				.as_float()
				.or_else(|| v.as_integer().map(|i| i as f64))
				.filter(|s| (0.0..=100.0).contains(s))
				.ok_or_else(|| {
					BridgeError::InvalidConfig(
						"slippage_tolerance must be a percentage between 0 and 100".to_string(),
					)
				})?,
		};

		let poll_config =
			PollConfig::from_table(config, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_MAX_POLL_ATTEMPTS)?;

		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
		let client = Client::builder()
			.default_headers(headers)
			.timeout(Duration::from_secs(30))
			.build()
			.map_err(|e| BridgeError::Network(format!("Failed to create HTTP client: {}", e)))?;

		tracing::debug!(
			quote_api_url = %quote_api_url,
			status_api_url = %status_api_url,
			slippage_tolerance,
			"Router Nitro bridge initialized"
		);

		Ok(Self {
			client,
			wallet,
			networks,
			quote_api_url,
			status_api_url,
			partner_id,
			slippage_tolerance,
			poll_config,
		})
	}

	async fn fetch_quote(&self, request: &TopUpRequest) -> Result<NitroQuote, BridgeError> {
		let mut query = vec![
			("fromTokenAddress", request.from_token.to_string()),
			("toTokenAddress", request.to_token.to_string()),
			("amount", request.amount.to_string()),
			("fromTokenChainId", request.from_chain.to_string()),
			("toTokenChainId", request.to_chain.to_string()),
			("slippageTolerance", self.slippage_tolerance.to_string()),
		];
		if let Some(partner_id) = &self.partner_id {
			query.push(("partnerId", partner_id.clone()));
		}

		let response = self
			.client
			.get(format!("{}/quote", self.quote_api_url))
			.query(&query)
			.send()
			.await?;
		handle_response(response).await
	}

	async fn build_transaction(
		&self,
		request: &TopUpRequest,
		quote: &NitroQuote,
	) -> Result<BuiltTransaction, BridgeError> {
		let mut body = serde_json::to_value(quote)
			.map_err(|e| BridgeError::InvalidInput(format!("Unserializable quote: {}", e)))?;
		if let Value::Object(fields) = &mut body {
			fields.insert("senderAddress".into(), Value::String(request.sender.to_string()));
			fields.insert("receiverAddress".into(), Value::String(request.recipient.to_string()));
		}

		let response = self
			.client
			.post(format!("{}/transaction", self.quote_api_url))
			.json(&body)
			.send()
			.await?;
		let built: BuildTransactionResponse = handle_response(response).await?;
		Ok(built.txn)
	}

	async fn fetch_status(&self, source_tx: B256) -> Result<Option<Settlement>, BridgeError> {
		let response = self
			.client
			.get(format!("{}/status", self.status_api_url))
			.query(&[("srcTxHash", source_tx.to_string())])
			.send()
			.await?;
		let status: StatusResponse = handle_response(response).await?;

		match status.status.to_ascii_lowercase().as_str() {
			"completed" => Ok(Some(Settlement {
				destination_tx_hash: status.dest_tx_hash,
			})),
			"failed" => Err(BridgeError::SettlementFailed(format!(
				"Bridge reported transfer {} as failed",
				source_tx
			))),
			other => {
				tracing::debug!(tx_hash = %source_tx, status = other, "Bridge transfer in progress");
				Ok(None)
			},
		}
	}

	fn token_symbol(&self, chain_id: u64, token: &Address) -> String {
		let network = self.networks.get(&chain_id);
		if is_native_token(token) {
			return network
				.map(|n| n.native_symbol.clone())
				.unwrap_or_else(|| "ETH".to_string());
		}
		network
			.and_then(|n| n.find_token(token))
			.map(|t| t.symbol.clone())
			.unwrap_or_else(|| "token".to_string())
	}
}

fn nitro_quote(quote: &Quote) -> Result<&NitroQuote, BridgeError> {
	quote.as_nitro().ok_or_else(|| {
		BridgeError::InvalidInput("Router Nitro requires an aggregator quote".to_string())
	})
}

/// Parses a decimal or `0x`-prefixed hex quantity.
fn parse_quantity(value: &str, field: &str) -> Result<U256, BridgeError> {
	value
		.parse::<U256>()
		.map_err(|e| BridgeError::InvalidResponse(format!("Invalid {} '{}': {}", field, value, e)))
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, BridgeError> {
	let status = response.status();
	if !status.is_success() {
		let body = response.text().await.unwrap_or_default();
		return Err(BridgeError::Api {
			status: status.as_u16(),
			message: extract_error_message(&body),
		});
	}

	response
		.json::<T>()
		.await
		.map_err(|e| BridgeError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

/// Pulls a readable message out of an error body.
///
/// The aggregator reports errors as `{"error": ".."}`, `{"message": ".."}` or
/// `{"error": {"message": ".."}}` depending on the endpoint.
fn extract_error_message(body: &str) -> String {
	let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
		json.get("error")
			.and_then(|e| e.as_str().or_else(|| e.get("message").and_then(|m| m.as_str())))
			.or_else(|| json.get("message").and_then(|m| m.as_str()))
			.map(str::to_string)
	});
	match from_json {
		Some(message) => message,
		None if body.trim().is_empty() => "Unknown error".to_string(),
		None => body.trim().to_string(),
	}
}

#[async_trait]
impl BridgeInterface for RouterNitroBridge {
	fn name(&self) -> &'static str {
		Registry::NAME
	}

	fn progress_steps(
		&self,
		request: &TopUpRequest,
		estimated_time: Option<u64>,
	) -> Vec<ProgressStep> {
		let source = network_name(&self.networks, request.from_chain);
		let destination = network_name(&self.networks, request.to_chain);
		let symbol = self.token_symbol(request.from_chain, &request.from_token);

		vec![
			ProgressStep::new(1, "Switch network", format!("Switching wallet to {}", source)),
			ProgressStep::new(2, "Approve", format!("Approving {} for the bridge", symbol))
				.with_expected_time(15),
			ProgressStep::new(3, "Bridge", format!("Submitting bridge transaction on {}", source))
				.with_expected_time(15),
			ProgressStep::new(4, "Settle", format!("Waiting for funds to arrive on {}", destination))
				.with_expected_time(estimated_time.unwrap_or(DEFAULT_SETTLEMENT_SECS)),
			ProgressStep::new(5, "Switch back", format!("Switching wallet back to {}", destination)),
		]
	}

	async fn get_quote(&self, request: &TopUpRequest) -> Result<Quote, BridgeError> {
		match self.fetch_quote(request).await {
			Ok(quote) => Ok(Quote::Nitro(Box::new(quote))),
			Err(e) => {
				tracing::error!(
					from_chain = request.from_chain,
					to_chain = request.to_chain,
					error = %e,
					"Failed to get bridge quote"
				);
				Err(e)
			},
		}
	}

	async fn approval(
		&self,
		request: &TopUpRequest,
		quote: &Quote,
	) -> Result<Option<Approval>, BridgeError> {
		if is_native_token(&request.from_token) {
			return Ok(None);
		}
		let spender = nitro_quote(quote)?.allowance_to.ok_or_else(|| {
			BridgeError::InvalidResponse("Quote does not name an allowance spender".to_string())
		})?;
		Ok(Some(Approval {
			token: request.from_token,
			spender,
			amount: None,
		}))
	}

	async fn submit_deposit(
		&self,
		request: &TopUpRequest,
		quote: &Quote,
	) -> Result<Deposit, BridgeError> {
		let built = self.build_transaction(request, nitro_quote(quote)?).await?;

		let value = match built.value.as_deref() {
			Some(value) => parse_quantity(value, "value")?,
			None => U256::ZERO,
		};
		let mut tx = Transaction::call(request.from_chain, built.to, built.data).with_value(value);
		if let Some(gas_limit) = built.gas_limit.as_deref() {
			let gas_limit = parse_quantity(gas_limit, "gasLimit")?;
			tx = tx.with_gas_limit(gas_limit.try_into().map_err(|_| {
				BridgeError::InvalidResponse(format!("gasLimit {} out of range", gas_limit))
			})?);
		}

		let tx_hash = self.wallet.send_transaction(tx).await?;
		tracing::info!(chain_id = request.from_chain, tx_hash = %tx_hash, "Bridge transaction submitted");

		let receipt = self
			.wallet
			.wait_for_transaction_receipt(tx_hash, request.from_chain)
			.await?;
		if !receipt.success {
			return Err(WalletError::TransactionFailed(format!(
				"Bridge transaction {} reverted",
				tx_hash
			))
			.into());
		}

		Ok(Deposit {
			tx_hash,
			handle: Some(SettlementHandle::SourceTransaction(tx_hash)),
		})
	}

	async fn await_settlement(
		&self,
		_request: &TopUpRequest,
		handle: &SettlementHandle,
		cancel: &CancellationToken,
	) -> Result<Option<Settlement>, BridgeError> {
		let SettlementHandle::SourceTransaction(source_tx) = *handle else {
			return Err(BridgeError::InvalidInput(
				"Router Nitro settlement is tracked by source transaction".to_string(),
			));
		};

		poll(self.poll_config, cancel, "nitro_status", |_| {
			self.fetch_status(source_tx)
		})
		.await
	}

	fn waits_for_destination_balance(&self) -> bool {
		false
	}
}

/// Factory function for creating Router Nitro bridge instances.
pub fn create_router_nitro(
	config: &toml::Value,
	wallet: Arc<dyn WalletInterface>,
	networks: Arc<NetworksConfig>,
) -> Result<Arc<dyn BridgeInterface>, BridgeError> {
	Ok(Arc::new(RouterNitroBridge::new(config, wallet, networks)?))
}

/// Registry for the Router Nitro implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "router_nitro";
	type Factory = BridgeFactory;

	fn factory() -> Self::Factory {
		create_router_nitro
	}
}

impl BridgeRegistry for Registry {}
