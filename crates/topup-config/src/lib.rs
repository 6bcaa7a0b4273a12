//! Configuration module for the ROFL top-up service.
//!
//! This module provides structures and utilities for loading the top-up
//! configuration from TOML files. Values of the form `${VAR}` or
//! `${VAR:-default}` are substituted from the environment before parsing, and
//! the parsed configuration is validated before being handed out.

use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use topup_types::{deserialize_networks, ChainId, NetworksConfig, SecretString};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the top-up service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	/// Signing wallet configuration.
	pub wallet: WalletConfig,
	/// Network and token configurations.
	#[serde(deserialize_with = "deserialize_networks")]
	pub networks: NetworksConfig,
	/// The application's home chain, where top-ups are delivered.
	pub app: AppConfig,
	/// Chain switch coordinator settings.
	#[serde(default)]
	pub chain_switch: ChainSwitchConfig,
	/// Orchestrator settings.
	#[serde(default)]
	pub topup: TopUpConfig,
	/// Bridge implementations.
	pub bridge: BridgeConfig,
}

/// Configuration of the signing wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
	/// Hex-encoded private key of the account performing top-ups.
	pub private_key: SecretString,
	/// Chain the wallet is connected to on startup. Defaults to the app chain.
	#[serde(default)]
	pub initial_chain_id: Option<ChainId>,
}

/// Application (destination) chain configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub chain_id: ChainId,
}

/// Settings of the chain switch coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSwitchConfig {
	/// Maximum time to wait for the wallet to acknowledge a switch.
	#[serde(default = "default_switch_timeout_ms")]
	pub timeout_ms: u64,
	/// Delay after a successful switch to let provider state propagate.
	#[serde(default = "default_settle_delay_ms")]
	pub settle_delay_ms: u64,
	/// Report success when the wallet answers with an "Unsupported Chain" error.
	/// When disabled the chain id is re-read instead.
	#[serde(default = "default_true")]
	pub trust_unsupported_chain_error: bool,
}

impl Default for ChainSwitchConfig {
	fn default() -> Self {
		Self {
			timeout_ms: default_switch_timeout_ms(),
			settle_delay_ms: default_settle_delay_ms(),
			trust_unsupported_chain_error: true,
		}
	}
}

impl ChainSwitchConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	pub fn settle_delay(&self) -> Duration {
		Duration::from_millis(self.settle_delay_ms)
	}
}

/// Settings of the top-up orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct TopUpConfig {
	/// Delay after the last input change before a quote is requested.
	#[serde(default = "default_quote_debounce_ms")]
	pub quote_debounce_ms: u64,
	/// Interval between destination balance checks after settlement.
	#[serde(default = "default_balance_wait_interval_seconds")]
	pub balance_wait_interval_seconds: u64,
	/// Upper bound on waiting for the destination balance to increase.
	#[serde(default = "default_balance_wait_timeout_seconds")]
	pub balance_wait_timeout_seconds: u64,
}

impl Default for TopUpConfig {
	fn default() -> Self {
		Self {
			quote_debounce_ms: default_quote_debounce_ms(),
			balance_wait_interval_seconds: default_balance_wait_interval_seconds(),
			balance_wait_timeout_seconds: default_balance_wait_timeout_seconds(),
		}
	}
}

/// Configuration of the bridge implementations.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of implementation names to their raw configurations.
	/// Each implementation validates its own table.
	pub implementations: HashMap<String, toml::Value>,
}

fn default_switch_timeout_ms() -> u64 {
	3000
}

fn default_settle_delay_ms() -> u64 {
	1000
}

fn default_true() -> bool {
	true
}

fn default_quote_debounce_ms() -> u64 {
	1000
}

fn default_balance_wait_interval_seconds() -> u64 {
	6
}

fn default_balance_wait_timeout_seconds() -> u64 {
	180
}

/// Largest configuration file accepted before variable substitution.
const MAX_CONFIG_SIZE: usize = 1024 * 1024;

/// `${NAME}` or `${NAME:-default}`.
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}";

/// Substitutes `${NAME}` and `${NAME:-default}` placeholders from the
/// environment. Every unset variable without a default is reported at once.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	if input.len() > MAX_CONFIG_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_CONFIG_SIZE
		)));
	}

	let pattern =
		Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::Parse(format!("Regex error: {e}")))?;

	let mut missing = Vec::new();
	let resolved = pattern.replace_all(input, |caps: &Captures| {
		let name = &caps[1];
		std::env::var(name)
			.ok()
			.or_else(|| caps.get(2).map(|default| default.as_str().to_string()))
			.unwrap_or_else(|| {
				missing.push(name.to_string());
				String::new()
			})
	});

	if !missing.is_empty() {
		return Err(ConfigError::Validation(format!(
			"Environment variables not set: {}",
			missing.join(", ")
		)));
	}
	Ok(resolved.into_owned())
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	/// Returns the configuration of the application chain.
	pub fn app_chain_id(&self) -> ChainId {
		self.app.chain_id
	}

	/// Validates cross-section invariants.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.networks.len() < 2 {
			return Err(ConfigError::Validation(
				"At least 2 different networks must be configured".into(),
			));
		}

		for (chain_id, network) in &self.networks {
			if network.rpc_urls.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Network {} must have at least one RPC URL",
					chain_id
				)));
			}
		}

		if !self.networks.contains_key(&self.app.chain_id) {
			return Err(ConfigError::Validation(format!(
				"App chain {} is not a configured network",
				self.app.chain_id
			)));
		}

		if let Some(initial) = self.wallet.initial_chain_id {
			if !self.networks.contains_key(&initial) {
				return Err(ConfigError::Validation(format!(
					"Initial wallet chain {} is not a configured network",
					initial
				)));
			}
		}

		if self.wallet.private_key.is_empty() {
			return Err(ConfigError::Validation(
				"Wallet private key cannot be empty".into(),
			));
		}

		if self.bridge.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one bridge implementation must be configured".into(),
			));
		}

		if !self.bridge.implementations.contains_key(&self.bridge.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary bridge '{}' is not configured",
				self.bridge.primary
			)));
		}

		if self.chain_switch.timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"chain_switch.timeout_ms must be greater than zero".into(),
			));
		}

		if self.topup.balance_wait_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"topup.balance_wait_interval_seconds must be greater than zero".into(),
			));
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE_CONFIG: &str = r#"
		[wallet]
		private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

		[networks.23294]
		name = "Sapphire"
		rpc_urls = ["https://sapphire.oasis.io"]
		native_symbol = "ROSE"

		[networks.8453]
		name = "Base"
		rpc_urls = ["https://mainnet.base.org"]

		[app]
		chain_id = 23294

		[bridge]
		primary = "paymaster"

		[bridge.implementations.paymaster]
		vaults = { 8453 = "0x00000000000000000000000000000000000000aa" }
		paymasters = { 23294 = "0x00000000000000000000000000000000000000bb" }
	"#;

	#[test]
	fn test_parse_config_with_defaults() {
		let config: Config = BASE_CONFIG.parse().unwrap();
		assert_eq!(config.app_chain_id(), 23294);
		assert_eq!(config.chain_switch.timeout_ms, 3000);
		assert_eq!(config.chain_switch.settle_delay_ms, 1000);
		assert!(config.chain_switch.trust_unsupported_chain_error);
		assert_eq!(config.topup.quote_debounce_ms, 1000);
		assert_eq!(config.topup.balance_wait_timeout_seconds, 180);
		assert_eq!(config.networks[&23294].native_symbol, "ROSE");
		assert!(config.bridge.implementations.contains_key("paymaster"));
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TOPUP_TEST_VAR", "resolved");
		let input = "value = \"${TOPUP_TEST_VAR}\"";
		assert_eq!(resolve_env_vars(input).unwrap(), "value = \"resolved\"");
		std::env::remove_var("TOPUP_TEST_VAR");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${TOPUP_MISSING_VAR:-fallback}\"";
		assert_eq!(resolve_env_vars(input).unwrap(), "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${TOPUP_DEFINITELY_MISSING}\"";
		let err = resolve_env_vars(input).unwrap_err();
		assert!(err.to_string().contains("TOPUP_DEFINITELY_MISSING"));
	}

	#[test]
	fn test_all_missing_env_vars_reported() {
		let input = "a = \"${TOPUP_MISSING_A}\"\nb = \"${TOPUP_MISSING_B:-}\"\nc = \"${TOPUP_MISSING_C}\"";
		let err = resolve_env_vars(input).unwrap_err();
		assert_eq!(
			err.to_string(),
			"Validation error: Environment variables not set: TOPUP_MISSING_A, TOPUP_MISSING_C"
		);
	}

	#[test]
	fn test_unknown_app_chain_rejected() {
		let raw = BASE_CONFIG.replace("chain_id = 23294", "chain_id = 1");
		let err = raw.parse::<Config>().unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
		assert!(err.to_string().contains("App chain 1"));
	}

	#[test]
	fn test_missing_primary_bridge_rejected() {
		let raw = BASE_CONFIG.replace("primary = \"paymaster\"", "primary = \"router_nitro\"");
		let err = raw.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary bridge 'router_nitro'"));
	}

	#[tokio::test]
	async fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("topup.toml");
		std::fs::write(&path, BASE_CONFIG).unwrap();

		let config = Config::from_file(&path).await.unwrap();
		assert_eq!(config.networks.len(), 2);
	}
}
