//! Common types module for the ROFL top-up system.
//!
//! This module defines the data types shared by the wallet, bridge and
//! orchestration crates: network and token configuration, quotes, progress
//! steps, payment identifiers and the on-chain transaction model.

/// Chain identifiers and well-known chain constants.
pub mod chains;
/// Network and token configuration types.
pub mod networks;
/// Payment identifiers used by the paymaster settlement path.
pub mod payment;
/// Progress steps and per-step status for the top-up flow.
pub mod progress;
/// Exchange quotes returned by the bridge implementations.
pub mod quote;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secure string type for handling sensitive data.
pub mod secret_string;
/// Native-asset sentinel handling.
pub mod tokens;
/// Transactions, receipts and logs.
pub mod transaction;
/// Utility functions for amount formatting and string handling.
pub mod utils;
/// Wallet-facing result types.
pub mod wallet;

pub use chains::{is_sapphire, ChainId, SAPPHIRE_MAINNET, SAPPHIRE_TESTNET};
pub use networks::{deserialize_networks, NetworkConfig, NetworksConfig, TokenConfig};
pub use payment::PaymentId;
pub use progress::{ProgressStep, StepStatus, StepStatuses};
pub use quote::{AssetInfo, FeeInfo, NitroQuote, Quote};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use tokens::{is_native_token, is_native_token_str, NATIVE_TOKEN_ADDRESS};
pub use transaction::{Log, Transaction, TransactionReceipt};
pub use utils::{format_units, format_units_truncated, parse_units, truncate_message, AmountError};
pub use wallet::{Balance, ChainSwitchResult};
