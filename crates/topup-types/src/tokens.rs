//! Native-asset sentinel handling.
//!
//! Bridge aggregators and wallets represent the chain's native gas token with
//! a sentinel address instead of a contract. Native transfers never need an
//! ERC-20 allowance and are balanced with `eth_getBalance`.

use alloy_primitives::{address, Address};

/// Sentinel address denoting the native asset of a chain.
pub const NATIVE_TOKEN_ADDRESS: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Returns true if the address is the native-asset sentinel.
///
/// The zero address is accepted as well since some contracts use it for
/// the native asset.
pub fn is_native_token(token: &Address) -> bool {
	*token == NATIVE_TOKEN_ADDRESS || token.is_zero()
}

/// String variant of [`is_native_token`], comparing case-insensitively.
///
/// Strings that do not parse as an address are never native.
pub fn is_native_token_str(token: &str) -> bool {
	token
		.trim()
		.parse::<Address>()
		.map(|addr| is_native_token(&addr))
		.unwrap_or(false)
}
