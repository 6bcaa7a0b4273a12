//! Conversion between base-unit integers and decimal strings.
//!
//! The arithmetic is alloy's; this module adds the display rule and the
//! stricter input checks amounts typed by a user need.

use alloy_primitives::{utils, U256};
use thiserror::Error;

/// Errors that can occur while parsing a decimal amount.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
	#[error("Invalid amount: {0}")]
	Invalid(String),
	#[error("Amount has more than {0} decimal places")]
	TooPrecise(u8),
	#[error("Amount out of range: {0}")]
	OutOfRange(String),
}

/// Formats a base-unit amount as a decimal string.
///
/// Trailing fractional zeros are trimmed, keeping at least one digit after
/// the point: `1500000` with 6 decimals gives `"1.5"`, `0` gives `"0.0"`.
pub fn format_units(amount: U256, decimals: u8) -> String {
	if decimals == 0 {
		return amount.to_string();
	}
	let Ok(formatted) = utils::format_units(amount, decimals) else {
		return amount.to_string();
	};
	match formatted.split_once('.') {
		Some((whole, fraction)) => match fraction.trim_end_matches('0') {
			"" => format!("{}.0", whole),
			fraction => format!("{}.{}", whole, fraction),
		},
		None => formatted,
	}
}

/// Formats a base-unit amount, truncating to `display_decimals` fractional digits.
pub fn format_units_truncated(amount: U256, decimals: u8, display_decimals: u8) -> String {
	if display_decimals >= decimals {
		return format_units(amount, decimals);
	}
	let step = U256::from(10u64).pow(U256::from(decimals - display_decimals));
	format_units(amount - amount % step, decimals)
}

/// Parses a decimal string into base units.
///
/// Accepts `"1"`, `"1.5"` and `".5"`. Rejects negative values and inputs with
/// more fractional digits than `decimals`.
pub fn parse_units(text: &str, decimals: u8) -> Result<U256, AmountError> {
	let text = text.trim();
	let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
	let is_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
	if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
		return Err(AmountError::Invalid(text.to_string()));
	}
	if fraction.trim_end_matches('0').len() > decimals as usize {
		return Err(AmountError::TooPrecise(decimals));
	}

	utils::parse_units(text, decimals)
		.map(|units| units.get_absolute())
		.map_err(|e| AmountError::OutOfRange(e.to_string()))
}
