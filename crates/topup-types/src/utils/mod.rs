//! Utility functions for amount conversion and string formatting.

pub mod amount;
pub mod formatting;

pub use amount::{format_units, format_units_truncated, parse_units, AmountError};
pub use formatting::truncate_message;
