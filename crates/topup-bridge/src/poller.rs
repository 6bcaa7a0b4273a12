//! Bounded, cancellable polling.

use crate::BridgeError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Interval and attempt budget of a settlement poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
	pub interval: Duration,
	pub max_attempts: u32,
}

impl PollConfig {
	pub fn new(interval: Duration, max_attempts: u32) -> Self {
		Self {
			interval,
			max_attempts,
		}
	}

	/// Reads `poll_interval_seconds` and `max_poll_attempts` from an
	/// implementation table, falling back to the given defaults.
	pub fn from_table(
		table: &toml::Value,
		default_interval_secs: u64,
		default_attempts: u32,
	) -> Result<Self, BridgeError> {
		let interval = integer_field(table, "poll_interval_seconds")?.unwrap_or(default_interval_secs);
		let max_attempts = integer_field(table, "max_poll_attempts")?.unwrap_or(default_attempts);
		if max_attempts == 0 {
			return Err(BridgeError::InvalidConfig(
				"max_poll_attempts must be at least 1".to_string(),
			));
		}
		Ok(Self::new(Duration::from_secs(interval), max_attempts))
	}
}

/// Reads an optional non-negative integer that must fit in `T`.
pub(crate) fn integer_field<T: TryFrom<i64>>(
	table: &toml::Value,
	key: &str,
) -> Result<Option<T>, BridgeError> {
	let Some(value) = table.get(key) else {
		return Ok(None);
	};
	value
		.as_integer()
		.and_then(|i| T::try_from(i).ok())
		.map(Some)
		.ok_or_else(|| BridgeError::InvalidConfig(format!("Invalid {}: {}", key, value)))
}

/// Calls `check` until it yields a value, a terminal error, or the attempt
/// budget is spent.
///
/// `check` receives the 1-based attempt number. Transient errors are logged
/// and consume an attempt. There is no sleep after the final attempt.
/// Exhaustion returns `Ok(None)`. Cancellation interrupts both the check in
/// flight and the sleep between attempts.
pub async fn poll<T, F, Fut>(
	config: PollConfig,
	cancel: &CancellationToken,
	operation: &str,
	mut check: F,
) -> Result<Option<T>, BridgeError>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<Option<T>, BridgeError>>,
{
	for attempt in 1..=config.max_attempts {
		if cancel.is_cancelled() {
			return Err(BridgeError::Cancelled);
		}

		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(BridgeError::Cancelled),
			outcome = check(attempt) => outcome,
		};

		match outcome {
			Ok(Some(value)) => return Ok(Some(value)),
			Ok(None) => {
				tracing::debug!(operation, attempt, "Not settled yet");
			},
			Err(e) if e.is_terminal() => return Err(e),
			Err(e) => {
				tracing::warn!(
					operation,
					attempt,
					max_attempts = config.max_attempts,
					error = %e,
					"Poll attempt failed, retrying"
				);
			},
		}

		if attempt < config.max_attempts {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(BridgeError::Cancelled),
				_ = tokio::time::sleep(config.interval) => {},
			}
		}
	}

	tracing::warn!(
		operation,
		max_attempts = config.max_attempts,
		"Polling exhausted without a terminal answer"
	);
	Ok(None)
}
