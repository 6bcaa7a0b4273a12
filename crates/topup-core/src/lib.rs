//! Top-up orchestration for the ROFL top-up system.
//!
//! The orchestrator sequences one top-up attempt through its steps (switch
//! to the source chain, approve, deposit, wait for settlement, switch back)
//! on top of an injected wallet and bridge. Progress is published as a
//! [`TopUpState`] through a watch channel, and the wallet is returned to the
//! application chain on every exit path.

use alloy_primitives::B256;
use thiserror::Error;
use topup_bridge::BridgeError;
use topup_types::truncate_message;
use topup_wallet::WalletError;

pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod state;

pub use orchestrator::{TopUpOrchestrator, TopUpOutcome, TopUpSettings};
pub use planner::{plan_funding, FundingPlan};
pub use progress::{StepError, StepTracker};
pub use state::TopUpState;

/// Longest error message published to the user.
const MAX_USER_MESSAGE_CHARS: usize = 200;

/// Errors that can end a top-up attempt.
#[derive(Debug, Error)]
pub enum TopUpError {
	/// Error raised by the wallet.
	#[error(transparent)]
	Wallet(#[from] WalletError),
	/// Error raised by the bridge.
	#[error(transparent)]
	Bridge(BridgeError),
	/// The wallet refused or failed to change chain.
	#[error("{0}")]
	ChainSwitch(String),
	/// The deposit was mined but carries nothing settlement can be tracked by.
	#[error("Deposit {0} succeeded but its payment could not be identified")]
	UntrackableDeposit(B256),
	/// Settlement polling ran out of attempts without a terminal answer.
	#[error("Settlement not confirmed yet, the funds may still arrive")]
	SettlementUnconfirmed,
	/// The caller cancelled the attempt.
	#[error("Top-up cancelled")]
	Cancelled,
	/// Another attempt is already running.
	#[error("A top-up is already in progress")]
	Busy,
	/// An invalid progress update, indicating a bug in the flow.
	#[error(transparent)]
	Step(#[from] StepError),
}

impl From<BridgeError> for TopUpError {
	fn from(err: BridgeError) -> Self {
		match err {
			BridgeError::Cancelled => TopUpError::Cancelled,
			BridgeError::Wallet(e) => TopUpError::Wallet(e),
			other => TopUpError::Bridge(other),
		}
	}
}

impl TopUpError {
	/// Message shown to the user, preferring the wallet's short message.
	pub fn user_message(&self) -> String {
		let short = match self {
			TopUpError::Wallet(e) => e.short_message(),
			TopUpError::Bridge(e) => e.short_message(),
			_ => None,
		};
		match short {
			Some(message) => message.to_string(),
			None => truncate_message(&self.to_string(), MAX_USER_MESSAGE_CHARS),
		}
	}
}
