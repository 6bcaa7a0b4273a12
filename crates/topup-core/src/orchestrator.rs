//! The top-up orchestrator.
//!
//! One attempt runs five strictly sequential steps:
//!
//! 1. switch the wallet to the source chain
//! 2. make sure the bridge may spend the source token
//! 3. submit the deposit
//! 4. wait for settlement on the destination chain
//! 5. switch the wallet back to the application chain
//!
//! A failing step is marked as errored and ends the attempt. Whatever the
//! outcome, a best-effort switch back to the application chain runs before
//! the attempt returns.

use crate::{StepError, TopUpError, TopUpState};
use alloy_primitives::{B256, U256};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use topup_bridge::{BridgeInterface, Settlement, TopUpRequest};
use topup_types::{ChainId, Quote};
use topup_wallet::{AllowanceManager, ChainSwitchSettings, ChainSwitcher, WalletInterface};

pub const STEP_SWITCH_TO_SOURCE: u32 = 1;
pub const STEP_APPROVE: u32 = 2;
pub const STEP_DEPOSIT: u32 = 3;
pub const STEP_SETTLE: u32 = 4;
pub const STEP_SWITCH_BACK: u32 = 5;

/// Timing of the orchestrator.
#[derive(Debug, Clone)]
pub struct TopUpSettings {
	/// Delay after the last quote request before the bridge is asked.
	pub quote_debounce: Duration,
	/// Interval between destination balance checks after settlement.
	pub balance_wait_interval: Duration,
	/// Upper bound on the destination balance wait.
	pub balance_wait_timeout: Duration,
}

impl Default for TopUpSettings {
	fn default() -> Self {
		Self {
			quote_debounce: Duration::from_secs(1),
			balance_wait_interval: Duration::from_secs(6),
			balance_wait_timeout: Duration::from_secs(180),
		}
	}
}

/// Result of a completed top-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpOutcome {
	/// Hash of the deposit transaction on the source chain.
	pub deposit_tx: B256,
	pub settlement: Settlement,
	/// Whether the destination balance was seen to increase, `None` when the
	/// bridge does not call for that check.
	pub destination_balance_increased: Option<bool>,
}

/// Clears the busy flag when an attempt ends.
///
/// When the attempt future is dropped before it finished, the published state
/// still shows it running. The guard then fails the processing step and ends
/// loading. A dropped attempt does not switch the wallet back.
struct BusyGuard<'a> {
	busy: &'a AtomicBool,
	state: &'a watch::Sender<TopUpState>,
}

impl Drop for BusyGuard<'_> {
	fn drop(&mut self) {
		self.state.send_if_modified(|state| {
			if !state.is_loading {
				return false;
			}
			if let Some(step) = state.current_step() {
				if let Err(e) = state.progress.fail(step) {
					tracing::error!(step, error = %e, "Could not record step failure");
				}
			}
			state.is_loading = false;
			state.step_started_at = None;
			state.error = Some(TopUpError::Cancelled.user_message());
			tracing::warn!("Top-up attempt dropped before it finished");
			true
		});
		self.busy.store(false, Ordering::SeqCst);
	}
}

/// Drives top-up attempts and publishes their progress.
pub struct TopUpOrchestrator {
	wallet: Arc<dyn WalletInterface>,
	bridge: Arc<dyn BridgeInterface>,
	switcher: ChainSwitcher,
	allowances: AllowanceManager,
	app_chain_id: ChainId,
	settings: TopUpSettings,
	state: watch::Sender<TopUpState>,
	/// Last quote together with the request it answers.
	quoted: Mutex<Option<(TopUpRequest, Quote)>>,
	quote_generation: AtomicU64,
	busy: AtomicBool,
}

impl TopUpOrchestrator {
	pub fn new(
		wallet: Arc<dyn WalletInterface>,
		bridge: Arc<dyn BridgeInterface>,
		app_chain_id: ChainId,
		switch_settings: ChainSwitchSettings,
		settings: TopUpSettings,
	) -> Self {
		let (state, _) = watch::channel(TopUpState::default());
		Self {
			switcher: ChainSwitcher::new(wallet.clone(), switch_settings),
			allowances: AllowanceManager::new(wallet.clone()),
			wallet,
			bridge,
			app_chain_id,
			settings,
			state,
			quoted: Mutex::new(None),
			quote_generation: AtomicU64::new(0),
			busy: AtomicBool::new(false),
		}
	}

	pub fn app_chain_id(&self) -> ChainId {
		self.app_chain_id
	}

	/// Receiver notified on every state change.
	pub fn subscribe(&self) -> watch::Receiver<TopUpState> {
		self.state.subscribe()
	}

	/// Snapshot of the current state.
	pub fn state(&self) -> TopUpState {
		self.state.borrow().clone()
	}

	pub fn is_loading(&self) -> bool {
		self.busy.load(Ordering::SeqCst)
	}

	/// Requests a quote after the debounce delay.
	///
	/// The stored quote is cleared immediately. Returns `Ok(None)` when a
	/// newer request (or a reset) superseded this one, in which case the
	/// bridge is not asked or its answer is discarded. Refused while an
	/// attempt is running.
	pub async fn get_quote(&self, request: TopUpRequest) -> Result<Option<Quote>, TopUpError> {
		if self.is_loading() {
			return Err(TopUpError::Busy);
		}
		let generation = self.quote_generation.fetch_add(1, Ordering::SeqCst) + 1;
		*self.quoted.lock().await = None;
		self.state.send_if_modified(|state| state.quote.take().is_some());

		tokio::time::sleep(self.settings.quote_debounce).await;
		if self.quote_generation.load(Ordering::SeqCst) != generation {
			tracing::debug!(generation, "Quote request superseded before sending");
			return Ok(None);
		}

		let result = self.bridge.get_quote(&request).await;
		if self.quote_generation.load(Ordering::SeqCst) != generation {
			tracing::debug!(generation, "Discarding quote for superseded request");
			return Ok(None);
		}

		match result {
			Ok(quote) => {
				*self.quoted.lock().await = Some((request, quote.clone()));
				self.state.send_modify(|state| {
					state.quote = Some(quote.clone());
					state.error = None;
				});
				Ok(Some(quote))
			},
			Err(e) => {
				let err = TopUpError::from(e);
				let message = err.user_message();
				self.state.send_modify(|state| state.error = Some(message));
				Err(err)
			},
		}
	}

	/// Clears all transient state so a new attempt can start.
	///
	/// Refused while an attempt is running.
	pub async fn reset(&self) -> Result<(), TopUpError> {
		if self.is_loading() {
			return Err(TopUpError::Busy);
		}
		self.quote_generation.fetch_add(1, Ordering::SeqCst);
		*self.quoted.lock().await = None;
		self.state.send_replace(TopUpState::default());
		Ok(())
	}

	/// Runs one top-up attempt.
	///
	/// Uses the stored quote when it answers exactly this request, and asks
	/// the bridge for a fresh one otherwise.
	pub async fn start_top_up(
		&self,
		request: TopUpRequest,
		cancel: CancellationToken,
	) -> Result<TopUpOutcome, TopUpError> {
		if self.busy.swap(true, Ordering::SeqCst) {
			return Err(TopUpError::Busy);
		}
		let _busy = BusyGuard {
			busy: &self.busy,
			state: &self.state,
		};

		let cached = self
			.quoted
			.lock()
			.await
			.as_ref()
			.filter(|(quoted, _)| *quoted == request)
			.map(|(_, quote)| quote.clone());
		// Quote requests still in flight must not touch the attempt's state.
		self.quote_generation.fetch_add(1, Ordering::SeqCst);

		self.state.send_replace(TopUpState {
			is_loading: true,
			quote: cached.clone(),
			..Default::default()
		});

		tracing::info!(
			bridge = self.bridge.name(),
			from_chain = request.from_chain,
			to_chain = request.to_chain,
			amount = %request.amount,
			"Starting top-up"
		);

		let result = self.execute(&request, cached, &cancel).await;

		self.return_to_app_chain().await;

		self.state.send_modify(|state| {
			state.is_loading = false;
			state.step_started_at = None;
			if let Err(e) = &result {
				state.error.get_or_insert_with(|| e.user_message());
			}
		});

		match &result {
			Ok(outcome) => tracing::info!(deposit_tx = %outcome.deposit_tx, "Top-up completed"),
			Err(e) => tracing::warn!(error = %e, "Top-up did not complete"),
		}
		result
	}

	async fn execute(
		&self,
		request: &TopUpRequest,
		cached: Option<Quote>,
		cancel: &CancellationToken,
	) -> Result<TopUpOutcome, TopUpError> {
		let quote = match cached {
			Some(quote) => quote,
			None => {
				let quote = tokio::select! {
					biased;
					_ = cancel.cancelled() => return Err(TopUpError::Cancelled),
					quote = self.bridge.get_quote(request) => quote?,
				};
				self.state.send_modify(|state| state.quote = Some(quote.clone()));
				quote
			},
		};

		let steps = self.bridge.progress_steps(request, quote.estimated_time());
		self.state.send_modify(|state| state.steps = steps);

		self.run_step(STEP_SWITCH_TO_SOURCE, cancel, self.switch_chain(request.from_chain))
			.await?;

		self.run_step(STEP_APPROVE, cancel, async {
			if let Some(approval) = self.bridge.approval(request, &quote).await? {
				self.allowances
					.check_and_set_erc20_allowance(
						request.from_chain,
						approval.token,
						approval.spender,
						request.amount,
						request.sender,
						approval.amount,
					)
					.await?;
			}
			Ok::<_, TopUpError>(())
		})
		.await?;

		let (deposit_tx, handle, baseline) = self
			.run_step(STEP_DEPOSIT, cancel, async {
				// Balance before the deposit, read while the step is cancellable.
				let baseline = if self.bridge.waits_for_destination_balance() {
					self.destination_balance(request).await
				} else {
					None
				};
				let deposit = self.bridge.submit_deposit(request, &quote).await?;
				match deposit.handle {
					Some(handle) => Ok::<_, TopUpError>((deposit.tx_hash, handle, baseline)),
					None => Err(TopUpError::UntrackableDeposit(deposit.tx_hash)),
				}
			})
			.await?;

		let (settlement, destination_balance_increased) = self
			.run_step(STEP_SETTLE, cancel, async {
				let settlement = self
					.bridge
					.await_settlement(request, &handle, cancel)
					.await?
					.ok_or(TopUpError::SettlementUnconfirmed)?;
				let increased = match baseline {
					Some(baseline) => {
						Some(self.wait_for_balance_increase(request, baseline, cancel).await?)
					},
					None => None,
				};
				Ok::<_, TopUpError>((settlement, increased))
			})
			.await?;

		self.run_step(STEP_SWITCH_BACK, cancel, self.switch_chain(self.app_chain_id))
			.await?;

		Ok(TopUpOutcome {
			deposit_tx,
			settlement,
			destination_balance_increased,
		})
	}

	/// Runs `operation` as progress step `step`.
	async fn run_step<T, F>(
		&self,
		step: u32,
		cancel: &CancellationToken,
		operation: F,
	) -> Result<T, TopUpError>
	where
		F: Future<Output = Result<T, TopUpError>>,
	{
		self.update_progress(|state| {
			state.progress.start(step)?;
			state.step_started_at = Some(Instant::now());
			Ok(())
		})?;
		tracing::debug!(step, "Step started");

		let result = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(TopUpError::Cancelled),
			result = operation => result,
		};

		match result {
			Ok(value) => {
				self.update_progress(|state| {
					state.progress.complete(step)?;
					state.step_started_at = None;
					Ok(())
				})?;
				tracing::debug!(step, "Step completed");
				Ok(value)
			},
			Err(e) => {
				tracing::error!(step, error = %e, "Step failed");
				let message = e.user_message();
				if let Err(step_error) = self.update_progress(|state| {
					state.progress.fail(step)?;
					state.step_started_at = None;
					state.error = Some(message);
					Ok(())
				}) {
					tracing::error!(step, error = %step_error, "Could not record step failure");
				}
				Err(e)
			},
		}
	}

	/// Applies `update` and notifies subscribers only when it succeeds.
	fn update_progress(
		&self,
		update: impl FnOnce(&mut TopUpState) -> Result<(), StepError>,
	) -> Result<(), StepError> {
		let mut outcome = Ok(());
		self.state.send_if_modified(|state| {
			outcome = update(state);
			outcome.is_ok()
		});
		outcome
	}

	async fn switch_chain(&self, chain_id: ChainId) -> Result<(), TopUpError> {
		let result = self
			.switcher
			.switch_to_chain(chain_id, self.wallet.address())
			.await?;
		if result.success {
			Ok(())
		} else {
			Err(TopUpError::ChainSwitch(result.error.unwrap_or_else(|| {
				format!("Failed to switch to chain (Chain ID: {}).", chain_id)
			})))
		}
	}

	async fn return_to_app_chain(&self) {
		match self
			.switcher
			.switch_to_chain(self.app_chain_id, self.wallet.address())
			.await
		{
			Ok(result) if result.success => {
				tracing::debug!(chain_id = self.app_chain_id, "Wallet on application chain");
			},
			Ok(result) => {
				tracing::warn!(
					chain_id = self.app_chain_id,
					error = ?result.error,
					"Could not switch back to application chain"
				);
			},
			Err(e) => {
				tracing::warn!(
					chain_id = self.app_chain_id,
					error = %e,
					"Could not switch back to application chain"
				);
			},
		}
	}

	async fn destination_balance(&self, request: &TopUpRequest) -> Option<U256> {
		match self
			.wallet
			.get_balance(request.recipient, None, request.to_chain)
			.await
		{
			Ok(balance) => Some(balance),
			Err(e) => {
				tracing::warn!(
					chain_id = request.to_chain,
					error = %e,
					"Could not read destination balance, skipping balance wait"
				);
				None
			},
		}
	}

	/// Polls the destination native balance until it exceeds `baseline`.
	///
	/// Best effort: read errors and the timeout are logged and reported as
	/// `Ok(false)`. Only cancellation is an error.
	async fn wait_for_balance_increase(
		&self,
		request: &TopUpRequest,
		baseline: U256,
		cancel: &CancellationToken,
	) -> Result<bool, TopUpError> {
		let interval = self.settings.balance_wait_interval;
		let deadline = Instant::now() + self.settings.balance_wait_timeout;

		loop {
			match self
				.wallet
				.get_balance(request.recipient, None, request.to_chain)
				.await
			{
				Ok(balance) if balance > baseline => {
					tracing::info!(
						chain_id = request.to_chain,
						balance = %balance,
						"Destination balance increased"
					);
					return Ok(true);
				},
				Ok(_) => {},
				Err(e) => {
					tracing::warn!(chain_id = request.to_chain, error = %e, "Balance check failed");
				},
			}

			if Instant::now() + interval >= deadline {
				tracing::warn!(
					chain_id = request.to_chain,
					timeout_secs = self.settings.balance_wait_timeout.as_secs(),
					"Destination balance did not increase in time"
				);
				return Ok(false);
			}

			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(TopUpError::Cancelled),
				_ = tokio::time::sleep(interval) => {},
			}
		}
	}
}
