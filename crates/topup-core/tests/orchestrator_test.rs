//! End-to-end tests of the top-up orchestrator against an in-memory wallet
//! and a mocked bridge.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use topup_bridge::{
	Approval, BridgeError, Deposit, MockBridgeInterface, Settlement, SettlementHandle, TopUpRequest,
};
use topup_core::{TopUpError, TopUpOrchestrator, TopUpSettings, TopUpState};
use topup_types::{ChainId, ProgressStep, Quote, StepStatus, Transaction, TransactionReceipt};
use topup_wallet::{ChainSwitchSettings, WalletError, WalletInterface};

const APP_CHAIN: ChainId = 23294;
const SOURCE_CHAIN: ChainId = 8453;
const USER: Address = Address::repeat_byte(0x11);
const TOKEN: Address = Address::repeat_byte(0xaa);
const VAULT: Address = Address::repeat_byte(0xbb);
const DEPOSIT_TX: B256 = B256::repeat_byte(0xd0);

/// Wallet whose active chain changes only through `switch_chain`.
struct FakeWallet {
	address: Option<Address>,
	chain: AtomicU64,
	switches: Mutex<Vec<ChainId>>,
	sent: Mutex<Vec<Transaction>>,
	switch_error: Option<String>,
	send_error: Option<(String, Option<String>)>,
	/// Destination balance reads never return.
	balance_hangs: bool,
	/// Destination native balances, the last one repeats.
	balances: Mutex<VecDeque<U256>>,
}

impl FakeWallet {
	fn new() -> Self {
		Self {
			address: Some(USER),
			chain: AtomicU64::new(APP_CHAIN),
			switches: Mutex::new(Vec::new()),
			sent: Mutex::new(Vec::new()),
			switch_error: None,
			send_error: None,
			balance_hangs: false,
			balances: Mutex::new(VecDeque::from([U256::from(100u64)])),
		}
	}

	fn with_balances(self, balances: &[u64]) -> Self {
		*self.balances.lock().unwrap() = balances.iter().map(|b| U256::from(*b)).collect();
		self
	}

	fn switches(&self) -> Vec<ChainId> {
		self.switches.lock().unwrap().clone()
	}

	fn sent(&self) -> Vec<Transaction> {
		self.sent.lock().unwrap().clone()
	}
}

#[async_trait]
impl WalletInterface for FakeWallet {
	fn address(&self) -> Option<Address> {
		self.address
	}

	async fn get_chain_id(&self) -> Result<ChainId, WalletError> {
		Ok(self.chain.load(Ordering::SeqCst))
	}

	async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
		if let Some(message) = &self.switch_error {
			return Err(WalletError::provider(message.clone()));
		}
		self.switches.lock().unwrap().push(chain_id);
		self.chain.store(chain_id, Ordering::SeqCst);
		Ok(())
	}

	async fn send_transaction(&self, tx: Transaction) -> Result<B256, WalletError> {
		let active = self.chain.load(Ordering::SeqCst);
		if tx.chain_id != active {
			return Err(WalletError::WrongChain {
				active,
				requested: tx.chain_id,
			});
		}
		if let Some((message, short_message)) = &self.send_error {
			return Err(WalletError::Provider {
				message: message.clone(),
				short_message: short_message.clone(),
			});
		}
		self.sent.lock().unwrap().push(tx);
		Ok(B256::repeat_byte(0xa9))
	}

	async fn read_contract(
		&self,
		_chain_id: ChainId,
		_to: Address,
		_data: Bytes,
	) -> Result<Bytes, WalletError> {
		// Zero allowance, ABI encoded.
		Ok(Bytes::from(U256::ZERO.to_be_bytes::<32>().to_vec()))
	}

	async fn wait_for_transaction_receipt(
		&self,
		hash: B256,
		_chain_id: ChainId,
	) -> Result<TransactionReceipt, WalletError> {
		Ok(TransactionReceipt {
			transaction_hash: hash,
			block_number: 1,
			transaction_index: Some(0),
			success: true,
			logs: vec![],
		})
	}

	async fn get_balance(
		&self,
		_address: Address,
		token: Option<Address>,
		chain_id: ChainId,
	) -> Result<U256, WalletError> {
		if token.is_some() || chain_id != APP_CHAIN {
			return Ok(U256::ZERO);
		}
		if self.balance_hangs {
			std::future::pending::<()>().await;
		}
		let mut balances = self.balances.lock().unwrap();
		let balance = balances.front().copied().unwrap_or_default();
		if balances.len() > 1 {
			balances.pop_front();
		}
		Ok(balance)
	}
}

fn request() -> TopUpRequest {
	TopUpRequest {
		from_chain: SOURCE_CHAIN,
		from_token: TOKEN,
		amount: U256::from(1_000_000u64),
		to_chain: APP_CHAIN,
		to_token: Address::ZERO,
		sender: USER,
		recipient: USER,
	}
}

fn steps() -> Vec<ProgressStep> {
	vec![
		ProgressStep::new(1, "Switch network", "Switching wallet to Base"),
		ProgressStep::new(2, "Approve", "Approving USDC").with_expected_time(15),
		ProgressStep::new(3, "Deposit", "Depositing USDC on Base").with_expected_time(15),
		ProgressStep::new(4, "Settle", "Waiting for ROSE").with_expected_time(60),
		ProgressStep::new(5, "Switch back", "Switching wallet back to Sapphire"),
	]
}

fn fixed_quote() -> Quote {
	Quote::FixedRate {
		amount: U256::from(5u64),
	}
}

/// Bridge mock with the static parts of a paymaster-like bridge.
fn bridge(waits_for_balance: bool) -> MockBridgeInterface {
	let mut bridge = MockBridgeInterface::new();
	bridge.expect_name().return_const("paymaster");
	bridge.expect_progress_steps().returning(|_, _| steps());
	bridge
		.expect_waits_for_destination_balance()
		.return_const(waits_for_balance);
	bridge.expect_approval().returning(|request, _| {
		let token = request.from_token;
		let amount = request.amount;
		Box::pin(async move {
			Ok(Some(Approval {
				token,
				spender: VAULT,
				amount: Some(amount),
			}))
		})
	});
	bridge
}

fn with_quote(bridge: &mut MockBridgeInterface) {
	bridge
		.expect_get_quote()
		.times(1)
		.returning(|_| Box::pin(async { Ok(fixed_quote()) }));
}

fn with_deposit(bridge: &mut MockBridgeInterface) {
	bridge.expect_submit_deposit().times(1).returning(|_, _| {
		Box::pin(async {
			Ok(Deposit {
				tx_hash: DEPOSIT_TX,
				handle: Some(SettlementHandle::SourceTransaction(DEPOSIT_TX)),
			})
		})
	});
}

fn with_settlement(bridge: &mut MockBridgeInterface) {
	bridge.expect_await_settlement().times(1).returning(|_, _, _| {
		Box::pin(async {
			Ok(Some(Settlement {
				destination_tx_hash: Some("0xdest".to_string()),
			}))
		})
	});
}

fn orchestrator(wallet: Arc<FakeWallet>, bridge: MockBridgeInterface) -> TopUpOrchestrator {
	TopUpOrchestrator::new(
		wallet,
		Arc::new(bridge),
		APP_CHAIN,
		ChainSwitchSettings::default(),
		TopUpSettings::default(),
	)
}

fn statuses(state: &TopUpState) -> Vec<StepStatus> {
	(1..=5).map(|step| state.step_status(step)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_all_steps_complete() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	with_settlement(&mut bridge);
	let orchestrator = orchestrator(wallet.clone(), bridge);

	let outcome = orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(outcome.deposit_tx, DEPOSIT_TX);
	assert_eq!(
		outcome.settlement.destination_tx_hash.as_deref(),
		Some("0xdest")
	);
	assert_eq!(outcome.destination_balance_increased, None);

	let state = orchestrator.state();
	assert_eq!(statuses(&state), vec![StepStatus::Completed; 5]);
	assert_eq!(state.current_step(), None);
	assert!(state.is_terminal());
	assert!(!state.is_loading);
	assert_eq!(state.error, None);
	assert_eq!(state.quote, Some(fixed_quote()));

	// Approval went out on the source chain, then the wallet came back.
	let sent = wallet.sent();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].chain_id, SOURCE_CHAIN);
	assert_eq!(sent[0].to, TOKEN);
	assert_eq!(wallet.switches(), vec![SOURCE_CHAIN, APP_CHAIN]);

	// Nothing changes once the flow is finished.
	let mut rx = orchestrator.subscribe();
	rx.borrow_and_update();
	tokio::time::sleep(Duration::from_secs(60)).await;
	assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_deposit_failure_still_switches_back() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	bridge.expect_submit_deposit().times(1).returning(|_, _| {
		Box::pin(async {
			Err(BridgeError::Wallet(WalletError::provider(
				"insufficient funds",
			)))
		})
	});
	bridge.expect_await_settlement().times(0);
	let orchestrator = orchestrator(wallet.clone(), bridge);

	let result = orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await;

	assert!(matches!(result, Err(TopUpError::Wallet(_))));
	let state = orchestrator.state();
	assert_eq!(
		statuses(&state),
		vec![
			StepStatus::Completed,
			StepStatus::Completed,
			StepStatus::Error,
			StepStatus::Pending,
			StepStatus::Pending,
		]
	);
	assert_eq!(state.current_step(), None);
	assert_eq!(state.error.as_deref(), Some("insufficient funds"));
	assert!(state.is_terminal());
	assert!(!state.is_loading);
	assert!(!orchestrator.is_loading());

	// Step 5 never ran, the final switch back did.
	assert_eq!(wallet.switches(), vec![SOURCE_CHAIN, APP_CHAIN]);
}

#[tokio::test(start_paused = true)]
async fn test_wallet_short_message_is_shown() {
	let mut wallet = FakeWallet::new();
	wallet.send_error = Some((
		"User rejected the request. Request Arguments: from: 0x1111 Version: 2.21".to_string(),
		Some("User rejected the request.".to_string()),
	));
	let wallet = Arc::new(wallet);
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	bridge.expect_submit_deposit().times(0);
	let orchestrator = orchestrator(wallet.clone(), bridge);

	let result = orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await;

	assert!(result.is_err());
	let state = orchestrator.state();
	assert_eq!(state.step_status(2), StepStatus::Error);
	assert_eq!(state.error.as_deref(), Some("User rejected the request."));
	assert_eq!(wallet.switches(), vec![SOURCE_CHAIN, APP_CHAIN]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_switch_stops_at_first_step() {
	let mut wallet = FakeWallet::new();
	wallet.switch_error = Some("User rejected the request.".to_string());
	let wallet = Arc::new(wallet);
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	bridge.expect_submit_deposit().times(0);
	let orchestrator = orchestrator(wallet.clone(), bridge);

	let result = orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await;

	assert!(matches!(result, Err(TopUpError::ChainSwitch(_))));
	let state = orchestrator.state();
	assert_eq!(state.step_status(1), StepStatus::Error);
	assert!((2..=5).all(|step| state.step_status(step) == StepStatus::Pending));
	assert!(wallet.sent().is_empty());
	// Still on the app chain, so no switch back was needed.
	assert!(wallet.switches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_progress_only_moves_forward() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	with_settlement(&mut bridge);
	let orchestrator = orchestrator(wallet, bridge);

	let mut rx = orchestrator.subscribe();
	let collector = tokio::spawn(async move {
		let mut snapshots = Vec::new();
		while rx.changed().await.is_ok() {
			snapshots.push(rx.borrow_and_update().clone());
		}
		snapshots
	});

	orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await
		.unwrap();
	drop(orchestrator);
	let snapshots = collector.await.unwrap();
	assert!(!snapshots.is_empty());

	fn rank(status: StepStatus) -> u8 {
		match status {
			StepStatus::Pending => 0,
			StepStatus::Processing => 1,
			_ if status.is_final() => 2,
			_ => unreachable!(),
		}
	}

	let mut previous = vec![StepStatus::Pending; 5];
	for snapshot in &snapshots {
		let current = statuses(snapshot);
		for (before, after) in previous.iter().zip(&current) {
			assert!(rank(*before) <= rank(*after), "{before} -> {after}");
		}
		// A step only runs after every earlier step completed.
		for (index, status) in current.iter().enumerate() {
			if *status != StepStatus::Pending {
				assert!(current[..index].iter().all(|s| *s == StepStatus::Completed));
			}
		}
		assert!(
			current
				.iter()
				.filter(|s| **s == StepStatus::Processing)
				.count() <= 1
		);
		previous = current;
	}
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_settlement() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	bridge.expect_await_settlement().times(1).returning(|_, _, _| {
		Box::pin(std::future::pending::<
			Result<Option<Settlement>, BridgeError>,
		>())
	});
	let orchestrator = orchestrator(wallet.clone(), bridge);

	let cancel = CancellationToken::new();
	let trigger = cancel.clone();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_secs(30)).await;
		trigger.cancel();
	});

	let result = orchestrator.start_top_up(request(), cancel).await;

	assert!(matches!(result, Err(TopUpError::Cancelled)));
	let state = orchestrator.state();
	assert_eq!(state.step_status(3), StepStatus::Completed);
	assert_eq!(state.step_status(4), StepStatus::Error);
	assert_eq!(state.step_status(5), StepStatus::Pending);
	assert_eq!(state.error.as_deref(), Some("Top-up cancelled"));
	assert_eq!(wallet.switches(), vec![SOURCE_CHAIN, APP_CHAIN]);
}

#[tokio::test(start_paused = true)]
async fn test_untrackable_deposit_fails_deposit_step() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(true);
	with_quote(&mut bridge);
	bridge.expect_submit_deposit().times(1).returning(|_, _| {
		Box::pin(async {
			Ok(Deposit {
				tx_hash: DEPOSIT_TX,
				handle: None,
			})
		})
	});
	bridge.expect_await_settlement().times(0);
	let orchestrator = orchestrator(wallet, bridge);

	let result = orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await;

	assert!(matches!(result, Err(TopUpError::UntrackableDeposit(hash)) if hash == DEPOSIT_TX));
	assert_eq!(orchestrator.state().step_status(3), StepStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_settlement_fails_settle_step() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	bridge
		.expect_await_settlement()
		.times(1)
		.returning(|_, _, _| Box::pin(async { Ok(None) }));
	let orchestrator = orchestrator(wallet, bridge);

	let result = orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await;

	assert!(matches!(result, Err(TopUpError::SettlementUnconfirmed)));
	let state = orchestrator.state();
	assert_eq!(state.step_status(4), StepStatus::Error);
	assert_eq!(
		state.error.as_deref(),
		Some("Settlement not confirmed yet, the funds may still arrive")
	);
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_destination_balance() {
	let wallet = Arc::new(FakeWallet::new().with_balances(&[100, 100, 100, 150]));
	let mut bridge = bridge(true);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	with_settlement(&mut bridge);
	let orchestrator = orchestrator(wallet, bridge);

	let outcome = orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(outcome.destination_balance_increased, Some(true));
	assert!(orchestrator.state().progress.all_completed(&steps()));
}

#[tokio::test(start_paused = true)]
async fn test_balance_wait_timeout_does_not_fail_flow() {
	let wallet = Arc::new(FakeWallet::new().with_balances(&[100]));
	let mut bridge = bridge(true);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	with_settlement(&mut bridge);
	let orchestrator = orchestrator(wallet, bridge);

	let started = tokio::time::Instant::now();
	let outcome = orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(outcome.destination_balance_increased, Some(false));
	assert!(started.elapsed() >= Duration::from_secs(170));
	assert_eq!(orchestrator.state().step_status(5), StepStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_quote_is_debounced_and_reused() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	with_settlement(&mut bridge);
	let orchestrator = orchestrator(wallet, bridge);

	let mut first = request();
	first.amount = U256::from(1u64);
	let (superseded, latest) = tokio::join!(orchestrator.get_quote(first), async {
		tokio::time::sleep(Duration::from_millis(500)).await;
		orchestrator.get_quote(request()).await
	});

	assert_eq!(superseded.unwrap(), None);
	assert_eq!(latest.unwrap(), Some(fixed_quote()));
	assert_eq!(orchestrator.state().quote, Some(fixed_quote()));

	// The stored quote answers this request, so the bridge is not asked again.
	orchestrator
		.start_top_up(request(), CancellationToken::new())
		.await
		.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_quote_error_is_published() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	bridge.expect_get_quote().times(1).returning(|_| {
		Box::pin(async {
			Err(BridgeError::Api {
				status: 500,
				message: "upstream down".to_string(),
			})
		})
	});
	let orchestrator = orchestrator(wallet, bridge);

	let result = orchestrator.get_quote(request()).await;

	assert!(matches!(result, Err(TopUpError::Bridge(_))));
	let state = orchestrator.state();
	assert_eq!(state.quote, None);
	assert_eq!(
		state.error.as_deref(),
		Some("Bridge API error (500): upstream down")
	);
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_at_a_time() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	bridge.expect_await_settlement().times(1).returning(|_, _, _| {
		Box::pin(std::future::pending::<
			Result<Option<Settlement>, BridgeError>,
		>())
	});
	let orchestrator = Arc::new(orchestrator(wallet, bridge));

	let cancel = CancellationToken::new();
	let running = {
		let orchestrator = orchestrator.clone();
		let cancel = cancel.clone();
		tokio::spawn(async move { orchestrator.start_top_up(request(), cancel).await })
	};
	tokio::time::sleep(Duration::from_secs(10)).await;

	assert!(orchestrator.is_loading());
	assert_eq!(orchestrator.state().current_step(), Some(4));
	assert!(matches!(
		orchestrator
			.start_top_up(request(), CancellationToken::new())
			.await,
		Err(TopUpError::Busy)
	));
	assert!(matches!(orchestrator.reset().await, Err(TopUpError::Busy)));
	assert!(matches!(
		orchestrator.get_quote(request()).await,
		Err(TopUpError::Busy)
	));
	assert_eq!(orchestrator.state().quote, Some(fixed_quote()));
	assert_eq!(orchestrator.state().error, None);

	cancel.cancel();
	assert!(matches!(
		running.await.unwrap(),
		Err(TopUpError::Cancelled)
	));

	orchestrator.reset().await.unwrap();
	assert_eq!(orchestrator.state(), TopUpState::default());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_reading_balance_baseline() {
	let mut wallet = FakeWallet::new();
	wallet.balance_hangs = true;
	let wallet = Arc::new(wallet);
	let mut bridge = bridge(true);
	with_quote(&mut bridge);
	bridge.expect_submit_deposit().times(0);
	bridge.expect_await_settlement().times(0);
	let orchestrator = orchestrator(wallet.clone(), bridge);

	let cancel = CancellationToken::new();
	let trigger = cancel.clone();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_secs(10)).await;
		trigger.cancel();
	});

	let result = tokio::time::timeout(
		Duration::from_secs(60),
		orchestrator.start_top_up(request(), cancel),
	)
	.await
	.expect("cancellation ends the attempt");

	assert!(matches!(result, Err(TopUpError::Cancelled)));
	let state = orchestrator.state();
	assert_eq!(
		statuses(&state),
		vec![
			StepStatus::Completed,
			StepStatus::Completed,
			StepStatus::Error,
			StepStatus::Pending,
			StepStatus::Pending,
		]
	);
	assert_eq!(state.error.as_deref(), Some("Top-up cancelled"));
	assert!(!state.is_loading);
	assert_eq!(wallet.switches(), vec![SOURCE_CHAIN, APP_CHAIN]);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_attempt_ends_loading() {
	let wallet = Arc::new(FakeWallet::new());
	let mut bridge = bridge(false);
	with_quote(&mut bridge);
	with_deposit(&mut bridge);
	bridge.expect_await_settlement().times(1).returning(|_, _, _| {
		Box::pin(std::future::pending::<
			Result<Option<Settlement>, BridgeError>,
		>())
	});
	let orchestrator = orchestrator(wallet.clone(), bridge);
	let mut rx = orchestrator.subscribe();

	let result = tokio::time::timeout(
		Duration::from_secs(30),
		orchestrator.start_top_up(request(), CancellationToken::new()),
	)
	.await;
	assert!(result.is_err());

	assert!(rx.has_changed().unwrap());
	let state = rx.borrow_and_update().clone();
	assert!(!orchestrator.is_loading());
	assert!(!state.is_loading);
	assert_eq!(state.current_step(), None);
	assert_eq!(state.step_status(3), StepStatus::Completed);
	assert_eq!(state.step_status(4), StepStatus::Error);
	assert_eq!(state.step_status(5), StepStatus::Pending);
	assert_eq!(state.error.as_deref(), Some("Top-up cancelled"));
	// A dropped attempt does not switch back.
	assert_eq!(wallet.switches(), vec![SOURCE_CHAIN]);
}
