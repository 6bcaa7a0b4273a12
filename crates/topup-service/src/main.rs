//! Main entry point for the ROFL top-up service.
//!
//! Loads the configuration, builds the wallet, bridge and orchestrator, and
//! runs one command:
//!
//! ```bash
//! topup --config topup.toml quote --from-chain 8453 --token USDC --amount 10
//! topup --config topup.toml balance --chain 8453 --token USDC
//! topup --config topup.toml plan --chain 8453 --token USDC --required 10
//! topup --config topup.toml run --from-chain 8453 --token USDC --amount 10
//! ```

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use topup_config::Config;
use topup_core::{plan_funding, FundingPlan, TopUpState};
use topup_service::{build_service_from_config, TopUpService};
use topup_types::{format_units, format_units_truncated, ChainId, StepStatuses};

/// Command-line arguments for the top-up service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "TOPUP_CONFIG", default_value = "config/topup.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Quote a top-up to the application chain
	Quote {
		#[arg(long)]
		from_chain: ChainId,
		/// Token symbol, address or `native`
		#[arg(long)]
		token: String,
		/// Amount in whole tokens, e.g. `1.5`
		#[arg(long)]
		amount: String,
	},
	/// Show a balance of the connected account
	Balance {
		#[arg(long)]
		chain: ChainId,
		#[arg(long, default_value = "native")]
		token: String,
	},
	/// Check whether the balance covers an amount or needs a top-up first
	Plan {
		#[arg(long)]
		chain: ChainId,
		#[arg(long)]
		token: String,
		#[arg(long)]
		required: String,
	},
	/// Execute a top-up to the application chain
	Run {
		#[arg(long)]
		from_chain: ChainId,
		#[arg(long)]
		token: String,
		#[arg(long)]
		amount: String,
		/// Destination account, defaults to the connected account
		#[arg(long)]
		recipient: Option<Address>,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!(path = %args.config.display(), app_chain = config.app_chain_id(), "Loaded configuration");

	let service = build_service_from_config(&config)?;

	match args.command {
		Command::Quote {
			from_chain,
			token,
			amount,
		} => quote(&service, from_chain, &token, &amount).await,
		Command::Balance { chain, token } => balance(&service, chain, &token).await,
		Command::Plan {
			chain,
			token,
			required,
		} => plan(&service, chain, &token, &required).await,
		Command::Run {
			from_chain,
			token,
			amount,
			recipient,
		} => run(&service, from_chain, &token, &amount, recipient).await,
	}
}

async fn quote(
	service: &TopUpService,
	from_chain: ChainId,
	token: &str,
	amount: &str,
) -> anyhow::Result<()> {
	let request = service.top_up_request(from_chain, token, amount, None)?;
	let destination = service.network(request.to_chain)?;

	match service.orchestrator.get_quote(request).await? {
		Some(quote) => {
			let received = quote
				.destination_amount()
				.map(|a| format_units_truncated(a, destination.native_decimals, 4))
				.unwrap_or_else(|| "unknown".to_string());
			println!("You receive: {} {}", received, destination.native_symbol);
			if let Some(seconds) = quote.estimated_time() {
				println!("Estimated time: {}s", seconds);
			}
		},
		None => println!("Quote superseded"),
	}
	Ok(())
}

async fn balance(service: &TopUpService, chain: ChainId, token: &str) -> anyhow::Result<()> {
	let (token, _) = service.parse_amount(chain, token, "0")?;
	let balance = service
		.balances
		.get_balance(token.address, service.account()?, chain)
		.await?;
	println!("{} {}", balance.formatted, balance.symbol);
	Ok(())
}

async fn plan(
	service: &TopUpService,
	chain: ChainId,
	token: &str,
	required: &str,
) -> anyhow::Result<()> {
	let (token, required) = service.parse_amount(chain, token, required)?;
	let plan = plan_funding(
		&service.balances,
		service.account()?,
		chain,
		token.address,
		required,
	)
	.await?;
	match plan {
		FundingPlan::Direct => println!("Balance covers the amount, no top-up needed"),
		FundingPlan::TopUp { shortfall } => {
			println!(
				"Top-up needed: short by {}",
				format_units(shortfall, token.decimals)
			)
		},
	}
	Ok(())
}

async fn run(
	service: &TopUpService,
	from_chain: ChainId,
	token: &str,
	amount: &str,
	recipient: Option<Address>,
) -> anyhow::Result<()> {
	let request = service.top_up_request(from_chain, token, amount, recipient)?;

	let cancel = CancellationToken::new();
	let ctrl_c = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::info!("Received interrupt, cancelling top-up");
			ctrl_c.cancel();
		}
	});

	let mut rx = service.orchestrator.subscribe();
	tokio::spawn(async move {
		let mut seen = StepStatuses::new();
		while rx.changed().await.is_ok() {
			let state = rx.borrow_and_update().clone();
			log_step_changes(&state, &seen);
			seen = state.step_statuses().clone();
		}
	});

	let outcome = service.orchestrator.start_top_up(request, cancel).await?;

	println!("Deposit: {}", outcome.deposit_tx);
	if let Some(hash) = &outcome.settlement.destination_tx_hash {
		println!("Destination transaction: {}", hash);
	}
	if outcome.destination_balance_increased == Some(false) {
		println!("Settled, but the destination balance has not updated yet");
	}
	Ok(())
}

fn log_step_changes(state: &TopUpState, seen: &StepStatuses) {
	for step in &state.steps {
		let status = state.step_status(step.id);
		if seen.get(&step.id).copied().unwrap_or_default() != status {
			tracing::info!(
				step = step.id,
				label = %step.label,
				status = %status,
				"{}",
				step.description
			);
		}
	}
}
