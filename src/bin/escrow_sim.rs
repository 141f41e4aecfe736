//! Escrow Simulator Binary
//!
//! Drives one derivative through a canonical lifecycle against the in-process
//! mock oracle gateway and a manual height clock, printing every notification
//! as a JSON line followed by a summary line.
//!
//! Usage:
//!   escrow-sim --scenario maker-wins
//!   escrow-sim --scenario rejected --config escrow_config.toml
//!
//! Environment:
//!   ESCROW_CONFIG_PATH - Engine config TOML (defaults apply when missing)
//!   ESCROW_SCENARIO - Scenario to run (default: maker-wins)
//!   RUST_LOG - Log filter (logs go to stderr)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use derivative_escrow::config::EngineConfig;
use derivative_escrow::escrow::{
    Amount, BroadcastSink, EngineDeps, EscrowService, Identity, InMemoryPositionRegistry,
    ManualClock, MintTerms, MockGatewayMode, MockOracleGateway, OracleResponse, PriceValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Observation below the trigger price pays the maker
    MakerWins,
    /// Observation at or above the trigger price pays the taker
    TakerWins,
    /// Gateway rejects the request synchronously
    Rejected,
    /// Gateway accepts, then reports a failure in the callback
    FailedCallback,
    /// Maker withdraws before anyone takes
    Cancel,
}

#[derive(Parser, Debug)]
#[command(name = "escrow-sim")]
#[command(about = "Binary derivative escrow simulator - run a lifecycle against a mock oracle")]
struct Args {
    /// Engine config file
    #[arg(long, env = "ESCROW_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Scenario to run
    #[arg(long, env = "ESCROW_SCENARIO", value_enum, default_value = "maker-wins")]
    scenario: Scenario,

    /// Maker deposit (smallest unit)
    #[arg(long, default_value = "10000000000000000")]
    maker_deposit: Amount,

    /// Required taker stake (smallest unit)
    #[arg(long, default_value = "20000000000000000")]
    taker_stake: Amount,

    /// Trigger price
    #[arg(long, default_value = "50000")]
    trigger_price: PriceValue,

    /// Observed value delivered by the oracle (derived from the scenario if omitted)
    #[arg(long)]
    observed: Option<PriceValue>,

    /// Height the clock starts at
    #[arg(long, default_value = "100")]
    start_height: u64,

    /// Trigger height offset from the start height
    #[arg(long, default_value = "10")]
    trigger_offset: u64,

    /// Balance funded to maker and taker before the run
    #[arg(long, default_value = "1000000000000000000")]
    initial_balance: Amount,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("derivative_escrow=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    if args.trigger_offset == 0 {
        bail!("--trigger-offset must be positive");
    }

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env(),
    };
    config.validate()?;

    info!("Starting escrow simulator");
    info!("  Scenario: {:?}", args.scenario);
    info!("  Oracle fee: {}", config.oracle_fee);
    info!("  Oracle identity: {}", config.oracle_identity);
    info!("  Payoff: {:?}", config.payoff);

    let clock = Arc::new(ManualClock::new(args.start_height));
    let gateway = Arc::new(MockOracleGateway::new());
    let registry = Arc::new(InMemoryPositionRegistry::new(config.registry.clone()));
    let service = EscrowService::from_config(
        &config,
        EngineDeps {
            clock: clock.clone(),
            gateway: gateway.clone(),
            registry: registry.clone(),
        },
    );

    let sink = BroadcastSink::new(config.notification_capacity);
    let mut rx = sink.subscribe();
    service.add_sink(Arc::new(sink));

    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to encode notification {}: {}", notification.seq, e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Printer lagged, {} notifications dropped", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let maker = Identity::from("maker");
    let taker = Identity::from("taker");
    let keeper = Identity::from("keeper");
    let oracle = config.oracle_identity.clone();

    service.fund_account(&maker, args.initial_balance)?;
    service.fund_account(&taker, args.initial_balance)?;

    let trigger_height = args.start_height + args.trigger_offset;
    let id = service.mint(
        MintTerms {
            taker_amount: args.taker_stake,
            trigger_price: args.trigger_price,
            trigger_height,
            deposit: args.maker_deposit,
        },
        &maker,
    )?;

    if args.scenario == Scenario::Cancel {
        service.cancel(id, &maker)?;
    } else {
        service.take(id, args.taker_stake, &taker)?;
        clock.advance_to(trigger_height);

        if args.scenario == Scenario::Rejected {
            gateway.set_mode(MockGatewayMode::FailNotEnoughFee);
        }
        let handle = service.settle(id, &keeper)?;

        if handle.is_accepted() {
            let response = match args.scenario {
                Scenario::FailedCallback => OracleResponse::Failed { status: -1 },
                Scenario::TakerWins => {
                    OracleResponse::Observed(args.observed.unwrap_or(args.trigger_price))
                }
                _ => OracleResponse::Observed(
                    args.observed
                        .unwrap_or_else(|| args.trigger_price.saturating_sub(1)),
                ),
            };
            clock.advance_by(1);
            service.on_oracle_response(handle, response, &oracle)?;
        }
    }

    let record = service
        .record(id)
        .context("derivative vanished from the ledger")?;
    let violations = service.audit();
    let summary = json!({
        "summary": {
            "scenario": format!("{:?}", args.scenario),
            "id": id,
            "state": record.state().as_str(),
            "maker_balance": service.balance_of(&maker).to_string(),
            "taker_balance": service.balance_of(&taker).to_string(),
            "oracle_balance": service.balance_of(&oracle).to_string(),
            "escrow_total": service.escrow_total().to_string(),
            "fees_paid_total": service.fees_paid_total().to_string(),
            "registry": {
                "name": registry.name(),
                "symbol": registry.symbol(),
                "decimals": registry.decimals(),
                "total_supply": registry.total_supply(),
            },
            "audit_violations": violations.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
        }
    });

    // Dropping the service closes the broadcast channel and ends the printer
    drop(service);
    printer.await.context("notification printer panicked")?;
    println!("{}", summary);

    if !violations.is_empty() {
        bail!("audit found {} violations", violations.len());
    }
    info!("Simulation complete");
    Ok(())
}
