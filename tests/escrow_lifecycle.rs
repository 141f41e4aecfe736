//! Integration tests for the escrow engine public API
//!
//! Drives the shared service the way an embedding host would: config from a
//! TOML file, mock gateway, manual clock, notification log.

use std::sync::Arc;

use derivative_escrow::config::EngineConfig;
use derivative_escrow::escrow::{
    DerivativeEvent, DerivativeState, EngineDeps, EscrowError, EscrowService, EventLog, Identity,
    InMemoryPositionRegistry, ManualClock, MintTerms, MockGatewayMode, MockOracleGateway,
    OracleResponse, Party, Resolution, TakerWinsWhen,
};

const E16: u128 = 10_000_000_000_000_000;

struct Setup {
    service: EscrowService,
    clock: Arc<ManualClock>,
    gateway: Arc<MockOracleGateway>,
    registry: Arc<InMemoryPositionRegistry>,
    log: Arc<EventLog>,
    config: EngineConfig,
}

fn setup(config: EngineConfig) -> Setup {
    let clock = Arc::new(ManualClock::new(1_000));
    let gateway = Arc::new(MockOracleGateway::new());
    let registry = Arc::new(InMemoryPositionRegistry::new(config.registry.clone()));
    let log = Arc::new(EventLog::new());
    let service = EscrowService::from_config(
        &config,
        EngineDeps {
            clock: clock.clone(),
            gateway: gateway.clone(),
            registry: registry.clone(),
        },
    );
    service.add_sink(log.clone());
    Setup {
        service,
        clock,
        gateway,
        registry,
        log,
        config,
    }
}

fn terms(trigger_price: u64, trigger_height: u64) -> MintTerms {
    MintTerms {
        taker_amount: 2 * E16,
        trigger_price,
        trigger_height,
        deposit: E16,
    }
}

#[test]
fn test_config_file_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("escrow_config.toml");
    std::fs::write(
        &path,
        r#"
oracle_fee = 1000000
oracle_identity = "town-crier"

[payoff]
taker_wins_when = "above"
failure_fee_allocation = "proportional"

[registry]
name = "Test Fees"
symbol = "TF"
"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.payoff.taker_wins_when, TakerWinsWhen::Above);
    assert_eq!(config.registry.decimals, 2);

    let s = setup(config);
    let maker = Identity::from("alice");
    let taker = Identity::from("bob");
    s.service.fund_account(&maker, 10 * E16).unwrap();
    s.service.fund_account(&taker, 10 * E16).unwrap();

    let id = s.service.mint(terms(40, 1_010), &maker).unwrap();
    s.service.take(id, 2 * E16, &taker).unwrap();
    s.clock.advance_to(1_010);
    let handle = s.service.settle(id, &taker).unwrap();

    // "above" is strict: equal observation pays the maker
    let oracle = Identity::from("town-crier");
    let resolution = s
        .service
        .on_oracle_response(handle, OracleResponse::from_callback(0, 40), &oracle)
        .unwrap();
    match resolution {
        Resolution::Paid(payout) => {
            assert_eq!(payout.winner, Party::Maker);
            assert_eq!(payout.amount, 3 * E16 - 1_000_000);
        }
        other => panic!("expected payout, got {:?}", other),
    }
    assert_eq!(s.registry.name(), "Test Fees");
    assert!(s.service.audit().is_empty());
}

#[test]
fn test_many_positions_share_one_ledger() {
    let s = setup(EngineConfig::default());
    let fee = s.config.oracle_fee_amount();
    let oracle = s.config.oracle_identity.clone();
    let makers: Vec<Identity> = (0..4).map(|i| Identity::new(format!("maker-{}", i))).collect();
    let taker = Identity::from("taker");
    let keeper = Identity::from("keeper");

    for maker in &makers {
        s.service.fund_account(maker, E16 * 5).unwrap();
    }
    s.service.fund_account(&taker, E16 * 20).unwrap();

    let ids: Vec<_> = makers
        .iter()
        .map(|maker| s.service.mint(terms(50_000, 1_005), maker).unwrap())
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(s.registry.total_supply(), 4);

    // 0 canceled, 1 untaken, 2 and 3 taken
    s.service.cancel(ids[0], &makers[0]).unwrap();
    s.service.take(ids[2], 2 * E16, &taker).unwrap();
    s.service.take(ids[3], 2 * E16, &taker).unwrap();

    s.clock.advance_to(1_005);
    let h2 = s.service.settle(ids[2], &keeper).unwrap();
    s.gateway.set_mode(MockGatewayMode::FailUpgraded);
    let h3 = s.service.settle(ids[3], &keeper).unwrap();
    assert!(h3.is_rejection());
    assert_eq!(s.service.pending_requests(), vec![(h2, ids[2])]);

    s.service.on_oracle_result(h2, 60_000, &oracle).unwrap();

    let states: Vec<_> = ids.iter().map(|id| s.service.state(*id).unwrap()).collect();
    assert_eq!(
        states,
        vec![
            DerivativeState::Closed,
            DerivativeState::Open,
            DerivativeState::Closed,
            DerivativeState::Closed,
        ]
    );
    assert_eq!(s.service.escrow_total(), E16);
    assert_eq!(s.service.fees_paid_total(), 2 * fee);
    assert_eq!(s.service.balance_of(&oracle), 2 * fee);
    assert_eq!(
        s.service.balance_of(&taker),
        20 * E16 - 4 * E16 + (3 * E16 - fee) + (2 * E16 - fee)
    );
    assert_eq!(s.service.balance_of(&makers[3]), 5 * E16);
    assert_eq!(s.registry.active_count(), 1);
    assert!(s.service.audit().is_empty());

    // Records stay queryable after closing
    assert_eq!(s.service.records().len(), 4);
    assert!(s.service.record(ids[0]).unwrap().settled);
}

#[test]
fn test_retry_after_failed_round_is_a_new_operation() {
    let s = setup(EngineConfig::default());
    let maker = Identity::from("maker");
    let taker = Identity::from("taker");
    s.service.fund_account(&maker, 10 * E16).unwrap();
    s.service.fund_account(&taker, 10 * E16).unwrap();
    let id = s.service.mint(terms(50_000, 1_001), &maker).unwrap();
    s.service.take(id, 2 * E16, &taker).unwrap();
    s.clock.advance_by(1);

    s.gateway.set_mode(MockGatewayMode::FailNotEnoughFee);
    s.service.settle(id, &maker).unwrap();

    // The failed round closed the record; no second fee can be charged
    s.gateway.set_mode(MockGatewayMode::Accept);
    assert_eq!(
        s.service.settle(id, &maker).unwrap_err(),
        EscrowError::AlreadyClosed { id }
    );
    assert_eq!(s.gateway.submitted().len(), 1);
    assert_eq!(s.log.kinds().last(), Some(&"settlement_failed"));
}

#[test]
fn test_notification_stream_serializes() {
    let s = setup(EngineConfig::default());
    let maker = Identity::from("maker");
    s.service.fund_account(&maker, 10 * E16).unwrap();
    let id = s.service.mint(terms(50_000, 1_001), &maker).unwrap();
    s.service.cancel(id, &maker).unwrap();

    let lines: Vec<serde_json::Value> = s
        .log
        .snapshot()
        .iter()
        .map(|n| serde_json::to_value(n).unwrap())
        .collect();
    assert_eq!(lines[0]["event"], "created");
    assert_eq!(lines[1]["event"], "canceled");
    assert_eq!(lines[1]["seq"], 2);
    assert_eq!(lines[1]["record"]["settled"], true);
    assert_eq!(lines[1]["record"]["maker"], "maker");

    match &s.log.snapshot()[1].event {
        DerivativeEvent::Canceled { refunded, .. } => assert_eq!(*refunded, E16),
        other => panic!("expected canceled, got {}", other.kind()),
    }
}
