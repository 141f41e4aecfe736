//! Binary Derivative Escrow
//!
//! Escrow-based, price-triggered binary derivatives between a maker and a taker,
//! settled by an asynchronous oracle callback.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        EscrowService                            │
//! │  (one mutex, every operation runs to completion)                │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DerivativeEngine                           │
//! │  guards, transitions, pending-request table, notifications      │
//! └─────────────────────────────────────────────────────────────────┘
//!        │               │                │                │
//!        ▼               ▼                ▼                ▼
//! ┌─────────────┐ ┌─────────────┐ ┌──────────────┐ ┌─────────────┐
//! │ EscrowLedger│ │HeightSource │ │OracleGateway │ │  Position   │
//! │ (journal)   │ │ (read-only) │ │ (submit)     │ │  Registry   │
//! └─────────────┘ └─────────────┘ └──────┬───────┘ └─────────────┘
//!                                        │ later, separate call
//!                                        ▼
//!                               on_oracle_result / on_oracle_failure
//! ```
//!
//! # Lifecycle
//!
//! - `mint` locks the maker deposit and opens a record
//! - `take` locks the exact taker stake (Open -> Active)
//! - `cancel` returns the maker deposit of an untaken record (Open -> Closed)
//! - `settle` pays the oracle fee from the pot and submits a request (Active -> Settling)
//! - the gateway callback pays the winner, or refunds both sides on failure (Settling -> Closed)

pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod invariants;
pub mod ledger;
pub mod oracle;
pub mod payoff;
pub mod record;
pub mod registry;
pub mod service;
pub mod types;


pub use clock::{HeightSource, ManualClock};
pub use engine::{DerivativeEngine, EngineDeps, Payout, Resolution};
pub use error::EscrowError;
pub use events::{BroadcastSink, DerivativeEvent, EventLog, EventSink, Notification};
pub use invariants::{audit, audit_pending, InvariantViolation};
pub use ledger::{
    EscrowLedger, EventRef, LedgerAccount, LedgerEntry, LedgerStats, LedgerViolation, MintTerms,
};
pub use oracle::{
    MockGatewayMode, MockOracleGateway, ObservationRequest, OracleGateway, OracleResponse,
    STATUS_DUPLICATE_HANDLE, STATUS_GATEWAY_UPGRADED, STATUS_INSUFFICIENT_FEE,
};
pub use payoff::{FailureFeeAllocation, Party, PayoffRule, RefundSplit, TakerWinsWhen};
pub use record::{DerivativeRecord, DerivativeState};
pub use registry::{InMemoryPositionRegistry, PositionRegistry, RegistryError, RegistryMetadata};
pub use service::EscrowService;
pub use types::{Amount, DerivativeId, Height, Identity, PriceValue, RequestHandle};
