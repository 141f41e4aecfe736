//! Escrow Service
//!
//! Shareable handle over one [`DerivativeEngine`]. Every operation, reads
//! included, takes the same lock, so operations from any number of threads
//! execute one at a time and each runs to completion before the next starts.
//! Races between independent callers (take vs cancel, settle vs settle,
//! callback vs forged callback) are decided purely by lock order and the
//! engine's guards.

use parking_lot::Mutex;
use std::sync::Arc;

use super::engine::{DerivativeEngine, EngineDeps, Payout, Resolution};
use super::error::EscrowError;
use super::events::EventSink;
use super::invariants::InvariantViolation;
use super::ledger::MintTerms;
use super::oracle::OracleResponse;
use super::payoff::RefundSplit;
use super::record::{DerivativeRecord, DerivativeState};
use super::types::{Amount, DerivativeId, Identity, PriceValue, RequestHandle};
use crate::config::EngineConfig;

#[derive(Clone)]
pub struct EscrowService {
    engine: Arc<Mutex<DerivativeEngine>>,
}

impl EscrowService {
    pub fn new(engine: DerivativeEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn from_config(config: &EngineConfig, deps: EngineDeps) -> Self {
        Self::new(DerivativeEngine::new(config, deps))
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.engine.lock().add_sink(sink);
    }

    pub fn fund_account(&self, who: &Identity, amount: Amount) -> Result<(), EscrowError> {
        self.engine.lock().fund_account(who, amount)
    }

    pub fn mint(&self, terms: MintTerms, caller: &Identity) -> Result<DerivativeId, EscrowError> {
        self.engine.lock().mint(terms, caller)
    }

    pub fn cancel(&self, id: DerivativeId, caller: &Identity) -> Result<Amount, EscrowError> {
        self.engine.lock().cancel(id, caller)
    }

    pub fn take(&self, id: DerivativeId, deposit: Amount, caller: &Identity) -> Result<(), EscrowError> {
        self.engine.lock().take(id, deposit, caller)
    }

    pub fn settle(&self, id: DerivativeId, caller: &Identity) -> Result<RequestHandle, EscrowError> {
        self.engine.lock().settle(id, caller)
    }

    pub fn on_oracle_result(
        &self,
        handle: RequestHandle,
        observed: PriceValue,
        caller: &Identity,
    ) -> Result<Payout, EscrowError> {
        self.engine.lock().on_oracle_result(handle, observed, caller)
    }

    pub fn on_oracle_failure(
        &self,
        handle: RequestHandle,
        status: i64,
        caller: &Identity,
    ) -> Result<RefundSplit, EscrowError> {
        self.engine.lock().on_oracle_failure(handle, status, caller)
    }

    pub fn on_oracle_response(
        &self,
        handle: RequestHandle,
        response: OracleResponse,
        caller: &Identity,
    ) -> Result<Resolution, EscrowError> {
        self.engine.lock().on_oracle_response(handle, response, caller)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn record(&self, id: DerivativeId) -> Option<DerivativeRecord> {
        self.engine.lock().record(id).cloned()
    }

    pub fn records(&self) -> Vec<DerivativeRecord> {
        self.engine.lock().records().cloned().collect()
    }

    pub fn state(&self, id: DerivativeId) -> Option<DerivativeState> {
        self.engine.lock().state(id)
    }

    pub fn pending_requests(&self) -> Vec<(RequestHandle, DerivativeId)> {
        self.engine.lock().pending_requests()
    }

    pub fn balance_of(&self, who: &Identity) -> Amount {
        self.engine.lock().balance_of(who)
    }

    pub fn escrow_total(&self) -> Amount {
        self.engine.lock().escrow_total()
    }

    pub fn fees_paid_total(&self) -> Amount {
        self.engine.lock().fees_paid_total()
    }

    pub fn audit(&self) -> Vec<InvariantViolation> {
        self.engine.lock().audit()
    }

    /// Run a read-only closure against the engine under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&DerivativeEngine) -> R) -> R {
        f(&self.engine.lock())
    }
}
