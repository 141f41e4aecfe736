//! Derivative State Machine
//!
//! Applies mint / take / cancel / settle / oracle-callback transitions to the
//! records held by the [`EscrowLedger`].
//!
//! # Guarantees
//!
//! - Guards run in a fixed order and every failing guard returns before any
//!   mutation, so a rejected call leaves the engine exactly as it found it.
//! - Each successful transition emits exactly one notification. A synchronous
//!   gateway rejection is two transitions (Active -> Settling -> Closed) inside
//!   one call and emits `RequestSubmitted` then `SettlementFailed`.
//! - The pending table maps a live gateway handle to its record. An entry
//!   exists exactly while the record is Settling on that handle, so a resolved,
//!   stale or forged handle cannot reach a record. A handle the gateway issues
//!   while it is still pending elsewhere is refused like a synchronous rejection.
//!
//! The engine itself is single-threaded (`&mut self`). Shared access goes
//! through [`super::service::EscrowService`], which serializes every call.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::HeightSource;
use super::error::EscrowError;
use super::events::{DerivativeEvent, EventSink, Notification};
use super::invariants::{audit, audit_pending, InvariantViolation};
use super::ledger::{EscrowLedger, LedgerViolation, MintTerms};
use super::oracle::{
    ObservationRequest, OracleGateway, OracleResponse, STATUS_DUPLICATE_HANDLE,
};
use super::payoff::{Party, PayoffRule, RefundSplit};
use super::record::{DerivativeRecord, DerivativeState};
use super::registry::{PositionRegistry, RegistryError};
use super::types::{Amount, DerivativeId, Height, Identity, PriceValue, RequestHandle};
use crate::config::EngineConfig;

/// Successful settlement payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub winner: Party,
    pub recipient: Identity,
    pub amount: Amount,
}

/// How a pending settlement was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Paid(Payout),
    Refunded(RefundSplit),
}

/// External collaborators the engine is wired to.
#[derive(Clone)]
pub struct EngineDeps {
    pub clock: Arc<dyn HeightSource>,
    pub gateway: Arc<dyn OracleGateway>,
    pub registry: Arc<dyn PositionRegistry>,
}

pub struct DerivativeEngine {
    ledger: EscrowLedger,
    oracle_fee: Amount,
    oracle_identity: Identity,
    payoff: PayoffRule,
    clock: Arc<dyn HeightSource>,
    gateway: Arc<dyn OracleGateway>,
    registry: Arc<dyn PositionRegistry>,
    sinks: Vec<Arc<dyn EventSink>>,
    pending: HashMap<RequestHandle, DerivativeId>,
    next_seq: u64,
}

impl DerivativeEngine {
    pub fn new(config: &EngineConfig, deps: EngineDeps) -> Self {
        Self {
            ledger: EscrowLedger::new(),
            oracle_fee: config.oracle_fee_amount(),
            oracle_identity: config.oracle_identity.clone(),
            payoff: config.payoff,
            clock: deps.clock,
            gateway: deps.gateway,
            registry: deps.registry,
            sinks: Vec::new(),
            pending: HashMap::new(),
            next_seq: 1,
        }
    }

    /// Attach a notification sink. Sinks receive every notification emitted
    /// after they are attached.
    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    // =========================================================================
    // Custody
    // =========================================================================

    /// Credit an identity's external balance.
    pub fn fund_account(&mut self, who: &Identity, amount: Amount) -> Result<(), EscrowError> {
        let height = self.clock.current_height();
        self.ledger.fund_account(who, amount, height)?;
        debug!(who = %who, amount = %amount, height, "account funded");
        Ok(())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Open a new derivative with the caller as maker.
    pub fn mint(&mut self, terms: MintTerms, caller: &Identity) -> Result<DerivativeId, EscrowError> {
        let height = self.clock.current_height();
        let id = self
            .ledger
            .create_record(caller, &terms, height, self.oracle_fee)
            .map_err(|e| rejected("mint", None, e))?;

        log_hook_error(id, "on_mint", self.registry.on_mint(id, caller));
        info!(
            id,
            maker = %caller,
            maker_amount = %terms.deposit,
            taker_amount = %terms.taker_amount,
            trigger_price = terms.trigger_price,
            trigger_height = terms.trigger_height,
            "derivative minted"
        );
        let record = self.snapshot(id)?;
        self.emit(height, DerivativeEvent::Created { record });
        Ok(id)
    }

    /// Withdraw an untaken derivative. Only the maker may cancel.
    pub fn cancel(&mut self, id: DerivativeId, caller: &Identity) -> Result<Amount, EscrowError> {
        let height = self.clock.current_height();
        self.check_cancel(id, caller)
            .map_err(|e| rejected("cancel", Some(id), e))?;

        let refunded = self.ledger.release_to_maker(id, height)?;
        self.record_mut(id)?.settled = true;

        log_hook_error(id, "on_close", self.registry.on_close(id));
        info!(id, refunded = %refunded, "derivative canceled");
        let record = self.snapshot(id)?;
        self.emit(height, DerivativeEvent::Canceled { record, refunded });
        Ok(refunded)
    }

    /// Join an open derivative as taker by matching its stake exactly.
    pub fn take(
        &mut self,
        id: DerivativeId,
        deposit: Amount,
        caller: &Identity,
    ) -> Result<(), EscrowError> {
        let height = self.clock.current_height();
        self.check_take(id, deposit, height)
            .map_err(|e| rejected("take", Some(id), e))?;

        self.ledger
            .lock_taker_stake(id, caller, deposit, height)
            .map_err(|e| rejected("take", Some(id), e))?;
        self.record_mut(id)?.taken = true;

        info!(id, taker = %caller, stake = %deposit, "derivative taken");
        let record = self.snapshot(id)?;
        self.emit(height, DerivativeEvent::Taken { record });
        Ok(())
    }

    /// Pay the oracle fee out of the pot and request the observation.
    ///
    /// Any identity may settle. Returns the gateway's handle; a non-positive
    /// handle means the request was rejected and the record has already been
    /// refunded and closed. A reissued pending handle comes back as
    /// [`STATUS_DUPLICATE_HANDLE`].
    pub fn settle(
        &mut self,
        id: DerivativeId,
        caller: &Identity,
    ) -> Result<RequestHandle, EscrowError> {
        let height = self.clock.current_height();
        let trigger_height = self
            .check_settle(id, height)
            .map_err(|e| rejected("settle", Some(id), e))?;

        let fee = self.oracle_fee;
        self.ledger
            .pay_oracle_fee(id, fee, &self.oracle_identity, height)?;
        self.record_mut(id)?.settler = Some(caller.clone());

        let issued = self.gateway.request_observation(&ObservationRequest {
            derivative_id: id,
            target_height: trigger_height,
            fee_paid: fee,
        });
        let handle = match self.pending.get(&issued) {
            Some(&holder) => {
                warn!(id, handle = issued.0, holder, "gateway reissued a pending handle");
                RequestHandle(STATUS_DUPLICATE_HANDLE)
            }
            None => issued,
        };

        self.record_mut(id)?.pending_request = Some(handle);
        let record = self.snapshot(id)?;
        self.emit(
            height,
            DerivativeEvent::RequestSubmitted {
                record,
                handle,
                fee_paid: fee,
            },
        );

        match handle.rejection_status() {
            None => {
                self.pending.insert(handle, id);
                info!(id, handle = handle.0, settler = %caller, fee = %fee, "oracle request submitted");
            }
            Some(status) => {
                warn!(id, status, "oracle gateway rejected request, refunding");
                self.finalize_failure(id, handle, status, height)?;
            }
        }
        Ok(handle)
    }

    // =========================================================================
    // Oracle callbacks
    // =========================================================================

    /// Resolve a pending settlement with an observed value.
    pub fn on_oracle_result(
        &mut self,
        handle: RequestHandle,
        observed: PriceValue,
        caller: &Identity,
    ) -> Result<Payout, EscrowError> {
        let height = self.clock.current_height();
        let id = self
            .check_callback(handle, caller)
            .map_err(|e| rejected("on_oracle_result", None, e))?;

        let record = self.snapshot(id)?;
        let winner = self.payoff.winner(observed, record.trigger_price);
        let (recipient, amount) = match winner {
            Party::Maker => (record.maker.clone(), self.ledger.release_to_maker(id, height)?),
            Party::Taker => {
                let taker = record
                    .taker
                    .clone()
                    .ok_or(LedgerViolation::MissingTaker { id })?;
                (taker, self.ledger.release_to_taker(id, height)?)
            }
        };
        self.close_settling(id, handle)?;

        info!(
            id,
            handle = handle.0,
            observed,
            trigger_price = record.trigger_price,
            winner = winner.as_str(),
            payout = %amount,
            "derivative settled"
        );
        let record = self.snapshot(id)?;
        self.emit(
            height,
            DerivativeEvent::Settled {
                record,
                handle,
                winner,
                winner_identity: recipient.clone(),
                payout: amount,
                observed_value: observed,
            },
        );
        Ok(Payout {
            winner,
            recipient,
            amount,
        })
    }

    /// Resolve a pending settlement as failed: refund both sides minus the fee.
    pub fn on_oracle_failure(
        &mut self,
        handle: RequestHandle,
        status: i64,
        caller: &Identity,
    ) -> Result<RefundSplit, EscrowError> {
        let height = self.clock.current_height();
        let id = self
            .check_callback(handle, caller)
            .map_err(|e| rejected("on_oracle_failure", None, e))?;

        warn!(id, handle = handle.0, status, "oracle reported failure, refunding");
        self.finalize_failure(id, handle, status, height)
    }

    /// Dispatch a gateway callback in its raw response form.
    pub fn on_oracle_response(
        &mut self,
        handle: RequestHandle,
        response: OracleResponse,
        caller: &Identity,
    ) -> Result<Resolution, EscrowError> {
        match response {
            OracleResponse::Observed(value) => self
                .on_oracle_result(handle, value, caller)
                .map(Resolution::Paid),
            OracleResponse::Failed { status } => self
                .on_oracle_failure(handle, status, caller)
                .map(Resolution::Refunded),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn record(&self, id: DerivativeId) -> Option<&DerivativeRecord> {
        self.ledger.record(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &DerivativeRecord> {
        self.ledger.records()
    }

    pub fn state(&self, id: DerivativeId) -> Option<DerivativeState> {
        self.ledger.record(id).map(DerivativeRecord::state)
    }

    /// Outstanding oracle requests, ordered by handle.
    pub fn pending_requests(&self) -> Vec<(RequestHandle, DerivativeId)> {
        let mut pending: Vec<_> = self.pending.iter().map(|(h, id)| (*h, *id)).collect();
        pending.sort_unstable();
        pending
    }

    pub fn escrow_total(&self) -> Amount {
        self.ledger.total_escrowed()
    }

    pub fn fees_paid_total(&self) -> Amount {
        self.ledger.fees_paid_total()
    }

    pub fn balance_of(&self, who: &Identity) -> Amount {
        self.ledger.balance_of(who)
    }

    pub fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    /// Ledger audit plus the pending-table cross-check.
    pub fn audit(&self) -> Vec<InvariantViolation> {
        let mut violations = audit(&self.ledger);
        violations.extend(audit_pending(&self.ledger, &self.pending_requests()));
        violations
    }

    pub fn oracle_fee(&self) -> Amount {
        self.oracle_fee
    }

    pub fn oracle_identity(&self) -> &Identity {
        &self.oracle_identity
    }

    pub fn payoff_rule(&self) -> PayoffRule {
        self.payoff
    }

    pub fn current_height(&self) -> Height {
        self.clock.current_height()
    }

    /// Sequence number of the most recent notification (0 before any).
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    // =========================================================================
    // Guards
    // =========================================================================

    fn existing(&self, id: DerivativeId) -> Result<&DerivativeRecord, EscrowError> {
        self.ledger.record(id).ok_or(EscrowError::NotFound { id })
    }

    fn check_cancel(&self, id: DerivativeId, caller: &Identity) -> Result<(), EscrowError> {
        let record = self.existing(id)?;
        if !record.is_maker(caller) {
            return Err(EscrowError::NotOwner {
                id,
                caller: caller.clone(),
            });
        }
        if record.taken {
            return Err(EscrowError::AlreadyTaken { id });
        }
        if record.settled {
            return Err(EscrowError::AlreadyClosed { id });
        }
        Ok(())
    }

    fn check_take(
        &self,
        id: DerivativeId,
        deposit: Amount,
        height: Height,
    ) -> Result<(), EscrowError> {
        let record = self.existing(id)?;
        if record.taken {
            return Err(EscrowError::AlreadyTaken { id });
        }
        if record.settled {
            return Err(EscrowError::AlreadyClosed { id });
        }
        if height > record.trigger_height {
            return Err(EscrowError::TriggerExpired {
                id,
                trigger_height: record.trigger_height,
                current_height: height,
            });
        }
        if deposit != record.taker_amount {
            return Err(EscrowError::StakeMismatch {
                expected: record.taker_amount,
                deposited: deposit,
            });
        }
        Ok(())
    }

    /// Returns the record's trigger height on success.
    fn check_settle(&self, id: DerivativeId, height: Height) -> Result<Height, EscrowError> {
        let record = self.existing(id)?;
        if !record.taken {
            return Err(EscrowError::NotTaken { id });
        }
        if record.settled {
            return Err(EscrowError::AlreadyClosed { id });
        }
        if height < record.trigger_height {
            return Err(EscrowError::TooEarly {
                id,
                trigger_height: record.trigger_height,
                current_height: height,
            });
        }
        if let Some(handle) = record.pending_request {
            return Err(EscrowError::AlreadyPending { id, handle });
        }
        Ok(record.trigger_height)
    }

    fn check_callback(
        &self,
        handle: RequestHandle,
        caller: &Identity,
    ) -> Result<DerivativeId, EscrowError> {
        if caller != &self.oracle_identity {
            return Err(EscrowError::Unauthorized {
                caller: caller.clone(),
            });
        }
        self.pending
            .get(&handle)
            .copied()
            .ok_or(EscrowError::UnknownRequest { handle })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Refund both sides of a Settling record and close it.
    fn finalize_failure(
        &mut self,
        id: DerivativeId,
        handle: RequestHandle,
        status: i64,
        height: Height,
    ) -> Result<RefundSplit, EscrowError> {
        let refund = self.payoff.refund_split(self.existing(id)?);
        self.ledger
            .release_split(id, refund.maker, refund.taker, height)?;
        self.close_settling(id, handle)?;

        info!(
            id,
            status,
            maker_refund = %refund.maker,
            taker_refund = %refund.taker,
            "settlement failed, both sides refunded"
        );
        let record = self.snapshot(id)?;
        self.emit(
            height,
            DerivativeEvent::SettlementFailed {
                record,
                handle,
                status,
                refund,
            },
        );
        Ok(refund)
    }

    /// Settling -> Closed. Drops the pending entry and notifies the registry.
    fn close_settling(&mut self, id: DerivativeId, handle: RequestHandle) -> Result<(), EscrowError> {
        let record = self.record_mut(id)?;
        record.pending_request = None;
        record.settled = true;
        self.pending.remove(&handle);
        log_hook_error(id, "on_close", self.registry.on_close(id));
        Ok(())
    }

    fn record_mut(&mut self, id: DerivativeId) -> Result<&mut DerivativeRecord, EscrowError> {
        self.ledger
            .record_mut(id)
            .ok_or(EscrowError::NotFound { id })
    }

    fn snapshot(&self, id: DerivativeId) -> Result<DerivativeRecord, EscrowError> {
        self.existing(id).cloned()
    }

    fn emit(&mut self, height: Height, event: DerivativeEvent) {
        let notification = Notification {
            seq: self.next_seq,
            height,
            event,
        };
        self.next_seq += 1;
        for sink in &self.sinks {
            sink.publish(&notification);
        }
    }
}

fn rejected(op: &'static str, id: Option<DerivativeId>, err: EscrowError) -> EscrowError {
    debug!(op, ?id, code = err.code(), error = %err, "operation rejected");
    err
}

fn log_hook_error(id: DerivativeId, hook: &'static str, result: Result<(), RegistryError>) {
    if let Err(e) = result {
        warn!(id, hook, error = %e, "position registry hook failed");
    }
}
