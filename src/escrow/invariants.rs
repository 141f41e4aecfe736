//! Conservation Audit
//!
//! Full recomputation of the ledger's accounting identities. The engine keeps
//! these true incrementally; the audit re-derives them from the journal and the
//! records so tests and the simulator can assert them after every step.
//!
//! # Checks
//!
//! - **Journal**: every entry balanced, balances net to zero
//! - **Custody**: currency held by external and escrow accounts equals the total funded
//! - **Records**: escrow account equals the record's `escrowed` equals what its state requires
//! - **Flags**: pending implies taken, settled excludes pending, release posted iff settled
//! - **Pending table**: every Settling record is reachable through its handle, and
//!   every table entry points at a record Settling on that handle

use serde::Serialize;
use std::fmt;

use super::ledger::{EscrowLedger, EventRef, LedgerAccount, SignedAmount};
use super::record::DerivativeState;
use super::types::{Amount, DerivativeId, RequestHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvariantViolation {
    UnbalancedEntry {
        entry_id: u64,
        total: SignedAmount,
    },
    NonZeroNet {
        net: SignedAmount,
    },
    CustodyMismatch {
        held: SignedAmount,
        funded: Amount,
    },
    EscrowMismatch {
        id: DerivativeId,
        account: SignedAmount,
        recorded: Amount,
    },
    StateEscrowMismatch {
        id: DerivativeId,
        state: DerivativeState,
        expected: Amount,
        recorded: Amount,
    },
    IllegalFlags {
        id: DerivativeId,
        reason: &'static str,
    },
    StrandedRequest {
        id: DerivativeId,
        handle: RequestHandle,
    },
    OrphanedHandle {
        handle: RequestHandle,
        id: DerivativeId,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::UnbalancedEntry { entry_id, total } => {
                write!(f, "entry {} postings sum to {}", entry_id, total)
            }
            InvariantViolation::NonZeroNet { net } => {
                write!(f, "ledger balances net to {} instead of 0", net)
            }
            InvariantViolation::CustodyMismatch { held, funded } => {
                write!(f, "accounts hold {} but {} was funded", held, funded)
            }
            InvariantViolation::EscrowMismatch {
                id,
                account,
                recorded,
            } => write!(
                f,
                "derivative {} escrow account holds {} but record says {}",
                id, account, recorded
            ),
            InvariantViolation::StateEscrowMismatch {
                id,
                state,
                expected,
                recorded,
            } => write!(
                f,
                "derivative {} in state {} must hold {} but holds {}",
                id,
                state.as_str(),
                expected,
                recorded
            ),
            InvariantViolation::IllegalFlags { id, reason } => {
                write!(f, "derivative {}: {}", id, reason)
            }
            InvariantViolation::StrandedRequest { id, handle } => write!(
                f,
                "derivative {} is settling on handle {} but the pending table does not route it",
                id, handle
            ),
            InvariantViolation::OrphanedHandle { handle, id } => write!(
                f,
                "pending handle {} points at derivative {} which is not settling on it",
                handle, id
            ),
        }
    }
}

/// Recompute every accounting identity. Empty result means the ledger is sound.
pub fn audit(ledger: &EscrowLedger) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for entry in ledger.entries() {
        if !entry.is_balanced() {
            violations.push(InvariantViolation::UnbalancedEntry {
                entry_id: entry.entry_id,
                total: entry.total(),
            });
        }
    }

    let net: SignedAmount = ledger.balances().values().sum();
    if net != 0 {
        violations.push(InvariantViolation::NonZeroNet { net });
    }

    let held: SignedAmount = ledger
        .balances()
        .iter()
        .filter(|(account, _)| !matches!(account, LedgerAccount::Capital))
        .map(|(_, balance)| *balance)
        .sum();
    if held != ledger.total_funded() as SignedAmount {
        violations.push(InvariantViolation::CustodyMismatch {
            held,
            funded: ledger.total_funded(),
        });
    }

    for record in ledger.records() {
        let id = record.id;
        let account = ledger.get_balance(&LedgerAccount::Escrow(id));
        if account != record.escrowed as SignedAmount {
            violations.push(InvariantViolation::EscrowMismatch {
                id,
                account,
                recorded: record.escrowed,
            });
        }

        let expected = record.expected_escrow();
        if record.escrowed != expected {
            violations.push(InvariantViolation::StateEscrowMismatch {
                id,
                state: record.state(),
                expected,
                recorded: record.escrowed,
            });
        }

        if record.pending_request.is_some() && !record.taken {
            violations.push(InvariantViolation::IllegalFlags {
                id,
                reason: "pending request on an untaken record",
            });
        }
        if record.settled && record.pending_request.is_some() {
            violations.push(InvariantViolation::IllegalFlags {
                id,
                reason: "closed record still has a pending request",
            });
        }
        if record.taken != record.taker.is_some() {
            violations.push(InvariantViolation::IllegalFlags {
                id,
                reason: "taken flag disagrees with taker identity",
            });
        }
        if record.settled != ledger.is_posted(&EventRef::Release { id }) {
            violations.push(InvariantViolation::IllegalFlags {
                id,
                reason: "release posting disagrees with settled flag",
            });
        }
    }

    if !violations.is_empty() {
        tracing::error!(count = violations.len(), "escrow audit found violations");
    }
    violations
}

/// Cross-check the engine's pending-request table against the records.
pub fn audit_pending(
    ledger: &EscrowLedger,
    pending: &[(RequestHandle, DerivativeId)],
) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for record in ledger.records() {
        if record.state() != DerivativeState::Settling {
            continue;
        }
        let routed = record
            .pending_request
            .map(|handle| pending.contains(&(handle, record.id)))
            .unwrap_or(false);
        if !routed {
            violations.push(InvariantViolation::StrandedRequest {
                id: record.id,
                handle: record.pending_request.unwrap_or(RequestHandle(0)),
            });
        }
    }

    for &(handle, id) in pending {
        let settling_on_it = ledger
            .record(id)
            .map(|r| r.state() == DerivativeState::Settling && r.pending_request == Some(handle))
            .unwrap_or(false);
        if !settling_on_it {
            violations.push(InvariantViolation::OrphanedHandle { handle, id });
        }
    }

    if !violations.is_empty() {
        tracing::error!(count = violations.len(), "pending table audit found violations");
    }
    violations
}
