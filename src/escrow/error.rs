//! Escrow Errors
//!
//! Every error is synchronous and leaves engine state untouched. Oracle
//! failures are not errors: they resolve a settlement as a refund.

use std::fmt;

use super::ledger::LedgerViolation;
use super::types::{Amount, DerivativeId, Height, Identity, RequestHandle};

/// Error returned by engine and ledger operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    // Validation
    InsufficientDeposit { deposit: Amount, oracle_fee: Amount },
    InsufficientTakerStake { taker_amount: Amount, oracle_fee: Amount },
    TriggerInPast { trigger_height: Height, current_height: Height },
    StakeMismatch { expected: Amount, deposited: Amount },
    InsufficientFunds { who: Identity, balance: Amount, required: Amount },

    // State conflict
    NotFound { id: DerivativeId },
    AlreadyTaken { id: DerivativeId },
    AlreadyClosed { id: DerivativeId },
    NotTaken { id: DerivativeId },
    AlreadyPending { id: DerivativeId, handle: RequestHandle },
    TriggerExpired { id: DerivativeId, trigger_height: Height, current_height: Height },
    TooEarly { id: DerivativeId, trigger_height: Height, current_height: Height },

    // Authorization
    NotOwner { id: DerivativeId, caller: Identity },
    Unauthorized { caller: Identity },

    // Oracle callback
    UnknownRequest { handle: RequestHandle },

    /// Ledger refused a movement. Unreachable through the state machine guards.
    Ledger(LedgerViolation),
}

impl EscrowError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            EscrowError::InsufficientDeposit { .. } => "insufficient_deposit",
            EscrowError::InsufficientTakerStake { .. } => "insufficient_taker_stake",
            EscrowError::TriggerInPast { .. } => "trigger_in_past",
            EscrowError::StakeMismatch { .. } => "stake_mismatch",
            EscrowError::InsufficientFunds { .. } => "insufficient_funds",
            EscrowError::NotFound { .. } => "not_found",
            EscrowError::AlreadyTaken { .. } => "already_taken",
            EscrowError::AlreadyClosed { .. } => "already_closed",
            EscrowError::NotTaken { .. } => "not_taken",
            EscrowError::AlreadyPending { .. } => "already_pending",
            EscrowError::TriggerExpired { .. } => "trigger_expired",
            EscrowError::TooEarly { .. } => "too_early",
            EscrowError::NotOwner { .. } => "not_owner",
            EscrowError::Unauthorized { .. } => "unauthorized",
            EscrowError::UnknownRequest { .. } => "unknown_request",
            EscrowError::Ledger(_) => "ledger_violation",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EscrowError::InsufficientDeposit { .. }
                | EscrowError::InsufficientTakerStake { .. }
                | EscrowError::TriggerInPast { .. }
                | EscrowError::StakeMismatch { .. }
                | EscrowError::InsufficientFunds { .. }
        )
    }

    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            EscrowError::NotOwner { .. } | EscrowError::Unauthorized { .. }
        )
    }
}

impl fmt::Display for EscrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscrowError::InsufficientDeposit { deposit, oracle_fee } => write!(
                f,
                "deposit {} does not exceed oracle fee {}",
                deposit, oracle_fee
            ),
            EscrowError::InsufficientTakerStake {
                taker_amount,
                oracle_fee,
            } => write!(
                f,
                "taker stake {} does not exceed oracle fee {}",
                taker_amount, oracle_fee
            ),
            EscrowError::TriggerInPast {
                trigger_height,
                current_height,
            } => write!(
                f,
                "trigger height {} is not after current height {}",
                trigger_height, current_height
            ),
            EscrowError::StakeMismatch {
                expected,
                deposited,
            } => write!(f, "taker must deposit exactly {}, got {}", expected, deposited),
            EscrowError::InsufficientFunds {
                who,
                balance,
                required,
            } => write!(f, "{} holds {} but {} is required", who, balance, required),
            EscrowError::NotFound { id } => write!(f, "derivative {} not found", id),
            EscrowError::AlreadyTaken { id } => write!(f, "derivative {} already taken", id),
            EscrowError::AlreadyClosed { id } => write!(f, "derivative {} already closed", id),
            EscrowError::NotTaken { id } => write!(f, "derivative {} has not been taken", id),
            EscrowError::AlreadyPending { id, handle } => write!(
                f,
                "derivative {} already has oracle request {} outstanding",
                id, handle
            ),
            EscrowError::TriggerExpired {
                id,
                trigger_height,
                current_height,
            } => write!(
                f,
                "derivative {} expired at height {} (now {})",
                id, trigger_height, current_height
            ),
            EscrowError::TooEarly {
                id,
                trigger_height,
                current_height,
            } => write!(
                f,
                "derivative {} settles at height {} (now {})",
                id, trigger_height, current_height
            ),
            EscrowError::NotOwner { id, caller } => {
                write!(f, "{} is not the maker of derivative {}", caller, id)
            }
            EscrowError::Unauthorized { caller } => {
                write!(f, "{} is not the trusted oracle gateway", caller)
            }
            EscrowError::UnknownRequest { handle } => {
                write!(f, "no pending settlement for oracle request {}", handle)
            }
            EscrowError::Ledger(violation) => write!(f, "ledger violation: {}", violation),
        }
    }
}

impl std::error::Error for EscrowError {}

impl From<LedgerViolation> for EscrowError {
    fn from(violation: LedgerViolation) -> Self {
        EscrowError::Ledger(violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let e = EscrowError::StakeMismatch {
            expected: 20,
            deposited: 10,
        };
        assert!(e.is_validation());
        assert!(!e.is_authorization());
        assert_eq!(e.code(), "stake_mismatch");

        let e = EscrowError::Unauthorized {
            caller: Identity::from("mallory"),
        };
        assert!(e.is_authorization());
        assert_eq!(e.to_string(), "mallory is not the trusted oracle gateway");
    }
}
