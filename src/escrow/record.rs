//! Derivative Record
//!
//! The sole persistent entity. Records are never deleted; a closed record stays
//! queryable as part of the audit trail.

use serde::{Deserialize, Serialize};

use super::types::{Amount, DerivativeId, Height, Identity, PriceValue, RequestHandle};

/// Lifecycle state derived from the record flags.
///
/// ```text
/// Open ──take──▶ Active ──settle──▶ Settling ──callback──▶ Closed
///   └──────────────cancel──────────────────────────────────▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivativeState {
    /// Minted, waiting for a taker.
    Open,
    /// Taken, waiting for the trigger height.
    Active,
    /// Oracle request outstanding.
    Settling,
    /// Paid out, refunded or canceled. Terminal.
    Closed,
}

impl DerivativeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivativeState::Open => "open",
            DerivativeState::Active => "active",
            DerivativeState::Settling => "settling",
            DerivativeState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DerivativeState::Closed)
    }
}

/// A derivative position and the currency held for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeRecord {
    pub id: DerivativeId,
    pub maker: Identity,
    pub taker: Option<Identity>,
    /// Maker collateral, equal to the deposit made at mint.
    pub maker_amount: Amount,
    /// Required taker collateral, fixed at mint.
    pub taker_amount: Amount,
    pub trigger_price: PriceValue,
    /// Settlement becomes eligible at this height. Never mutated after mint.
    pub trigger_height: Height,
    /// Height at which the record was minted.
    pub minted_at: Height,
    pub taken: bool,
    /// Terminal flag. Never reverts to false.
    pub settled: bool,
    pub pending_request: Option<RequestHandle>,
    /// Oracle fee consumed by the settle attempt (0 until settle).
    pub fee_paid: Amount,
    /// Identity that invoked settle.
    pub settler: Option<Identity>,
    /// Currency currently held in escrow for this record.
    pub escrowed: Amount,
}

impl DerivativeRecord {
    pub fn state(&self) -> DerivativeState {
        if self.settled {
            DerivativeState::Closed
        } else if self.pending_request.is_some() {
            DerivativeState::Settling
        } else if self.taken {
            DerivativeState::Active
        } else {
            DerivativeState::Open
        }
    }

    /// Escrow the record must hold in its current state.
    pub fn expected_escrow(&self) -> Amount {
        match self.state() {
            DerivativeState::Open => self.maker_amount,
            DerivativeState::Active => self.maker_amount + self.taker_amount,
            DerivativeState::Settling => self.maker_amount + self.taker_amount - self.fee_paid,
            DerivativeState::Closed => 0,
        }
    }

    /// Combined collateral of both sides, before any fee.
    pub fn gross_pot(&self) -> Amount {
        self.maker_amount + self.taker_amount
    }

    pub fn is_maker(&self, who: &Identity) -> bool {
        &self.maker == who
    }

    pub fn is_taker(&self, who: &Identity) -> bool {
        self.taker.as_ref() == Some(who)
    }
}
