//! Payoff Rules
//!
//! Binary settlement: a single comparison of the observed value against the
//! record's trigger price decides which side takes the whole pot.
//!
//! The comparison direction is part of the contract between the oracle gateway
//! and the engine, so it is configuration rather than a structural property:
//!
//! | rule        | taker wins if               | maker wins if              |
//! |-------------|-----------------------------|----------------------------|
//! | `AtOrAbove` | observed >= trigger price   | observed <  trigger price  |
//! | `Above`     | observed >  trigger price   | observed <= trigger price  |
//! | `AtOrBelow` | observed <= trigger price   | observed >  trigger price  |
//! | `Below`     | observed <  trigger price   | observed >= trigger price  |
//!
//! The maker always wins when the condition is NOT met.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use super::record::DerivativeRecord;
use super::types::{Amount, PriceValue};

/// A side of the derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Maker,
    Taker,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Maker => "maker",
            Party::Taker => "taker",
        }
    }
}

/// Condition under which the taker wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakerWinsWhen {
    AtOrAbove,
    Above,
    AtOrBelow,
    Below,
}

impl Default for TakerWinsWhen {
    fn default() -> Self {
        // Price at or above the trigger pays the taker
        Self::AtOrAbove
    }
}

impl TakerWinsWhen {
    pub fn is_met(&self, observed: PriceValue, trigger_price: PriceValue) -> bool {
        match self {
            TakerWinsWhen::AtOrAbove => observed >= trigger_price,
            TakerWinsWhen::Above => observed > trigger_price,
            TakerWinsWhen::AtOrBelow => observed <= trigger_price,
            TakerWinsWhen::Below => observed < trigger_price,
        }
    }
}

/// Who absorbs the consumed oracle fee when a settlement attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureFeeAllocation {
    /// The party that called settle pays. Third-party settles charge the taker.
    Settler,
    /// Split pro rata to each side's stake.
    Proportional,
}

impl Default for FailureFeeAllocation {
    fn default() -> Self {
        Self::Settler
    }
}

/// Refund amounts for a failed settlement. Sums to the fee-reduced pot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSplit {
    pub maker: Amount,
    pub taker: Amount,
}

impl RefundSplit {
    pub fn total(&self) -> Amount {
        self.maker + self.taker
    }
}

/// Complete payoff configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoffRule {
    #[serde(default)]
    pub taker_wins_when: TakerWinsWhen,
    #[serde(default)]
    pub failure_fee_allocation: FailureFeeAllocation,
}

impl PayoffRule {
    pub fn winner(&self, observed: PriceValue, trigger_price: PriceValue) -> Party {
        if self.taker_wins_when.is_met(observed, trigger_price) {
            Party::Taker
        } else {
            Party::Maker
        }
    }

    /// Split the remaining pot of a failed settlement.
    ///
    /// Each side gets back its stake minus its share of `record.fee_paid`. Both
    /// stakes exceed the fee (checked at mint), so neither share underflows.
    pub fn refund_split(&self, record: &DerivativeRecord) -> RefundSplit {
        let fee = record.fee_paid;
        let (maker_fee, taker_fee) = match self.failure_fee_allocation {
            FailureFeeAllocation::Settler => {
                let settler_is_maker = record
                    .settler
                    .as_ref()
                    .map(|who| record.is_maker(who))
                    .unwrap_or(false);
                if settler_is_maker {
                    (fee, 0)
                } else {
                    (0, fee)
                }
            }
            FailureFeeAllocation::Proportional => {
                let maker_fee = proportional_share(fee, record.maker_amount, record.gross_pot());
                (maker_fee, fee - maker_fee)
            }
        };
        RefundSplit {
            maker: record.maker_amount - maker_fee,
            taker: record.taker_amount - taker_fee,
        }
    }
}

/// `floor(fee * stake / pot)` for `stake <= pot`, so the result never exceeds `fee`.
///
/// The product is taken in 256-bit space only when it does not fit in u128.
fn proportional_share(fee: Amount, stake: Amount, pot: Amount) -> Amount {
    if pot == 0 {
        return 0;
    }
    match fee.checked_mul(stake) {
        Some(product) => product / pot,
        None => {
            let share = BigUint::from(fee) * BigUint::from(stake) / BigUint::from(pot);
            // Bounded by fee
            Amount::try_from(share).unwrap_or(fee)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::types::{Identity, RequestHandle};

    fn settling_record(settler: &str) -> DerivativeRecord {
        DerivativeRecord {
            id: 3,
            maker: Identity::from("maker"),
            taker: Some(Identity::from("taker")),
            maker_amount: 1_000,
            taker_amount: 3_000,
            trigger_price: 50_000,
            trigger_height: 10,
            minted_at: 1,
            taken: true,
            settled: false,
            pending_request: Some(RequestHandle(1)),
            fee_paid: 100,
            settler: Some(Identity::from(settler)),
            escrowed: 3_900,
        }
    }

    #[test]
    fn test_default_direction_boundary() {
        let rule = PayoffRule::default();
        assert_eq!(rule.winner(49_999, 50_000), Party::Maker);
        assert_eq!(rule.winner(50_000, 50_000), Party::Taker);
        assert_eq!(rule.winner(50_001, 50_000), Party::Taker);
    }

    #[test]
    fn test_every_direction_at_the_threshold() {
        assert!(TakerWinsWhen::AtOrAbove.is_met(40, 40));
        assert!(!TakerWinsWhen::Above.is_met(40, 40));
        assert!(TakerWinsWhen::AtOrBelow.is_met(40, 40));
        assert!(!TakerWinsWhen::Below.is_met(40, 40));
        assert!(TakerWinsWhen::Below.is_met(39, 40));
    }

    #[test]
    fn test_settler_bears_fee() {
        let rule = PayoffRule::default();

        let split = rule.refund_split(&settling_record("taker"));
        assert_eq!(split, RefundSplit { maker: 1_000, taker: 2_900 });

        let split = rule.refund_split(&settling_record("maker"));
        assert_eq!(split, RefundSplit { maker: 900, taker: 3_000 });

        // Third-party settler: taker's share absorbs the fee
        let split = rule.refund_split(&settling_record("keeper"));
        assert_eq!(split, RefundSplit { maker: 1_000, taker: 2_900 });
    }

    #[test]
    fn test_proportional_split_conserves_pot() {
        let rule = PayoffRule {
            failure_fee_allocation: FailureFeeAllocation::Proportional,
            ..Default::default()
        };
        let record = settling_record("keeper");
        let split = rule.refund_split(&record);
        assert_eq!(split, RefundSplit { maker: 975, taker: 2_925 });
        assert_eq!(split.total(), record.escrowed);
    }

    #[test]
    fn test_proportional_split_with_huge_stakes() {
        let rule = PayoffRule {
            failure_fee_allocation: FailureFeeAllocation::Proportional,
            ..Default::default()
        };
        let fee: Amount = 7_500_000_000_000_000;
        let stake: Amount = 100_000 * 1_000_000_000_000_000_000;
        let mut record = settling_record("keeper");
        record.maker_amount = stake;
        record.taker_amount = stake;
        record.fee_paid = fee;
        record.escrowed = 2 * stake - fee;

        let split = rule.refund_split(&record);
        assert_eq!(split.maker, stake - fee / 2);
        assert_eq!(split.taker, stake - fee / 2);
        assert_eq!(split.total(), record.escrowed);
    }

    #[test]
    fn test_proportional_share_rounds_down() {
        assert_eq!(proportional_share(100, 1_000, 4_000), 25);
        assert_eq!(proportional_share(7, 1, 3), 2);
        let half = Amount::MAX / 2;
        assert_eq!(proportional_share(half, Amount::MAX / 4, half), Amount::MAX / 4);
        assert_eq!(proportional_share(5, 0, 0), 0);
    }
}
