//! Escrow Ledger
//!
//! Holds every derivative record and every unit of currency the engine has
//! custody of. All currency movements are recorded as balanced, append-only
//! journal entries.
//!
//! # Design Principles
//!
//! 1. **Immutability**: Journal entries are append-only. Records are never deleted.
//! 2. **Balance**: Every entry's postings sum to zero.
//! 3. **Single Release**: Each record's escrow can be released exactly once. The
//!    release reference is deduplicated, so a second release is a violation
//!    even if a caller's state guard were wrong.
//! 4. **No Overdraft**: External and escrow balances never go negative.
//!
//! # Accounts
//!
//! - `Capital`: source of all currency funded into the engine (credit-normal)
//! - `External(identity)`: spendable balance of a caller
//! - `Escrow(id)`: currency held for one derivative record
//!
//! The ledger trusts the state machine to validate transition legality. It
//! validates amounts and balances only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use super::error::EscrowError;
use super::record::DerivativeRecord;
use super::types::{Amount, DerivativeId, Height, Identity, PriceValue};

/// Signed posting amount. Positive increases the account's holdings.
pub type SignedAmount = i128;

// =============================================================================
// LEDGER ACCOUNT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerAccount {
    /// Outside world. Holds the negative of everything ever funded.
    Capital,
    /// Spendable balance of an identity.
    External(Identity),
    /// Currency held in custody for one record.
    Escrow(DerivativeId),
}

impl LedgerAccount {
    pub fn display_name(&self) -> String {
        match self {
            LedgerAccount::Capital => "Capital".to_string(),
            LedgerAccount::External(who) => format!("External:{}", who),
            LedgerAccount::Escrow(id) => format!("Escrow:{}", id),
        }
    }

    /// Capital is the only account allowed to go negative.
    fn may_go_negative(&self) -> bool {
        matches!(self, LedgerAccount::Capital)
    }
}

// =============================================================================
// EVENT REFERENCE
// =============================================================================

/// Reference to the operation that triggered an entry. Used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventRef {
    Funding { funding_id: u64 },
    MakerDeposit { id: DerivativeId },
    TakerStake { id: DerivativeId },
    OracleFee { id: DerivativeId },
    Release { id: DerivativeId },
}

impl EventRef {
    pub fn display(&self) -> String {
        match self {
            EventRef::Funding { funding_id } => format!("Funding#{}", funding_id),
            EventRef::MakerDeposit { id } => format!("MakerDeposit#{}", id),
            EventRef::TakerStake { id } => format!("TakerStake#{}", id),
            EventRef::OracleFee { id } => format!("OracleFee#{}", id),
            EventRef::Release { id } => format!("Release#{}", id),
        }
    }
}

// =============================================================================
// LEDGER ENTRY
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerPosting {
    pub account: LedgerAccount,
    pub amount: SignedAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonically increasing entry ID.
    pub entry_id: u64,
    /// Logical height when the entry was recorded.
    pub height: Height,
    /// Wall-clock time of the entry, informational only.
    pub recorded_at: DateTime<Utc>,
    pub event_ref: EventRef,
    pub description: String,
    pub postings: Vec<LedgerPosting>,
}

impl LedgerEntry {
    pub fn is_balanced(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> SignedAmount {
        self.postings.iter().map(|p| p.amount).sum()
    }
}

// =============================================================================
// LEDGER VIOLATION
// =============================================================================

/// A movement the ledger refused to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerViolation {
    /// Same event reference posted twice (e.g. a second release).
    DuplicatePosting { event_ref: EventRef },
    /// Postings do not sum to zero.
    UnbalancedEntry { total: SignedAmount },
    /// An account other than Capital would go negative.
    NegativeBalance {
        account: LedgerAccount,
        balance: SignedAmount,
    },
    /// Requested split does not release exactly the escrowed amount.
    SplitMismatch {
        id: DerivativeId,
        escrowed: Amount,
        requested: Amount,
    },
    /// Release to a taker on a record that has none.
    MissingTaker { id: DerivativeId },
    /// Movement against a record the ledger does not hold.
    UnknownRecord { id: DerivativeId },
    /// Amount or resulting custody total does not fit a signed posting.
    AmountOutOfRange { amount: Amount },
}

impl fmt::Display for LedgerViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerViolation::DuplicatePosting { event_ref } => {
                write!(f, "duplicate posting {}", event_ref.display())
            }
            LedgerViolation::UnbalancedEntry { total } => {
                write!(f, "unbalanced entry (postings sum to {})", total)
            }
            LedgerViolation::NegativeBalance { account, balance } => write!(
                f,
                "{} would hold {}",
                account.display_name(),
                balance
            ),
            LedgerViolation::SplitMismatch {
                id,
                escrowed,
                requested,
            } => write!(
                f,
                "split for derivative {} releases {} but escrow holds {}",
                id, requested, escrowed
            ),
            LedgerViolation::MissingTaker { id } => {
                write!(f, "derivative {} has no taker to release to", id)
            }
            LedgerViolation::UnknownRecord { id } => {
                write!(f, "derivative {} is not held by the ledger", id)
            }
            LedgerViolation::AmountOutOfRange { amount } => {
                write!(f, "amount {} exceeds the signed posting range", amount)
            }
        }
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Ledger statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_entries: u64,
    pub total_postings: u64,
    pub funding_entries: u64,
    pub deposit_entries: u64,
    pub fee_entries: u64,
    pub release_entries: u64,
    pub violations_detected: u64,
}

/// Terms supplied at mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintTerms {
    pub taker_amount: Amount,
    pub trigger_price: PriceValue,
    pub trigger_height: Height,
    pub deposit: Amount,
}

/// The escrow ledger: record storage plus custody accounting.
#[derive(Debug, Clone, Default)]
pub struct EscrowLedger {
    records: BTreeMap<DerivativeId, DerivativeRecord>,
    next_id: DerivativeId,
    entries: Vec<LedgerEntry>,
    next_entry_id: u64,
    next_funding_id: u64,
    posted_events: HashSet<EventRef>,
    balances: HashMap<LedgerAccount, SignedAmount>,
    total_funded: Amount,
    fees_paid: Amount,
    pub stats: LedgerStats,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self {
            next_entry_id: 1,
            next_funding_id: 1,
            ..Default::default()
        }
    }

    // -------------------------------------------------------------------------
    // External balances
    // -------------------------------------------------------------------------

    /// Credit an identity's external balance from outside the engine.
    pub fn fund_account(
        &mut self,
        who: &Identity,
        amount: Amount,
        height: Height,
    ) -> Result<u64, LedgerViolation> {
        let funding_id = self.next_funding_id;
        // Capping total custody keeps every account balance inside SignedAmount
        let total_funded = self
            .total_funded
            .checked_add(amount)
            .filter(|total| signed(*total).is_ok())
            .ok_or_else(|| self.violation(LedgerViolation::AmountOutOfRange { amount }))?;
        let amt = signed(amount)?;
        let entry_id = self.apply_entry(
            height,
            EventRef::Funding { funding_id },
            format!("Fund {} with {}", who, amount),
            vec![
                LedgerPosting {
                    account: LedgerAccount::External(who.clone()),
                    amount: amt,
                },
                LedgerPosting {
                    account: LedgerAccount::Capital,
                    amount: -amt,
                },
            ],
        )?;
        self.next_funding_id += 1;
        self.total_funded = total_funded;
        self.stats.funding_entries += 1;
        Ok(entry_id)
    }

    pub fn balance_of(&self, who: &Identity) -> Amount {
        self.get_balance(&LedgerAccount::External(who.clone())) as Amount
    }

    // -------------------------------------------------------------------------
    // Record lifecycle movements
    // -------------------------------------------------------------------------

    /// Validate mint terms, debit the maker and store a fresh Open record.
    ///
    /// Validation happens before any mutation; on error nothing changes.
    pub fn create_record(
        &mut self,
        maker: &Identity,
        terms: &MintTerms,
        current_height: Height,
        oracle_fee: Amount,
    ) -> Result<DerivativeId, EscrowError> {
        if terms.deposit <= oracle_fee {
            return Err(EscrowError::InsufficientDeposit {
                deposit: terms.deposit,
                oracle_fee,
            });
        }
        if terms.taker_amount <= oracle_fee {
            return Err(EscrowError::InsufficientTakerStake {
                taker_amount: terms.taker_amount,
                oracle_fee,
            });
        }
        if terms.trigger_height <= current_height {
            return Err(EscrowError::TriggerInPast {
                trigger_height: terms.trigger_height,
                current_height,
            });
        }
        self.ensure_funds(maker, terms.deposit)?;

        let id = self.next_id;
        self.transfer(
            current_height,
            EventRef::MakerDeposit { id },
            format!("Maker deposit for derivative {}", id),
            LedgerAccount::External(maker.clone()),
            LedgerAccount::Escrow(id),
            terms.deposit,
        )?;
        self.stats.deposit_entries += 1;

        self.records.insert(
            id,
            DerivativeRecord {
                id,
                maker: maker.clone(),
                taker: None,
                maker_amount: terms.deposit,
                taker_amount: terms.taker_amount,
                trigger_price: terms.trigger_price,
                trigger_height: terms.trigger_height,
                minted_at: current_height,
                taken: false,
                settled: false,
                pending_request: None,
                fee_paid: 0,
                settler: None,
                escrowed: terms.deposit,
            },
        );
        self.next_id += 1;
        Ok(id)
    }

    /// Move the taker's stake into the record's escrow and record the taker.
    pub fn lock_taker_stake(
        &mut self,
        id: DerivativeId,
        taker: &Identity,
        deposit: Amount,
        height: Height,
    ) -> Result<(), EscrowError> {
        if !self.records.contains_key(&id) {
            return Err(LedgerViolation::UnknownRecord { id }.into());
        }
        self.ensure_funds(taker, deposit)?;
        self.transfer(
            height,
            EventRef::TakerStake { id },
            format!("Taker stake for derivative {}", id),
            LedgerAccount::External(taker.clone()),
            LedgerAccount::Escrow(id),
            deposit,
        )?;
        self.stats.deposit_entries += 1;

        let record = self.record_entry(id)?;
        record.taker = Some(taker.clone());
        record.escrowed += deposit;
        Ok(())
    }

    /// Pay the oracle fee out of the record's pot. Irreversible.
    pub fn pay_oracle_fee(
        &mut self,
        id: DerivativeId,
        fee: Amount,
        gateway: &Identity,
        height: Height,
    ) -> Result<(), LedgerViolation> {
        if !self.records.contains_key(&id) {
            return Err(LedgerViolation::UnknownRecord { id });
        }
        self.transfer(
            height,
            EventRef::OracleFee { id },
            format!("Oracle fee for derivative {}", id),
            LedgerAccount::Escrow(id),
            LedgerAccount::External(gateway.clone()),
            fee,
        )?;
        self.stats.fee_entries += 1;
        self.fees_paid += fee;

        let record = self.record_entry(id)?;
        record.escrowed -= fee;
        record.fee_paid = fee;
        Ok(())
    }

    /// Release the whole escrow to the maker (cancel, or maker wins).
    pub fn release_to_maker(
        &mut self,
        id: DerivativeId,
        height: Height,
    ) -> Result<Amount, LedgerViolation> {
        let record = self.record(id).ok_or(LedgerViolation::UnknownRecord { id })?;
        let maker = record.maker.clone();
        let escrowed = record.escrowed;
        self.release(id, height, vec![(maker, escrowed)])?;
        Ok(escrowed)
    }

    /// Release the whole escrow to the taker (taker wins).
    pub fn release_to_taker(
        &mut self,
        id: DerivativeId,
        height: Height,
    ) -> Result<Amount, LedgerViolation> {
        let record = self.record(id).ok_or(LedgerViolation::UnknownRecord { id })?;
        let taker = record
            .taker
            .clone()
            .ok_or(LedgerViolation::MissingTaker { id })?;
        let escrowed = record.escrowed;
        self.release(id, height, vec![(taker, escrowed)])?;
        Ok(escrowed)
    }

    /// Refund both sides. The shares must add up to exactly the escrowed pot.
    pub fn release_split(
        &mut self,
        id: DerivativeId,
        maker_share: Amount,
        taker_share: Amount,
        height: Height,
    ) -> Result<(), LedgerViolation> {
        let record = self.record(id).ok_or(LedgerViolation::UnknownRecord { id })?;
        let requested = maker_share
            .checked_add(taker_share)
            .ok_or(LedgerViolation::AmountOutOfRange {
                amount: maker_share,
            })?;
        if requested != record.escrowed {
            return Err(LedgerViolation::SplitMismatch {
                id,
                escrowed: record.escrowed,
                requested,
            });
        }
        let taker = record
            .taker
            .clone()
            .ok_or(LedgerViolation::MissingTaker { id })?;
        let maker = record.maker.clone();
        self.release(id, height, vec![(maker, maker_share), (taker, taker_share)])
    }

    fn release(
        &mut self,
        id: DerivativeId,
        height: Height,
        payees: Vec<(Identity, Amount)>,
    ) -> Result<(), LedgerViolation> {
        let mut total: SignedAmount = 0;
        let mut credits = Vec::with_capacity(payees.len());
        for (who, amount) in payees {
            let amt = signed(amount)?;
            total = total
                .checked_add(amt)
                .ok_or(LedgerViolation::AmountOutOfRange { amount })?;
            credits.push((who, amount, amt));
        }
        let mut postings = vec![LedgerPosting {
            account: LedgerAccount::Escrow(id),
            amount: -total,
        }];
        let mut description = format!("Release derivative {}:", id);
        for (who, amount, amt) in credits {
            description.push_str(&format!(" {} -> {}", amount, who));
            postings.push(LedgerPosting {
                account: LedgerAccount::External(who),
                amount: amt,
            });
        }

        self.apply_entry(height, EventRef::Release { id }, description, postings)?;
        self.stats.release_entries += 1;

        let record = self.record_entry(id)?;
        record.escrowed = 0;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn record(&self, id: DerivativeId) -> Option<&DerivativeRecord> {
        self.records.get(&id)
    }

    /// Mutable access for the state machine's flag transitions.
    pub(crate) fn record_mut(&mut self, id: DerivativeId) -> Option<&mut DerivativeRecord> {
        self.records.get_mut(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &DerivativeRecord> {
        self.records.values()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn get_balance(&self, account: &LedgerAccount) -> SignedAmount {
        *self.balances.get(account).unwrap_or(&0)
    }

    pub fn balances(&self) -> &HashMap<LedgerAccount, SignedAmount> {
        &self.balances
    }

    pub fn escrow_balance(&self, id: DerivativeId) -> Amount {
        self.get_balance(&LedgerAccount::Escrow(id)) as Amount
    }

    /// Currency held across all records.
    pub fn total_escrowed(&self) -> Amount {
        self.balances
            .iter()
            .filter(|(account, _)| matches!(account, LedgerAccount::Escrow(_)))
            .map(|(_, balance)| *balance as Amount)
            .sum()
    }

    pub fn total_funded(&self) -> Amount {
        self.total_funded
    }

    pub fn fees_paid_total(&self) -> Amount {
        self.fees_paid
    }

    pub fn is_posted(&self, event_ref: &EventRef) -> bool {
        self.posted_events.contains(event_ref)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn ensure_funds(&self, who: &Identity, required: Amount) -> Result<(), EscrowError> {
        let balance = self.balance_of(who);
        if balance < required {
            return Err(EscrowError::InsufficientFunds {
                who: who.clone(),
                balance,
                required,
            });
        }
        Ok(())
    }

    fn record_entry(&mut self, id: DerivativeId) -> Result<&mut DerivativeRecord, LedgerViolation> {
        self.records
            .get_mut(&id)
            .ok_or(LedgerViolation::UnknownRecord { id })
    }

    fn transfer(
        &mut self,
        height: Height,
        event_ref: EventRef,
        description: String,
        from: LedgerAccount,
        to: LedgerAccount,
        amount: Amount,
    ) -> Result<u64, LedgerViolation> {
        let amt = signed(amount)?;
        self.apply_entry(
            height,
            event_ref,
            description,
            vec![
                LedgerPosting {
                    account: from,
                    amount: -amt,
                },
                LedgerPosting {
                    account: to,
                    amount: amt,
                },
            ],
        )
    }

    /// Validate and apply an entry. Nothing is mutated unless every check passes.
    fn apply_entry(
        &mut self,
        height: Height,
        event_ref: EventRef,
        description: String,
        postings: Vec<LedgerPosting>,
    ) -> Result<u64, LedgerViolation> {
        if self.posted_events.contains(&event_ref) {
            return Err(self.violation(LedgerViolation::DuplicatePosting { event_ref }));
        }

        let entry = LedgerEntry {
            entry_id: self.next_entry_id,
            height,
            recorded_at: Utc::now(),
            event_ref,
            description,
            postings,
        };
        if !entry.is_balanced() {
            return Err(self.violation(LedgerViolation::UnbalancedEntry {
                total: entry.total(),
            }));
        }

        let mut projected: HashMap<&LedgerAccount, SignedAmount> = HashMap::new();
        for posting in &entry.postings {
            let current = projected
                .entry(&posting.account)
                .or_insert_with(|| self.get_balance(&posting.account));
            *current += posting.amount;
        }
        if let Some((account, balance)) = projected
            .iter()
            .find(|(account, balance)| **balance < 0 && !account.may_go_negative())
        {
            let violation = LedgerViolation::NegativeBalance {
                account: (*account).clone(),
                balance: *balance,
            };
            return Err(self.violation(violation));
        }

        for posting in &entry.postings {
            *self.balances.entry(posting.account.clone()).or_insert(0) += posting.amount;
        }

        let entry_id = entry.entry_id;
        self.stats.total_entries += 1;
        self.stats.total_postings += entry.postings.len() as u64;
        self.posted_events.insert(entry.event_ref.clone());
        self.entries.push(entry);
        self.next_entry_id += 1;
        Ok(entry_id)
    }

    fn violation(&mut self, violation: LedgerViolation) -> LedgerViolation {
        self.stats.violations_detected += 1;
        tracing::error!(%violation, "escrow ledger refused entry");
        violation
    }
}

fn signed(amount: Amount) -> Result<SignedAmount, LedgerViolation> {
    SignedAmount::try_from(amount).map_err(|_| LedgerViolation::AmountOutOfRange { amount })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEE: Amount = 75;

    fn funded_ledger() -> (EscrowLedger, Identity, Identity) {
        let mut ledger = EscrowLedger::new();
        let maker = Identity::from("maker");
        let taker = Identity::from("taker");
        ledger.fund_account(&maker, 10_000, 0).unwrap();
        ledger.fund_account(&taker, 10_000, 0).unwrap();
        (ledger, maker, taker)
    }

    fn terms(deposit: Amount, taker_amount: Amount, trigger_height: Height) -> MintTerms {
        MintTerms {
            taker_amount,
            trigger_price: 50_000,
            trigger_height,
            deposit,
        }
    }

    #[test]
    fn test_create_record_debits_maker_atomically() {
        let (mut ledger, maker, _) = funded_ledger();
        let id = ledger
            .create_record(&maker, &terms(1_000, 2_000, 10), 1, FEE)
            .unwrap();

        assert_eq!(id, 0);
        assert_eq!(ledger.balance_of(&maker), 9_000);
        assert_eq!(ledger.escrow_balance(id), 1_000);
        assert_eq!(ledger.record(id).unwrap().escrowed, 1_000);
        assert!(ledger.entries().iter().all(|e| e.is_balanced()));
    }

    #[test]
    fn test_ids_are_sequential() {
        let (mut ledger, maker, _) = funded_ledger();
        let a = ledger.create_record(&maker, &terms(100, 200, 10), 1, FEE).unwrap();
        let b = ledger.create_record(&maker, &terms(100, 200, 10), 1, FEE).unwrap();
        assert_eq!((a, b), (0, 1));
    }

    #[test]
    fn test_create_record_validation_leaves_no_trace() {
        let (mut ledger, maker, _) = funded_ledger();
        let entries_before = ledger.entries().len();

        let err = ledger
            .create_record(&maker, &terms(FEE, 2_000, 10), 1, FEE)
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientDeposit { .. }));

        let err = ledger
            .create_record(&maker, &terms(1_000, FEE, 10), 1, FEE)
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientTakerStake { .. }));

        let err = ledger
            .create_record(&maker, &terms(1_000, 2_000, 5), 5, FEE)
            .unwrap_err();
        assert!(matches!(err, EscrowError::TriggerInPast { .. }));

        let err = ledger
            .create_record(&maker, &terms(50_000, 2_000, 10), 1, FEE)
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));

        assert_eq!(ledger.entries().len(), entries_before);
        assert_eq!(ledger.record_count(), 0);
        assert_eq!(ledger.balance_of(&maker), 10_000);
    }

    #[test]
    fn test_second_release_is_a_violation() {
        let (mut ledger, maker, _) = funded_ledger();
        let id = ledger.create_record(&maker, &terms(1_000, 2_000, 10), 1, FEE).unwrap();

        assert_eq!(ledger.release_to_maker(id, 2).unwrap(), 1_000);
        let err = ledger.release_to_maker(id, 2).unwrap_err();
        assert!(matches!(err, LedgerViolation::DuplicatePosting { .. }));
        assert_eq!(ledger.balance_of(&maker), 10_000);
        assert_eq!(ledger.stats.violations_detected, 1);
    }

    #[test]
    fn test_split_must_match_escrow() {
        let (mut ledger, maker, taker) = funded_ledger();
        let id = ledger.create_record(&maker, &terms(1_000, 2_000, 10), 1, FEE).unwrap();
        ledger.lock_taker_stake(id, &taker, 2_000, 2).unwrap();
        ledger.pay_oracle_fee(id, FEE, &Identity::from("oracle"), 10).unwrap();

        let err = ledger.release_split(id, 1_000, 2_000, 10).unwrap_err();
        assert!(matches!(err, LedgerViolation::SplitMismatch { requested: 3_000, .. }));

        ledger.release_split(id, 1_000, 2_000 - FEE, 10).unwrap();
        assert_eq!(ledger.balance_of(&maker), 10_000);
        assert_eq!(ledger.balance_of(&taker), 10_000 - FEE);
        assert_eq!(ledger.balance_of(&Identity::from("oracle")), FEE);
        assert_eq!(ledger.total_escrowed(), 0);
    }

    #[test]
    fn test_release_to_taker_requires_taker() {
        let (mut ledger, maker, _) = funded_ledger();
        let id = ledger.create_record(&maker, &terms(1_000, 2_000, 10), 1, FEE).unwrap();
        let err = ledger.release_to_taker(id, 3).unwrap_err();
        assert_eq!(err, LedgerViolation::MissingTaker { id });
        assert_eq!(ledger.escrow_balance(id), 1_000);
    }

    #[test]
    fn test_fee_cannot_overdraw_escrow() {
        let (mut ledger, maker, _) = funded_ledger();
        let id = ledger.create_record(&maker, &terms(100, 200, 10), 1, FEE).unwrap();
        let err = ledger
            .pay_oracle_fee(id, 500, &Identity::from("oracle"), 10)
            .unwrap_err();
        assert!(matches!(err, LedgerViolation::NegativeBalance { .. }));
        assert_eq!(ledger.escrow_balance(id), 100);
        assert_eq!(ledger.fees_paid_total(), 0);
    }

    #[test]
    fn test_funding_beyond_signed_range_is_refused() {
        let (mut ledger, maker, _) = funded_ledger();
        let entries_before = ledger.entries().len();

        let huge: Amount = 1 << 127;
        let err = ledger.fund_account(&maker, huge, 1).unwrap_err();
        assert_eq!(err, LedgerViolation::AmountOutOfRange { amount: huge });

        // Fits on its own, but pushes total custody past the signed range
        let headroom = SignedAmount::MAX as Amount - ledger.total_funded();
        let err = ledger.fund_account(&maker, headroom + 1, 1).unwrap_err();
        assert_eq!(err, LedgerViolation::AmountOutOfRange { amount: headroom + 1 });

        assert_eq!(ledger.entries().len(), entries_before);
        assert_eq!(ledger.balance_of(&maker), 10_000);
        assert_eq!(ledger.total_funded(), 20_000);
        assert_eq!(ledger.stats.violations_detected, 2);

        ledger.fund_account(&maker, headroom, 1).unwrap();
        assert_eq!(ledger.total_funded(), SignedAmount::MAX as Amount);
        assert_eq!(ledger.get_balance(&LedgerAccount::Capital), -SignedAmount::MAX);
    }
}
