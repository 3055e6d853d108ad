use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{meter::AccessMeter, Address, Amount, FundMeError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    Funded {
        funder: Address,
        amount: Amount,
        total: Amount,
    },
    Withdrawn {
        owner: Address,
        amount: Amount,
        funders_cleared: usize,
    },
}

/// Contributor records, the funder registry and the held balance.
///
/// A record at zero is absent from `records`. The registry lists, in
/// insertion order, exactly the contributors with a non-zero record, and the
/// records always sum to `held_balance`.
///
/// Mutations go through the `pub(crate)` storage accessors below, each of
/// which bills the [`AccessMeter`]. Public getters are free views.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContributionLedger {
    records: BTreeMap<Address, Amount>,
    funders: Vec<Address>,
    held_balance: Amount,
    events: Vec<LedgerEvent>,
    #[serde(skip)]
    meter: AccessMeter,
}

// Storage traffic is a cost, not state.
impl PartialEq for ContributionLedger {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
            && self.funders == other.funders
            && self.held_balance == other.held_balance
            && self.events == other.events
    }
}

impl Eq for ContributionLedger {}

/// Copy of everything a withdrawal may touch, taken before it starts.
#[derive(Debug)]
pub(crate) struct LedgerCheckpoint {
    records: Vec<(Address, Amount)>,
    funders: Vec<Address>,
    held_balance: Amount,
    events_len: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub held_balance: Amount,
    pub funders: Vec<Address>,
    /// Records in registry order.
    pub records: Vec<(Address, Amount)>,
    pub state_root: [u8; 32],
}

impl ContributionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn amount_funded(&self, funder: &Address) -> Amount {
        self.records.get(funder).copied().unwrap_or(0)
    }

    pub fn funders(&self) -> &[Address] {
        &self.funders
    }

    pub fn held_balance(&self) -> Amount {
        self.held_balance
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn meter(&self) -> AccessMeter {
        self.meter
    }

    pub fn take_meter(&mut self) -> AccessMeter {
        self.meter.take()
    }

    /// Add `amount` to the funder's record, registering the funder on its
    /// first non-zero contribution of the cycle. Returns the new record.
    pub(crate) fn record_contribution(
        &mut self,
        funder: Address,
        amount: Amount,
    ) -> Result<Amount, FundMeError> {
        self.meter.read();
        let previous = self.amount_funded(&funder);
        if amount == 0 {
            return Ok(previous);
        }
        let total = previous
            .checked_add(amount)
            .ok_or(FundMeError::ArithmeticOverflow("contributor record"))?;
        self.meter.read();
        let held = self
            .held_balance
            .checked_add(amount)
            .ok_or(FundMeError::ArithmeticOverflow("held balance"))?;

        self.meter.write();
        self.records.insert(funder, total);
        if previous == 0 {
            // length read, element write, length write
            self.meter.read();
            self.meter.write();
            self.meter.write();
            self.funders.push(funder);
        }
        self.meter.write();
        self.held_balance = held;
        self.events.push(LedgerEvent::Funded {
            funder,
            amount,
            total,
        });
        Ok(total)
    }

    pub(crate) fn load_funder_count(&mut self) -> usize {
        self.meter.read();
        self.funders.len()
    }

    pub(crate) fn load_funder(&mut self, index: usize) -> Option<Address> {
        self.meter.read();
        self.funders.get(index).copied()
    }

    /// Copy the whole registry out of storage: one length read plus one read
    /// per entry.
    pub(crate) fn load_funders(&mut self) -> Vec<Address> {
        self.meter.read_many(1 + self.funders.len() as u64);
        self.funders.clone()
    }

    pub(crate) fn clear_record(&mut self, funder: &Address) {
        self.meter.write();
        self.records.remove(funder);
    }

    pub(crate) fn clear_funders(&mut self) {
        self.meter.write();
        self.funders.clear();
    }

    /// Zero the held balance and return what it was.
    pub(crate) fn drain_held_balance(&mut self) -> Amount {
        self.meter.read();
        self.meter.write();
        std::mem::take(&mut self.held_balance)
    }

    pub(crate) fn push_event(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub(crate) fn checkpoint(&self) -> LedgerCheckpoint {
        LedgerCheckpoint {
            records: self
                .funders
                .iter()
                .map(|funder| (*funder, self.amount_funded(funder)))
                .collect(),
            funders: self.funders.clone(),
            held_balance: self.held_balance,
            events_len: self.events.len(),
        }
    }

    pub(crate) fn revert(&mut self, checkpoint: LedgerCheckpoint) {
        for (funder, amount) in checkpoint.records {
            self.records.insert(funder, amount);
        }
        self.funders = checkpoint.funders;
        self.held_balance = checkpoint.held_balance;
        self.events.truncate(checkpoint.events_len);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let records: Vec<(Address, Amount)> = self
            .funders
            .iter()
            .map(|funder| (*funder, self.amount_funded(funder)))
            .collect();
        LedgerSnapshot {
            held_balance: self.held_balance,
            funders: self.funders.clone(),
            state_root: compute_state_root(&records, self.held_balance),
            records,
        }
    }
}

fn compute_state_root(records: &[(Address, Amount)], held_balance: Amount) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(records.len() + 1);
    for (funder, amount) in records {
        let mut hasher = Sha256::new();
        hasher.update(b"record");
        hasher.update(funder.as_bytes());
        hasher.update(amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    let mut hasher = Sha256::new();
    hasher.update(b"held");
    hasher.update(held_balance.to_le_bytes());
    leaves.push(hasher.finalize().into());
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"fundme-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn repeated_contributions_accumulate_without_duplicates() {
        let mut ledger = ContributionLedger::new();
        assert_eq!(ledger.record_contribution(addr(1), 10).unwrap(), 10);
        assert_eq!(ledger.record_contribution(addr(2), 5).unwrap(), 5);
        assert_eq!(ledger.record_contribution(addr(1), 7).unwrap(), 17);

        assert_eq!(ledger.funders(), &[addr(1), addr(2)]);
        assert_eq!(ledger.amount_funded(&addr(1)), 17);
        assert_eq!(ledger.amount_funded(&addr(3)), 0);
        assert_eq!(ledger.held_balance(), 22);
        assert_eq!(ledger.events().len(), 3);
    }

    #[test]
    fn zero_contribution_registers_nobody() {
        let mut ledger = ContributionLedger::new();
        assert_eq!(ledger.record_contribution(addr(1), 0).unwrap(), 0);
        assert!(ledger.funders().is_empty());
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn overflow_leaves_ledger_untouched() {
        let mut ledger = ContributionLedger::new();
        ledger.record_contribution(addr(1), u128::MAX).unwrap();
        let before = ledger.clone();
        let err = ledger.record_contribution(addr(2), 1).unwrap_err();
        assert_eq!(err, FundMeError::ArithmeticOverflow("held balance"));
        assert_eq!(ledger, before);
    }

    #[test]
    fn revert_restores_checkpointed_state() {
        let mut ledger = ContributionLedger::new();
        ledger.record_contribution(addr(1), 3).unwrap();
        ledger.record_contribution(addr(2), 4).unwrap();
        let before = ledger.clone();

        let checkpoint = ledger.checkpoint();
        for funder in ledger.load_funders() {
            ledger.clear_record(&funder);
        }
        ledger.clear_funders();
        assert_eq!(ledger.drain_held_balance(), 7);
        ledger.revert(checkpoint);

        assert_eq!(ledger, before);
    }

    #[test]
    fn copying_the_registry_costs_one_read_per_entry_plus_length() {
        let mut ledger = ContributionLedger::new();
        for byte in 1..=4 {
            ledger.record_contribution(addr(byte), 1).unwrap();
        }
        ledger.take_meter();
        let copy = ledger.load_funders();
        assert_eq!(copy.len(), 4);
        assert_eq!(ledger.meter().reads, 5);
        assert_eq!(ledger.meter().writes, 0);
    }

    #[test]
    fn meter_does_not_affect_equality() {
        let mut a = ContributionLedger::new();
        a.record_contribution(addr(1), 1).unwrap();
        let mut b = a.clone();
        b.load_funder_count();
        assert_ne!(a.meter(), b.meter());
        assert_eq!(a, b);
    }

    #[test]
    fn state_root_is_deterministic_and_tracks_records() {
        let mut ledger = ContributionLedger::new();
        ledger.record_contribution(addr(1), 1_000).unwrap();
        ledger.record_contribution(addr(2), 2_000).unwrap();
        let root1 = ledger.snapshot().state_root;
        let root2 = ledger.snapshot().state_root;
        assert_eq!(root1, root2);

        ledger.record_contribution(addr(2), 1).unwrap();
        assert_ne!(ledger.snapshot().state_root, root1);
    }

    #[test]
    fn snapshot_survives_json() {
        let mut ledger = ContributionLedger::new();
        ledger.record_contribution(addr(9), 42).unwrap();
        let json = serde_json::to_string(&ledger).unwrap();
        let back: ContributionLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
        assert_eq!(back.snapshot(), ledger.snapshot());
    }
}
