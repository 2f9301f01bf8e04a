//! Balance accounting for a storage node.
//!
//! Two balances exist per `(currency, address)`: the wallet balance the
//! identity holds on its own chain, and the loaded balance escrowed at the
//! node. Funding moves value wallet → node, withdrawing moves it back, and
//! every upload charges its price against the loaded balance.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::currency::Amount;
use crate::error::ToolkitError;

pub type AccountId = String;
pub type TxId = String;

pub fn account_id(currency: &str, address: &str) -> AccountId {
    format!("{currency}:{}", address.to_ascii_lowercase())
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient wallet funds in {account}: requested {requested}, available {available}")]
    InsufficientWalletFunds {
        account: AccountId,
        requested: Amount,
        available: Amount,
    },
    #[error("insufficient loaded balance in {account}: requested {requested}, loaded {loaded}")]
    InsufficientLoadedBalance {
        account: AccountId,
        requested: Amount,
        loaded: Amount,
    },
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TxId),
    #[error("balance overflow in {0}")]
    Overflow(AccountId),
}

impl From<LedgerError> for ToolkitError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientWalletFunds {
                requested,
                available,
                ..
            } => ToolkitError::InsufficientFunds {
                requested,
                available,
            },
            LedgerError::InsufficientLoadedBalance {
                requested, loaded, ..
            } => ToolkitError::InsufficientBalance { requested, loaded },
            LedgerError::ZeroAmount => ToolkitError::validation(err.to_string()),
            other => ToolkitError::Upload(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountBalance {
    pub wallet: Amount,
    pub loaded: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Deposit {
        account: AccountId,
        amount: Amount,
    },
    Funded {
        tx: TxId,
        account: AccountId,
        amount: Amount,
    },
    Withdrawn {
        tx: TxId,
        account: AccountId,
        amount: Amount,
    },
    Charged {
        tx: TxId,
        account: AccountId,
        amount: Amount,
        bytes: u64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LedgerSnapshot {
    pub height: u64,
    pub accounts: BTreeMap<AccountId, AccountBalance>,
    pub events: Vec<LedgerEvent>,
    pub state_root: [u8; 32],
}

#[derive(Clone, Debug, Default)]
pub struct NodeLedger {
    height: u64,
    accounts: BTreeMap<AccountId, AccountBalance>,
    events: Vec<LedgerEvent>,
    applied: BTreeSet<TxId>,
}

impl NodeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let applied = snapshot
            .events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Funded { tx, .. }
                | LedgerEvent::Withdrawn { tx, .. }
                | LedgerEvent::Charged { tx, .. } => Some(tx.clone()),
                LedgerEvent::Deposit { .. } => None,
            })
            .collect();
        Self {
            height: snapshot.height,
            accounts: snapshot.accounts,
            events: snapshot.events,
            applied,
        }
    }

    pub fn balance(&self, account: &AccountId) -> AccountBalance {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Credit the wallet side, e.g. from a faucet or an observed on-chain transfer.
    pub fn deposit(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.accounts.entry(account.clone()).or_default();
        balance.wallet = balance
            .wallet
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(account.clone()))?;
        self.record(LedgerEvent::Deposit {
            account: account.clone(),
            amount,
        });
        Ok(())
    }

    pub fn fund(&mut self, tx: TxId, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.check_new(&tx, amount)?;
        let balance = self.accounts.entry(account.clone()).or_default();
        let wallet = balance.wallet.checked_sub(amount).ok_or_else(|| {
            LedgerError::InsufficientWalletFunds {
                account: account.clone(),
                requested: amount,
                available: balance.wallet,
            }
        })?;
        let loaded = balance
            .loaded
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(account.clone()))?;
        balance.wallet = wallet;
        balance.loaded = loaded;
        self.applied.insert(tx.clone());
        self.record(LedgerEvent::Funded {
            tx,
            account: account.clone(),
            amount,
        });
        Ok(())
    }

    pub fn withdraw(
        &mut self,
        tx: TxId,
        account: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.check_new(&tx, amount)?;
        self.debit_loaded(account, amount)?;
        let balance = self.accounts.entry(account.clone()).or_default();
        balance.wallet = balance
            .wallet
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(account.clone()))?;
        self.applied.insert(tx.clone());
        self.record(LedgerEvent::Withdrawn {
            tx,
            account: account.clone(),
            amount,
        });
        Ok(())
    }

    /// Charge an upload's price. Free uploads are recorded with a zero amount.
    pub fn charge(
        &mut self,
        tx: TxId,
        account: &AccountId,
        amount: Amount,
        bytes: u64,
    ) -> Result<(), LedgerError> {
        if self.applied.contains(&tx) {
            return Err(LedgerError::DuplicateTransaction(tx));
        }
        self.debit_loaded(account, amount)?;
        self.applied.insert(tx.clone());
        self.record(LedgerEvent::Charged {
            tx,
            account: account.clone(),
            amount,
            bytes,
        });
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            height: self.height,
            accounts: self.accounts.clone(),
            events: self.events.clone(),
            state_root: compute_state_root(&self.accounts),
        }
    }

    fn check_new(&self, tx: &TxId, amount: Amount) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if self.applied.contains(tx) {
            return Err(LedgerError::DuplicateTransaction(tx.clone()));
        }
        Ok(())
    }

    fn debit_loaded(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let loaded = self.balance(account).loaded;
        let remaining =
            loaded
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::InsufficientLoadedBalance {
                    account: account.clone(),
                    requested: amount,
                    loaded,
                })?;
        self.accounts.entry(account.clone()).or_default().loaded = remaining;
        Ok(())
    }

    fn record(&mut self, event: LedgerEvent) {
        self.events.push(event);
        self.height += 1;
    }
}

fn compute_state_root(accounts: &BTreeMap<AccountId, AccountBalance>) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = accounts
        .iter()
        .map(|(account, balance)| {
            let mut hasher = Sha256::new();
            hasher.update(b"acct");
            hasher.update(account.as_bytes());
            hasher.update(balance.wallet.atomic().to_le_bytes());
            hasher.update(balance.loaded.atomic().to_le_bytes());
            hasher.finalize().into()
        })
        .collect();
    build_root(leaves)
}

fn build_root(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"node-ledger-empty").into();
    }
    while leaves.len() > 1 {
        leaves = leaves
            .chunks(2)
            .map(|pair| {
                let mut hasher = Sha256::new();
                hasher.update(b"node");
                hasher.update(pair[0]);
                hasher.update(pair.get(1).unwrap_or(&pair[0]));
                hasher.finalize().into()
            })
            .collect();
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AccountId {
        account_id("ethereum", "0xA11CE")
    }

    #[test]
    fn fund_then_withdraw_restores_balances() {
        let mut ledger = NodeLedger::new();
        ledger.deposit(&alice(), Amount::new(1_000)).unwrap();
        let before = ledger.balance(&alice());

        ledger.fund("f1".into(), &alice(), Amount::new(400)).unwrap();
        assert_eq!(ledger.balance(&alice()).loaded, Amount::new(400));
        assert_eq!(ledger.balance(&alice()).wallet, Amount::new(600));

        ledger.withdraw("w1".into(), &alice(), Amount::new(400)).unwrap();
        assert_eq!(ledger.balance(&alice()), before);
    }

    #[test]
    fn overdrafts_are_rejected_without_side_effects() {
        let mut ledger = NodeLedger::new();
        ledger.deposit(&alice(), Amount::new(100)).unwrap();
        assert!(matches!(
            ledger.fund("f1".into(), &alice(), Amount::new(101)),
            Err(LedgerError::InsufficientWalletFunds { .. })
        ));
        ledger.fund("f2".into(), &alice(), Amount::new(50)).unwrap();
        let err = ledger
            .withdraw("w1".into(), &alice(), Amount::new(51))
            .unwrap_err();
        assert!(matches!(
            ToolkitError::from(err),
            ToolkitError::InsufficientBalance { .. }
        ));
        assert_eq!(ledger.balance(&alice()).loaded, Amount::new(50));
    }

    #[test]
    fn duplicate_and_zero_transactions_are_rejected() {
        let mut ledger = NodeLedger::new();
        ledger.deposit(&alice(), Amount::new(100)).unwrap();
        ledger.fund("f1".into(), &alice(), Amount::new(10)).unwrap();
        assert!(matches!(
            ledger.fund("f1".into(), &alice(), Amount::new(10)),
            Err(LedgerError::DuplicateTransaction(_))
        ));
        assert!(matches!(
            ledger.fund("f2".into(), &alice(), Amount::ZERO),
            Err(LedgerError::ZeroAmount)
        ));
    }

    #[test]
    fn snapshot_round_trip_keeps_root_and_replay_protection() {
        let mut ledger = NodeLedger::new();
        ledger.deposit(&alice(), Amount::new(100)).unwrap();
        ledger.fund("f1".into(), &alice(), Amount::new(60)).unwrap();
        ledger.charge("tx1".into(), &alice(), Amount::new(5), 2048).unwrap();
        let snap = ledger.snapshot();
        assert_eq!(snap.height, 3);

        let json = serde_json::to_string(&snap).unwrap();
        let mut restored = NodeLedger::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.snapshot().state_root, snap.state_root);
        assert!(restored
            .charge("tx1".into(), &alice(), Amount::new(5), 2048)
            .is_err());
    }
}
