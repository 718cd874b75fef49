//! World state: accounts, storage, and checkpoint discipline.

use crate::types::{keccak256, Address, Hash, U256};
use std::collections::HashMap;

/// A single account: balance, nonce, code, storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: U256,
    pub nonce: u64,
    pub code: Vec<u8>,
    pub storage: HashMap<U256, U256>,
}

impl Account {
    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }
}

/// Mutable world state with nested LIFO checkpoints.
///
/// `revert` restores exactly the state captured by the most recent
/// `checkpoint`; `commit` folds the scope into its parent. Snapshots are
/// whole-map clones — the state is single-writer and dev-node sized, so
/// correctness beats journaling here.
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    accounts: HashMap<Address, Account>,
    checkpoints: Vec<HashMap<Address, Account>>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current state. Pair with `commit` or `revert`.
    pub fn checkpoint(&mut self) {
        self.checkpoints.push(self.accounts.clone());
    }

    /// Keep the changes made since the most recent checkpoint.
    /// Returns false if no checkpoint is open.
    pub fn commit(&mut self) -> bool {
        self.checkpoints.pop().is_some()
    }

    /// Discard the changes made since the most recent checkpoint.
    /// Returns false if no checkpoint is open.
    pub fn revert(&mut self) -> bool {
        match self.checkpoints.pop() {
            Some(snapshot) => {
                self.accounts = snapshot;
                true
            }
            None => false,
        }
    }

    /// Open checkpoint count.
    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn account_mut(&mut self, address: Address) -> &mut Account {
        self.accounts.entry(address).or_default()
    }

    pub fn get_balance(&self, address: &Address) -> U256 {
        self.accounts
            .get(address)
            .map(|a| a.balance)
            .unwrap_or(U256::ZERO)
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.account_mut(address).balance = balance;
    }

    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.nonce).unwrap_or(0)
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.account_mut(address).nonce = nonce;
    }

    pub fn get_code(&self, address: &Address) -> Vec<u8> {
        self.accounts
            .get(address)
            .map(|a| a.code.clone())
            .unwrap_or_default()
    }

    pub fn set_code(&mut self, address: Address, code: Vec<u8>) {
        self.account_mut(address).code = code;
    }

    pub fn get_storage(&self, address: &Address, slot: &U256) -> U256 {
        self.accounts
            .get(address)
            .and_then(|a| a.storage.get(slot).copied())
            .unwrap_or(U256::ZERO)
    }

    pub fn set_storage(&mut self, address: Address, slot: U256, value: U256) {
        self.account_mut(address).storage.insert(slot, value);
    }

    /// Move `value` wei from one account to another.
    /// Fails without touching anything if the sender cannot cover it.
    pub fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), U256> {
        let from_balance = self.get_balance(&from);
        let remaining = from_balance.checked_sub(value).ok_or(from_balance)?;
        self.set_balance(from, remaining);
        let to_balance = self.get_balance(&to);
        self.set_balance(to, to_balance.wrapping_add(value));
        Ok(())
    }

    /// Deterministic commitment over the full state.
    ///
    /// Keccak fold over accounts sorted by address, each contributing
    /// (address, balance, nonce, code hash, sorted storage). A stand-in
    /// for a Merkle-Patricia root, which is deliberately out of scope.
    pub fn state_root(&self) -> Hash {
        let mut addresses: Vec<&Address> = self.accounts.keys().collect();
        addresses.sort();

        let mut input = Vec::new();
        for address in addresses {
            let account = &self.accounts[address];
            input.extend_from_slice(address.as_bytes());
            input.extend_from_slice(&account.balance.to_be_bytes());
            input.extend_from_slice(&account.nonce.to_le_bytes());
            input.extend_from_slice(&keccak256(&account.code));

            let mut slots: Vec<&U256> = account.storage.keys().collect();
            slots.sort();
            for slot in slots {
                input.extend_from_slice(&slot.to_be_bytes());
                input.extend_from_slice(&account.storage[slot].to_be_bytes());
            }
        }
        Hash(keccak256(&input))
    }
}
