//! Token balances with nested, journaled transactions.
//!
//! The bank holds every balance the protocol touches: depositors' assets,
//! vault and pool accounts, the lending market's reserve and its
//! yield-bearing receipt token. A component makes its calls atomic by
//! running them inside [`Bank::transaction`]: on `Err` every balance write
//! made inside the closure is undone.
//!
//! Transactions nest. An inner failure undoes only the inner frame; an
//! inner success folds its journal into the enclosing frame so the outer
//! transaction can still undo it.

use std::collections::HashMap;

use crate::{Address, AssetId, BankError};

type Key = (AssetId, Address);

#[derive(Debug, Clone)]
enum JournalEntry {
    Balance { key: Key, previous: u64 },
    Supply { asset: AssetId, previous: u64 },
}

/// In-memory token ledger.
#[derive(Debug, Clone, Default)]
pub struct Bank {
    balances: HashMap<Key, u64>,
    supplies: HashMap<AssetId, u64>,
    journal: Vec<Vec<JournalEntry>>,
}

impl Bank {
    /// Create an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `holder` in `asset`.
    pub fn balance_of(&self, asset: AssetId, holder: Address) -> u64 {
        self.balances.get(&(asset, holder)).copied().unwrap_or(0)
    }

    /// Total minted-minus-burned supply of `asset`.
    pub fn total_supply(&self, asset: AssetId) -> u64 {
        self.supplies.get(&asset).copied().unwrap_or(0)
    }

    /// Create `amount` of `asset` in `to`'s account.
    ///
    /// # Errors
    ///
    /// - [`BankError::ZeroAddress`] if `to` is the null address
    /// - [`BankError::Overflow`] if the balance or supply would overflow
    pub fn mint(&mut self, asset: AssetId, to: Address, amount: u64) -> Result<(), BankError> {
        if to.is_zero() {
            return Err(BankError::ZeroAddress);
        }
        let supply = self
            .total_supply(asset)
            .checked_add(amount)
            .ok_or(BankError::Overflow { asset })?;
        let balance = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(BankError::Overflow { asset })?;
        self.write_supply(asset, supply);
        self.write_balance((asset, to), balance);
        Ok(())
    }

    /// Destroy `amount` of `asset` held by `from`.
    ///
    /// # Errors
    ///
    /// - [`BankError::InsufficientBalance`] if `from` holds less than `amount`
    pub fn burn(&mut self, asset: AssetId, from: Address, amount: u64) -> Result<(), BankError> {
        let balance = self.debit_amount(asset, from, amount)?;
        let supply = self.total_supply(asset).saturating_sub(amount);
        self.write_balance((asset, from), balance);
        self.write_supply(asset, supply);
        Ok(())
    }

    /// Move `amount` of `asset` from `from` to `to`.
    ///
    /// Zero-amount transfers succeed without touching any balance.
    ///
    /// # Errors
    ///
    /// - [`BankError::ZeroAddress`] if `to` is the null address
    /// - [`BankError::InsufficientBalance`] if `from` holds less than `amount`
    /// - [`BankError::Overflow`] if the credit would overflow
    pub fn transfer(
        &mut self,
        asset: AssetId,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<(), BankError> {
        if to.is_zero() {
            return Err(BankError::ZeroAddress);
        }
        let debited = self.debit_amount(asset, from, amount)?;
        if amount == 0 || from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(BankError::Overflow { asset })?;
        self.write_balance((asset, from), debited);
        self.write_balance((asset, to), credited);
        tracing::trace!(%asset, %from, %to, amount, "bank transfer");
        Ok(())
    }

    /// Run `f` atomically against this bank.
    ///
    /// If `f` returns `Err`, every balance and supply write it made is
    /// reverted before the error is returned.
    pub fn transaction<T, E>(&mut self, f: impl FnOnce(&mut Bank) -> Result<T, E>) -> Result<T, E> {
        self.journal.push(Vec::new());
        let result = f(self);
        let frame = self.journal.pop().unwrap_or_default();
        match &result {
            Ok(_) => {
                if let Some(parent) = self.journal.last_mut() {
                    parent.extend(frame);
                }
            }
            Err(_) => self.revert(frame),
        }
        result
    }

    /// Depth of the currently open transaction stack.
    pub fn transaction_depth(&self) -> usize {
        self.journal.len()
    }

    fn debit_amount(&self, asset: AssetId, holder: Address, amount: u64) -> Result<u64, BankError> {
        let available = self.balance_of(asset, holder);
        available
            .checked_sub(amount)
            .ok_or(BankError::InsufficientBalance {
                asset,
                holder,
                required: amount,
                available,
            })
    }

    fn write_balance(&mut self, key: Key, value: u64) {
        let previous = self.balances.get(&key).copied().unwrap_or(0);
        if let Some(frame) = self.journal.last_mut() {
            frame.push(JournalEntry::Balance { key, previous });
        }
        if value == 0 {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, value);
        }
    }

    fn write_supply(&mut self, asset: AssetId, value: u64) {
        let previous = self.total_supply(asset);
        if let Some(frame) = self.journal.last_mut() {
            frame.push(JournalEntry::Supply { asset, previous });
        }
        self.supplies.insert(asset, value);
    }

    fn revert(&mut self, frame: Vec<JournalEntry>) {
        for entry in frame.into_iter().rev() {
            match entry {
                JournalEntry::Balance { key, previous } => {
                    if previous == 0 {
                        self.balances.remove(&key);
                    } else {
                        self.balances.insert(key, previous);
                    }
                }
                JournalEntry::Supply { asset, previous } => {
                    self.supplies.insert(asset, previous);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_mint_transfer_burn() {
        let token = addr(100);
        let mut bank = Bank::new();
        bank.mint(token, addr(1), 1_000).expect("mint");
        bank.transfer(token, addr(1), addr(2), 400).expect("transfer");
        assert_eq!(bank.balance_of(token, addr(1)), 600);
        assert_eq!(bank.balance_of(token, addr(2)), 400);

        bank.burn(token, addr(2), 100).expect("burn");
        assert_eq!(bank.balance_of(token, addr(2)), 300);
        assert_eq!(bank.total_supply(token), 900);
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let token = addr(100);
        let mut bank = Bank::new();
        bank.mint(token, addr(1), 10).expect("mint");
        let err = bank.transfer(token, addr(1), addr(2), 11).expect_err("transfer should fail");
        assert_eq!(
            err,
            BankError::InsufficientBalance {
                asset: token,
                holder: addr(1),
                required: 11,
                available: 10,
            }
        );
    }

    #[test]
    fn test_transfer_to_zero_rejected() {
        let token = addr(100);
        let mut bank = Bank::new();
        bank.mint(token, addr(1), 10).expect("mint");
        assert_eq!(
            bank.transfer(token, addr(1), Address::ZERO, 1),
            Err(BankError::ZeroAddress)
        );
    }

    #[test]
    fn test_self_transfer_is_noop() {
        let token = addr(100);
        let mut bank = Bank::new();
        bank.mint(token, addr(1), 10).expect("mint");
        bank.transfer(token, addr(1), addr(1), 10).expect("self transfer");
        assert_eq!(bank.balance_of(token, addr(1)), 10);
        assert!(bank.transfer(token, addr(1), addr(1), 11).is_err());
    }

    #[test]
    fn test_failed_transaction_reverts_everything() {
        let token = addr(100);
        let mut bank = Bank::new();
        bank.mint(token, addr(1), 100).expect("mint");

        let result: Result<(), BankError> = bank.transaction(|bank| {
            bank.transfer(token, addr(1), addr(2), 60)?;
            bank.mint(token, addr(3), 5)?;
            bank.transfer(token, addr(1), addr(2), 60)
        });

        assert!(result.is_err());
        assert_eq!(bank.balance_of(token, addr(1)), 100);
        assert_eq!(bank.balance_of(token, addr(2)), 0);
        assert_eq!(bank.balance_of(token, addr(3)), 0);
        assert_eq!(bank.total_supply(token), 100);
        assert_eq!(bank.transaction_depth(), 0);
    }

    #[test]
    fn test_nested_inner_failure_keeps_outer_writes() {
        let token = addr(100);
        let mut bank = Bank::new();
        bank.mint(token, addr(1), 100).expect("mint");

        let outer: Result<(), BankError> = bank.transaction(|bank| {
            bank.transfer(token, addr(1), addr(2), 10)?;
            let inner: Result<(), BankError> = bank.transaction(|bank| {
                bank.transfer(token, addr(1), addr(3), 20)?;
                Err(BankError::ZeroAddress)
            });
            assert!(inner.is_err());
            Ok(())
        });

        outer.expect("outer commits");
        assert_eq!(bank.balance_of(token, addr(1)), 90);
        assert_eq!(bank.balance_of(token, addr(2)), 10);
        assert_eq!(bank.balance_of(token, addr(3)), 0);
    }

    #[test]
    fn test_nested_inner_success_undone_by_outer_failure() {
        let token = addr(100);
        let mut bank = Bank::new();
        bank.mint(token, addr(1), 100).expect("mint");

        let outer: Result<(), BankError> = bank.transaction(|bank| {
            bank.transaction(|bank| bank.transfer(token, addr(1), addr(3), 20))?;
            bank.burn(token, addr(1), 1_000)
        });

        assert!(outer.is_err());
        assert_eq!(bank.balance_of(token, addr(1)), 100);
        assert_eq!(bank.balance_of(token, addr(3)), 0);
    }
}
