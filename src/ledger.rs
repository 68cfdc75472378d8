//! Running leave balances per (subject, leave type)
//!
//! The ledger is the single source of truth for remaining days. Balances are
//! seeded lazily at the type's annual allotment and only move through a debit,
//! never by replaying request history.
use super::catalog::LeaveCatalog;
use super::error::{LeaveError, abort};
use super::utils::{decode_days, encode_days, pair_key};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};

pub const BALANCES_TREE: &str = "balances";

#[derive(Clone)]
pub struct BalanceLedger {
    balances: sled::Tree,
    catalog: LeaveCatalog,
}

impl BalanceLedger {
    pub fn open(db: &sled::Db, catalog: LeaveCatalog) -> Result<Self, LeaveError> {
        Ok(Self {
            balances: db.open_tree(BALANCES_TREE)?,
            catalog,
        })
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.balances
    }

    /// Allotment a fresh balance for `leave_type` starts from.
    pub fn seed_for(&self, leave_type: &str) -> Result<u32, LeaveError> {
        Ok(self.catalog.get(leave_type)?.max_days)
    }

    /// Remaining days, materialising the balance on first reference.
    pub fn balance_of(&self, subject: &str, leave_type: &str) -> Result<u32, LeaveError> {
        let key = pair_key(subject, leave_type);
        if let Some(value) = self.balances.get(&key)? {
            return decode_days(&value).ok_or(LeaveError::CorruptRecord("balance"));
        }

        let seed = self.seed_for(leave_type)?;
        match self
            .balances
            .compare_and_swap(&key, None::<&[u8]>, Some(&encode_days(seed)[..]))?
        {
            Ok(()) => {
                tracing::debug!(subject, leave_type, seed, "balance materialised");
                Ok(seed)
            }
            // someone else seeded it first, theirs stands
            Err(cas) => cas
                .current
                .as_deref()
                .and_then(decode_days)
                .ok_or(LeaveError::CorruptRecord("balance")),
        }
    }

    pub fn check_sufficient(
        &self,
        subject: &str,
        leave_type: &str,
        requested_days: u32,
    ) -> Result<bool, LeaveError> {
        Ok(requested_days <= self.balance_of(subject, leave_type)?)
    }

    /// Subtract `days`, flooring at zero. Returns the remaining balance.
    ///
    /// Calling this exactly once per approved request is the caller's job;
    /// the workflow service does so inside the approval transaction.
    pub fn debit(&self, subject: &str, leave_type: &str, days: u32) -> Result<u32, LeaveError> {
        self.balance_of(subject, leave_type)?;
        let key = pair_key(subject, leave_type);

        let updated = self.balances.update_and_fetch(&key, |old| {
            let current = old.and_then(decode_days).unwrap_or(0);
            Some(encode_days(current.saturating_sub(days)).to_vec())
        })?;

        let remaining = updated
            .as_deref()
            .and_then(decode_days)
            .ok_or(LeaveError::CorruptRecord("balance"))?;
        tracing::info!(subject, leave_type, days, remaining, "balance debited");
        Ok(remaining)
    }
}

/// Read a balance inside a transaction without materialising it.
pub(crate) fn balance_in(
    balances: &TransactionalTree,
    subject: &str,
    leave_type: &str,
    seed: u32,
) -> ConflictableTransactionResult<u32, LeaveError> {
    match balances.get(pair_key(subject, leave_type))? {
        Some(value) => decode_days(&value).ok_or_else(|| abort(LeaveError::CorruptRecord("balance"))),
        None => Ok(seed),
    }
}

/// Debit inside a transaction, flooring at zero.
pub(crate) fn debit_in(
    balances: &TransactionalTree,
    subject: &str,
    leave_type: &str,
    seed: u32,
    days: u32,
) -> ConflictableTransactionResult<u32, LeaveError> {
    let remaining = balance_in(balances, subject, leave_type, seed)?.saturating_sub(days);
    balances.insert(pair_key(subject, leave_type), &encode_days(remaining)[..])?;
    Ok(remaining)
}
