// LedgerStore - Durable satoshi accounting on sled
//
// Three trees:
// - balances:  user id (u64 BE) -> balance sats (u64 BE)
// - deposits:  "txid:vout"      -> DepositRecord (postcard)
// - addresses: issuance counter + one entry per issued address
//
// Every debit is a conditional update inside a sled transaction, so a
// concurrent debit on the same account can never overdraft it. Multi-account
// transfers and deposit recording run as single transactions: either every
// listed write applies or none does.

use crate::ledger::types::{
    AddressRecord, DepositOutcome, DepositRecord, UserId, MAX_ADDRESSES_PER_USER,
};
use chrono::Utc;
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
};
use sled::Transactional;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Key prefixes within the addresses tree
mod keys {
    pub const ADDR_SEQ_PREFIX: &[u8] = b"seq:";
    pub const ADDR_ENTRY_PREFIX: &[u8] = b"addr:";
}

/// Errors from ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to open ledger database: {0}")]
    OpenFailed(String),

    #[error("Ledger database operation failed: {0}")]
    Database(String),

    #[error("Amount must be a positive number of satoshis")]
    InvalidAmount,

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Balance would overflow")]
    BalanceOverflow,

    #[error("Address limit reached: account already holds {limit} addresses")]
    AddressLimitReached { limit: u32 },

    #[error("Corrupt ledger record: {key}")]
    CorruptRecord { key: String },

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}

/// Statistics about the ledger
#[derive(Clone, Debug)]
pub struct LedgerStats {
    /// Number of accounts with a balance entry
    pub accounts: usize,
    /// Number of recorded deposits
    pub deposits: usize,
    /// Number of issued addresses (across all accounts)
    pub addresses: usize,
}

/// Durable per-account ledger
///
/// Uses sled for crash-safe, embedded storage. All mutations are atomic;
/// writes are durable after flush.
pub struct LedgerStore {
    db: sled::Db,
    balances: sled::Tree,
    deposits: sled::Tree,
    addresses: sled::Tree,
}

fn abort(err: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(err)
}

fn run<T>(result: Result<T, TransactionError<LedgerError>>) -> Result<T, LedgerError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(LedgerError::Database(err.to_string())),
    }
}

fn decode_sats(bytes: &[u8], key: &str) -> Result<u64, LedgerError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LedgerError::CorruptRecord { key: key.to_string() })?;
    Ok(u64::from_be_bytes(arr))
}

/// Read a balance inside a transaction, treating a missing account as zero
fn tx_balance(
    tree: &TransactionalTree,
    user: UserId,
) -> Result<u64, ConflictableTransactionError<LedgerError>> {
    match tree.get(user.to_be_bytes())? {
        Some(bytes) => decode_sats(&bytes, &user.to_string()).map_err(abort),
        None => Ok(0),
    }
}

fn deposit_key(txid: &str, vout: u32) -> Vec<u8> {
    format!("{}:{}", txid, vout).into_bytes()
}

impl LedgerStore {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let db = sled::open(path).map_err(|e| LedgerError::OpenFailed(e.to_string()))?;
        let balances = db.open_tree("balances")?;
        let deposits = db.open_tree("deposits")?;
        let addresses = db.open_tree("addresses")?;
        Ok(Self {
            db,
            balances,
            deposits,
            addresses,
        })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()?;
        Ok(())
    }

    /// Get ledger statistics
    pub fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let addresses = self
            .addresses
            .scan_prefix(keys::ADDR_ENTRY_PREFIX)
            .count();
        Ok(LedgerStats {
            accounts: self.balances.len(),
            deposits: self.deposits.len(),
            addresses,
        })
    }

    // ========================================================================
    // BALANCES
    // ========================================================================

    /// Get an account's balance, or None if the account has never been touched
    pub fn balance(&self, user: UserId) -> Result<Option<u64>, LedgerError> {
        match self.balances.get(user.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode_sats(&bytes, &user.to_string())?)),
            None => Ok(None),
        }
    }

    /// Sum of all account balances (the custodied money supply)
    pub fn total_balance(&self) -> Result<u64, LedgerError> {
        let mut total: u64 = 0;
        for entry in self.balances.iter() {
            let (key, value) = entry?;
            let sats = decode_sats(&value, &format!("{:?}", key))?;
            total = total
                .checked_add(sats)
                .ok_or(LedgerError::BalanceOverflow)?;
        }
        Ok(total)
    }

    /// Unconditionally increase an account's balance, creating it lazily.
    /// Returns the new balance.
    pub fn credit(&self, user: UserId, amount: u64) -> Result<u64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        run(self.balances.transaction(|tx| {
            let current = tx_balance(tx, user)?;
            let next = current
                .checked_add(amount)
                .ok_or_else(|| abort(LedgerError::BalanceOverflow))?;
            tx.insert(&user.to_be_bytes()[..], &next.to_be_bytes()[..])?;
            Ok(next)
        }))
    }

    /// Conditionally decrease an account's balance. Fails with
    /// InsufficientFunds unless the current balance covers the amount; the
    /// check and the write are one atomic unit. Returns the new balance.
    pub fn debit(&self, user: UserId, amount: u64) -> Result<u64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        run(self.balances.transaction(|tx| {
            let current = tx_balance(tx, user)?;
            if current < amount {
                return Err(abort(LedgerError::InsufficientFunds {
                    available: current,
                    required: amount,
                }));
            }
            let next = current - amount;
            tx.insert(&user.to_be_bytes()[..], &next.to_be_bytes()[..])?;
            Ok(next)
        }))
    }

    /// Apply a set of debits and credits as one all-or-nothing unit.
    ///
    /// Per account, the total debit is checked against the balance before
    /// any credit lands, so an account cannot fund its debit out of a credit
    /// in the same transfer. Either every listed mutation applies or none
    /// does. This is the commitment primitive for wager settlement.
    pub fn transfer(
        &self,
        debits: &[(UserId, u64)],
        credits: &[(UserId, u64)],
    ) -> Result<(), LedgerError> {
        if debits.iter().chain(credits.iter()).any(|&(_, amt)| amt == 0) {
            return Err(LedgerError::InvalidAmount);
        }

        // Aggregate per account so a user listed twice is handled once
        let mut totals: BTreeMap<UserId, (u64, u64)> = BTreeMap::new();
        for &(user, amount) in debits {
            let entry = totals.entry(user).or_insert((0, 0));
            entry.0 = entry.0.checked_add(amount).ok_or(LedgerError::BalanceOverflow)?;
        }
        for &(user, amount) in credits {
            let entry = totals.entry(user).or_insert((0, 0));
            entry.1 = entry.1.checked_add(amount).ok_or(LedgerError::BalanceOverflow)?;
        }

        run(self.balances.transaction(|tx| {
            for (&user, &(debit, credit)) in &totals {
                let current = tx_balance(tx, user)?;
                if current < debit {
                    return Err(abort(LedgerError::InsufficientFunds {
                        available: current,
                        required: debit,
                    }));
                }
                let next = (current - debit)
                    .checked_add(credit)
                    .ok_or_else(|| abort(LedgerError::BalanceOverflow))?;
                tx.insert(&user.to_be_bytes()[..], &next.to_be_bytes()[..])?;
            }
            Ok(())
        }))
    }

    // ========================================================================
    // DEPOSITS
    // ========================================================================

    /// Check whether a (txid, vout) pair has already been recorded
    pub fn has_deposit(&self, txid: &str, vout: u32) -> Result<bool, LedgerError> {
        Ok(self.deposits.contains_key(deposit_key(txid, vout))?)
    }

    /// Look up a recorded deposit
    pub fn deposit(&self, txid: &str, vout: u32) -> Result<Option<DepositRecord>, LedgerError> {
        match self.deposits.get(deposit_key(txid, vout))? {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes).map_err(|_| {
                    LedgerError::CorruptRecord {
                        key: format!("{}:{}", txid, vout),
                    }
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Record a deposit and credit its owner in one atomic step.
    ///
    /// (txid, vout) is the idempotency key: if it is already present this is
    /// a no-op and the balance is untouched, no matter how many times the
    /// same output is observed.
    pub fn record_deposit(
        &self,
        txid: &str,
        vout: u32,
        user: UserId,
        amount: u64,
    ) -> Result<DepositOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let key = deposit_key(txid, vout);
        let record = DepositRecord {
            user,
            amount_sats: amount,
            recorded_at: Utc::now(),
        };
        let record_bytes = postcard::to_allocvec(&record)
            .map_err(|e| LedgerError::SerializationFailed(e.to_string()))?;

        run(
            (&self.balances, &self.deposits).transaction(|(bal, dep)| {
                if dep.get(key.as_slice())?.is_some() {
                    return Ok(DepositOutcome::AlreadyRecorded);
                }
                dep.insert(key.as_slice(), record_bytes.as_slice())?;

                let current = tx_balance(bal, user)?;
                let next = current
                    .checked_add(amount)
                    .ok_or_else(|| abort(LedgerError::BalanceOverflow))?;
                bal.insert(&user.to_be_bytes()[..], &next.to_be_bytes()[..])?;
                Ok(DepositOutcome::Credited { new_balance: next })
            }),
        )
    }

    // ========================================================================
    // ADDRESS BOOK
    // ========================================================================

    /// Record a newly issued deposit address for an account.
    ///
    /// Addresses are append-only; an account may hold at most
    /// MAX_ADDRESSES_PER_USER of them. Returns the issuance sequence number.
    pub fn issue_address(&self, user: UserId, address: &str) -> Result<u32, LedgerError> {
        let record = AddressRecord {
            address: address.to_string(),
            issued_at: Utc::now(),
        };
        let record_bytes = postcard::to_allocvec(&record)
            .map_err(|e| LedgerError::SerializationFailed(e.to_string()))?;

        let seq_key = Self::address_seq_key(user);
        run(self.addresses.transaction(|tx| {
            let seq = match tx.get(seq_key.as_slice())? {
                Some(bytes) => {
                    let arr: [u8; 4] = bytes.as_ref().try_into().map_err(|_| {
                        abort(LedgerError::CorruptRecord {
                            key: format!("seq:{}", user),
                        })
                    })?;
                    u32::from_be_bytes(arr)
                }
                None => 0,
            };
            if seq >= MAX_ADDRESSES_PER_USER {
                return Err(abort(LedgerError::AddressLimitReached {
                    limit: MAX_ADDRESSES_PER_USER,
                }));
            }
            let entry_key = Self::address_entry_key(user, seq);
            tx.insert(entry_key.as_slice(), record_bytes.as_slice())?;
            tx.insert(seq_key.as_slice(), &(seq + 1).to_be_bytes()[..])?;
            Ok(seq)
        }))
    }

    /// List an account's issued addresses in issuance order
    pub fn addresses(&self, user: UserId) -> Result<Vec<AddressRecord>, LedgerError> {
        let prefix = Self::address_entry_prefix(user);
        let mut records = Vec::new();
        for entry in self.addresses.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let record = postcard::from_bytes(&value).map_err(|_| {
                LedgerError::CorruptRecord {
                    key: format!("{:?}", key),
                }
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn address_seq_key(user: UserId) -> Vec<u8> {
        [keys::ADDR_SEQ_PREFIX, &user.to_be_bytes()].concat()
    }

    fn address_entry_prefix(user: UserId) -> Vec<u8> {
        [keys::ADDR_ENTRY_PREFIX, &user.to_be_bytes()].concat()
    }

    fn address_entry_key(user: UserId, seq: u32) -> Vec<u8> {
        [
            keys::ADDR_ENTRY_PREFIX,
            &user.to_be_bytes()[..],
            &seq.to_be_bytes()[..],
        ]
        .concat()
    }
}
