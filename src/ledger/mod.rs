// Ledger module - ACCOUNTING
// Durable integer-satoshi balances, deposit idempotency records,
// and the per-account issued-address book

mod store;
mod types;

pub use store::{LedgerError, LedgerStats, LedgerStore};
pub use types::{
    AddressRecord, DepositOutcome, DepositRecord, UserId, MAX_ADDRESSES_PER_USER,
};
