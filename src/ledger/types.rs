// Core ledger types
// All amounts are integer satoshis; BTC conversion happens at the wallet edge only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque external account identity (e.g. a chat platform user id)
pub type UserId = u64;

/// Maximum number of deposit addresses a single account may hold
pub const MAX_ADDRESSES_PER_USER: u32 = 100;

/// Immutable record of a credited on-chain deposit.
/// Keyed in the store by its (txid, vout) idempotency key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    /// Account the output was attributed to
    pub user: UserId,
    /// Credited amount in satoshis
    pub amount_sats: u64,
    /// When the reconciler recorded the deposit
    pub recorded_at: DateTime<Utc>,
}

/// One issued deposit address. Append-only, never reassigned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: String,
    pub issued_at: DateTime<Utc>,
}

/// Result of recording a deposit against the (txid, vout) idempotency key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepositOutcome {
    /// First sighting of this output: the owner was credited
    Credited { new_balance: u64 },
    /// The key was already present: a recognized no-op, not an error
    AlreadyRecorded,
}

impl DepositOutcome {
    /// Check whether this outcome moved funds
    pub fn is_credited(&self) -> bool {
        matches!(self, Self::Credited { .. })
    }
}
