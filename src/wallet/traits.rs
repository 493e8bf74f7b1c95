// Wallet capability trait and core types
// Enumerates exactly the RPC surface the ledger core consumes, so any
// compliant wallet backend can be bound without leaking library specifics

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from wallet backends
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet RPC failed: {0}")]
    Rpc(String),

    #[error("Wallet returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("Wallet could not fully sign the transaction")]
    IncompleteSignature,

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// One unspent output as reported by the wallet.
/// Amounts are already converted to integer satoshis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unspent {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    pub amount_sats: u64,
    pub confirmations: u32,
}

/// A transaction input referenced by outpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub txid: String,
    pub vout: u32,
}

impl TxInput {
    pub fn from_unspent(unspent: &Unspent) -> Self {
        Self {
            txid: unspent.txid.clone(),
            vout: unspent.vout,
        }
    }
}

/// Snapshot of the chain as seen by the node
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainStatus {
    pub network: String,
    pub height: u64,
    pub difficulty: f64,
    pub mempool_txs: u64,
}

/// Abstract wallet backend
///
/// This is the complete node-facing surface of the system. Everything here
/// may be slow or fail; callers treat each method as a fallible external
/// call and never hold internal locks across more than one of them.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Issue a fresh deposit address carrying the given label
    async fn new_address(&self, label: &str) -> Result<String, WalletError>;

    /// Labels attached to an address (empty if none)
    async fn address_labels(&self, address: &str) -> Result<Vec<String>, WalletError>;

    /// List unspent outputs, optionally restricted to the given addresses
    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: Option<&[String]>,
    ) -> Result<Vec<Unspent>, WalletError>;

    /// Build an unsigned raw transaction (hex) paying the listed outputs
    async fn create_raw_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &[(String, u64)],
    ) -> Result<String, WalletError>;

    /// Virtual size in vbytes of a raw transaction
    async fn decoded_vsize(&self, hex: &str) -> Result<u64, WalletError>;

    /// Sign a raw transaction with the wallet's keys
    async fn sign_raw_transaction(&self, hex: &str) -> Result<String, WalletError>;

    /// Broadcast a signed raw transaction, returning its txid
    async fn broadcast(&self, hex: &str) -> Result<String, WalletError>;

    /// Wallet-managed send: the node selects coins and pays the fee at the
    /// given rate (sat/vB), deciding the final paid amount itself
    async fn send(
        &self,
        address: &str,
        amount_sats: u64,
        sat_per_vbyte: Option<u64>,
    ) -> Result<String, WalletError>;

    /// Current chain status
    async fn chain_status(&self) -> Result<ChainStatus, WalletError>;
}
