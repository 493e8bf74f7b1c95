// Mock wallet backend for tests
// Configurable unspent set, address labels, and failure injection in the
// same shape as the rest of the crate's external-system mocks

use crate::wallet::traits::{ChainStatus, TxInput, Unspent, WalletBackend, WalletError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory wallet double. Drafts are synthetic JSON blobs whose vsize is
/// derived from input/output counts, so fee arithmetic is deterministic.
pub struct MockWallet {
    unspent: Mutex<Vec<Unspent>>,
    labels: Mutex<HashMap<String, Vec<String>>>,
    issued: AtomicUsize,
    broadcasts: AtomicUsize,
    sends: AtomicUsize,
    broadcast_failure: Mutex<Option<String>>,
    broadcast_failures_remaining: AtomicUsize,
    send_failure: Mutex<Option<String>>,
    listing_failure: Mutex<Option<String>>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            unspent: Mutex::new(Vec::new()),
            labels: Mutex::new(HashMap::new()),
            issued: AtomicUsize::new(0),
            broadcasts: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            broadcast_failure: Mutex::new(None),
            broadcast_failures_remaining: AtomicUsize::new(0),
            send_failure: Mutex::new(None),
            listing_failure: Mutex::new(None),
        }
    }

    /// Add an unspent output to the wallet's listing (in call order)
    pub fn with_unspent(self, unspent: Unspent) -> Self {
        self.unspent.lock().unwrap().push(unspent);
        self
    }

    /// Add an unspent output after construction (a deposit "arriving")
    pub fn add_unspent(&self, unspent: Unspent) {
        self.unspent.lock().unwrap().push(unspent);
    }

    /// Attach a label to an address
    pub fn with_labelled_address(self, address: &str, label: &str) -> Self {
        self.labels
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push(label.to_string());
        self
    }

    /// Every broadcast fails with the given message
    pub fn with_broadcast_failure(self, message: &str) -> Self {
        *self.broadcast_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    /// The first N broadcasts fail, then broadcasts succeed
    pub fn with_broadcast_failures_then_success(self, failures: usize) -> Self {
        self.broadcast_failures_remaining
            .store(failures, Ordering::SeqCst);
        self
    }

    /// Every wallet-managed send fails with the given message
    pub fn with_send_failure(self, message: &str) -> Self {
        *self.send_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Every listunspent call fails with the given message
    pub fn with_listing_failure(self, message: &str) -> Self {
        *self.listing_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Clear a configured listing failure (the wallet "came back")
    pub fn clear_listing_failure(&self) {
        *self.listing_failure.lock().unwrap() = None;
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Convenience constructor for test unspent outputs
    pub fn unspent(txid: &str, vout: u32, address: &str, amount_sats: u64) -> Unspent {
        Unspent {
            txid: txid.to_string(),
            vout,
            address: address.to_string(),
            amount_sats,
            confirmations: 6,
        }
    }

    fn draft(hex: &str) -> Result<Value, WalletError> {
        let raw = hex.strip_prefix("signed:").unwrap_or(hex);
        serde_json::from_str(raw)
            .map_err(|_| WalletError::MalformedResponse("not a mock draft".to_string()))
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletBackend for MockWallet {
    async fn new_address(&self, label: &str) -> Result<String, WalletError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let address = format!("mock-addr-{}", n);
        self.labels
            .lock()
            .unwrap()
            .entry(address.clone())
            .or_default()
            .push(label.to_string());
        Ok(address)
    }

    async fn address_labels(&self, address: &str) -> Result<Vec<String>, WalletError> {
        Ok(self
            .labels
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_unspent(
        &self,
        min_conf: u32,
        _max_conf: u32,
        addresses: Option<&[String]>,
    ) -> Result<Vec<Unspent>, WalletError> {
        if let Some(message) = self.listing_failure.lock().unwrap().clone() {
            return Err(WalletError::Rpc(message));
        }
        let unspent = self.unspent.lock().unwrap();
        Ok(unspent
            .iter()
            .filter(|u| u.confirmations >= min_conf)
            .filter(|u| match addresses {
                Some(addrs) => addrs.contains(&u.address),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &[(String, u64)],
    ) -> Result<String, WalletError> {
        let outputs_json: Vec<Value> = outputs
            .iter()
            .map(|(address, sats)| json!({ "address": address, "sats": sats }))
            .collect();
        let draft = json!({
            "inputs": inputs.iter().map(|i| json!({ "txid": i.txid, "vout": i.vout })).collect::<Vec<_>>(),
            "outputs": outputs_json,
        });
        Ok(draft.to_string())
    }

    async fn decoded_vsize(&self, hex: &str) -> Result<u64, WalletError> {
        let draft = Self::draft(hex)?;
        let inputs = draft["inputs"].as_array().map(Vec::len).unwrap_or(0) as u64;
        let outputs = draft["outputs"].as_array().map(Vec::len).unwrap_or(0) as u64;
        // Rough P2WPKH shape: overhead + per-input + per-output
        Ok(10 + inputs * 68 + outputs * 31)
    }

    async fn sign_raw_transaction(&self, hex: &str) -> Result<String, WalletError> {
        Ok(format!("signed:{}", hex))
    }

    async fn broadcast(&self, hex: &str) -> Result<String, WalletError> {
        if !hex.starts_with("signed:") {
            return Err(WalletError::BroadcastRejected("unsigned transaction".to_string()));
        }
        if let Some(message) = self.broadcast_failure.lock().unwrap().clone() {
            return Err(WalletError::BroadcastRejected(message));
        }
        if self
            .broadcast_failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(WalletError::BroadcastRejected("mock failure".to_string()));
        }
        let n = self.broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-txid-{}", n))
    }

    async fn send(
        &self,
        _address: &str,
        _amount_sats: u64,
        _sat_per_vbyte: Option<u64>,
    ) -> Result<String, WalletError> {
        if let Some(message) = self.send_failure.lock().unwrap().clone() {
            return Err(WalletError::Rpc(message));
        }
        let n = self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-send-txid-{}", n))
    }

    async fn chain_status(&self) -> Result<ChainStatus, WalletError> {
        Ok(ChainStatus {
            network: "mocknet".to_string(),
            height: 100,
            difficulty: 1.0,
            mempool_txs: 0,
        })
    }
}
