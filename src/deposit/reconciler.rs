// DepositReconciler - attributes wallet unspent outputs to accounts
//
// At-least-once scanning, effectively-once crediting: the ledger's
// (txid, vout) idempotency key absorbs re-scans and restarts. A failed cycle
// is logged and the next cycle proceeds; a down wallet never halts the loop.

use crate::ledger::{DepositOutcome, LedgerError, LedgerStore, UserId};
use crate::wallet::{WalletBackend, WalletError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors from a reconciliation cycle
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Wallet unavailable: {0}")]
    Wallet(#[from] WalletError),

    #[error("Ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),
}

/// Configuration for the reconciler loop
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Delay between scan cycles
    pub interval: Duration,
    /// Minimum confirmations before an output is credited
    pub min_conf: u32,
    /// Maximum confirmations to list
    pub max_conf: u32,
    /// Address-label prefix marking per-account deposit addresses
    pub label_prefix: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            min_conf: 1,
            max_conf: 9_999_999,
            label_prefix: "user_".to_string(),
        }
    }
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_min_conf(mut self, min_conf: u32) -> Self {
        self.min_conf = min_conf;
        self
    }

    pub fn with_label_prefix(mut self, prefix: &str) -> Self {
        self.label_prefix = prefix.to_string();
        self
    }
}

/// Counters from one scan cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Outputs listed by the wallet
    pub seen: usize,
    /// Outputs credited this cycle
    pub credited: usize,
    /// Total satoshis credited this cycle
    pub credited_sats: u64,
    /// Outputs skipped because their key was already recorded
    pub skipped_duplicate: usize,
    /// Outputs skipped because no per-account label was attached
    pub skipped_unlabelled: usize,
}

/// Periodic deposit scanner
pub struct DepositReconciler {
    ledger: Arc<LedgerStore>,
    wallet: Arc<dyn WalletBackend>,
    config: ReconcilerConfig,
}

impl DepositReconciler {
    pub fn new(
        ledger: Arc<LedgerStore>,
        wallet: Arc<dyn WalletBackend>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            ledger,
            wallet,
            config,
        }
    }

    /// Resolve the owning account from an address's labels
    fn owner_of(&self, labels: &[String]) -> Option<UserId> {
        let label = labels
            .iter()
            .find(|l| l.starts_with(&self.config.label_prefix))?;
        match label[self.config.label_prefix.len()..].parse() {
            Ok(user) => Some(user),
            Err(_) => {
                warn!(label = %label, "unparsable account label; skipping output");
                None
            }
        }
    }

    /// Scan the wallet's unspent set once, crediting unseen outputs
    pub async fn scan_once(&self) -> Result<ScanStats, ReconcileError> {
        let mut stats = ScanStats::default();
        let outputs = self
            .wallet
            .list_unspent(self.config.min_conf, self.config.max_conf, None)
            .await?;

        for output in outputs {
            stats.seen += 1;

            if output.address.is_empty() {
                stats.skipped_unlabelled += 1;
                continue;
            }
            if self.ledger.has_deposit(&output.txid, output.vout)? {
                stats.skipped_duplicate += 1;
                continue;
            }

            let labels = self.wallet.address_labels(&output.address).await?;
            let Some(user) = self.owner_of(&labels) else {
                // Not one of ours
                stats.skipped_unlabelled += 1;
                continue;
            };

            match self
                .ledger
                .record_deposit(&output.txid, output.vout, user, output.amount_sats)?
            {
                DepositOutcome::Credited { new_balance } => {
                    info!(
                        user,
                        txid = %output.txid,
                        vout = output.vout,
                        amount_sats = output.amount_sats,
                        new_balance,
                        "credited deposit"
                    );
                    stats.credited += 1;
                    stats.credited_sats += output.amount_sats;
                }
                DepositOutcome::AlreadyRecorded => stats.skipped_duplicate += 1,
            }
        }
        Ok(stats)
    }

    /// Run the reconciliation loop forever. Cycle failures are logged and
    /// the loop proceeds; retry is the next tick, with no backoff.
    pub async fn run(&self) {
        info!(interval_secs = self.config.interval.as_secs(), "deposit reconciler started");
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            match self.scan_once().await {
                Ok(stats) if stats.credited > 0 => {
                    info!(
                        credited = stats.credited,
                        credited_sats = stats.credited_sats,
                        seen = stats.seen,
                        "scan cycle credited deposits"
                    );
                }
                Ok(stats) => {
                    debug!(seen = stats.seen, "scan cycle complete, nothing new");
                }
                Err(err) => {
                    error!(error = %err, "deposit scan failed; retrying next cycle");
                }
            }
        }
    }
}
