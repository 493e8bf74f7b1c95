// Custodian - composes the ledger, wallet, wager manager, and withdrawal
// engine behind the per-command API. The front end invokes these methods
// in-process; the core defines no network protocol of its own.

use crate::ledger::{AddressRecord, LedgerError, LedgerStore, UserId, MAX_ADDRESSES_PER_USER};
use crate::wager::{JoinOutcome, SessionId, WagerConfig, WagerError, WagerKind, WagerManager};
use crate::wallet::{ChainStatus, WalletBackend, WalletError};
use crate::withdraw::{WithdrawConfig, WithdrawEngine, WithdrawError, WithdrawalReceipt};
use std::sync::Arc;
use thiserror::Error;

/// Label prefix attaching issued addresses to accounts; the reconciler
/// resolves deposit ownership by matching it
pub const ACCOUNT_LABEL_PREFIX: &str = "user_";

/// Errors surfaced to the command layer
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Wager(#[from] WagerError),

    #[error(transparent)]
    Withdraw(#[from] WithdrawError),
}

/// The custodial core behind the chat commands
pub struct Custodian {
    ledger: Arc<LedgerStore>,
    wallet: Arc<dyn WalletBackend>,
    wagers: WagerManager,
    withdrawals: WithdrawEngine,
}

impl Custodian {
    pub fn new(
        ledger: Arc<LedgerStore>,
        wallet: Arc<dyn WalletBackend>,
        wager_config: WagerConfig,
        withdraw_config: WithdrawConfig,
    ) -> Self {
        let wagers = WagerManager::new(Arc::clone(&ledger), wager_config);
        let withdrawals =
            WithdrawEngine::new(Arc::clone(&ledger), Arc::clone(&wallet), withdraw_config);
        Self {
            ledger,
            wallet,
            wagers,
            withdrawals,
        }
    }

    /// Issue a fresh labelled deposit address for an account
    pub async fn issue_address(&self, user: UserId) -> Result<String, ServiceError> {
        // Fail before asking the wallet for an address the ledger would
        // refuse to record; the store re-checks atomically
        let issued = self.ledger.addresses(user)?.len();
        if issued as u32 >= MAX_ADDRESSES_PER_USER {
            return Err(LedgerError::AddressLimitReached {
                limit: MAX_ADDRESSES_PER_USER,
            }
            .into());
        }
        let label = format!("{}{}", ACCOUNT_LABEL_PREFIX, user);
        let address = self.wallet.new_address(&label).await?;
        self.ledger.issue_address(user, &address)?;
        Ok(address)
    }

    /// List an account's issued addresses in issuance order
    pub fn list_addresses(&self, user: UserId) -> Result<Vec<AddressRecord>, ServiceError> {
        Ok(self.ledger.addresses(user)?)
    }

    /// Ledger balance in satoshis, or None for an untouched account
    pub fn balance(&self, user: UserId) -> Result<Option<u64>, ServiceError> {
        Ok(self.ledger.balance(user)?)
    }

    /// Open a wager session
    pub async fn start_wager(
        &self,
        id: SessionId,
        creator: UserId,
        creator_label: &str,
        stake_sats: u64,
        target: usize,
        kind: WagerKind,
    ) -> Result<(), ServiceError> {
        Ok(self
            .wagers
            .create(id, creator, creator_label, stake_sats, target, kind)
            .await?)
    }

    /// Join a wager session; settlement runs synchronously on completion
    pub async fn join_wager(
        &self,
        id: SessionId,
        user: UserId,
        label: &str,
    ) -> Result<JoinOutcome, ServiceError> {
        Ok(self.wagers.join(id, user, label).await?)
    }

    /// Cancel an open wager session (creator only)
    pub async fn cancel_wager(&self, id: SessionId, user: UserId) -> Result<(), ServiceError> {
        Ok(self.wagers.cancel(id, user).await?)
    }

    /// Drop expired open sessions; returns how many were cancelled
    pub async fn sweep_expired_wagers(&self) -> usize {
        self.wagers.sweep_expired().await
    }

    /// Withdraw satoshis to an external address
    pub async fn withdraw(
        &self,
        user: UserId,
        dest: &str,
        amount_sats: u64,
        rate_override: Option<u64>,
    ) -> Result<WithdrawalReceipt, ServiceError> {
        Ok(self
            .withdrawals
            .withdraw(user, dest, amount_sats, rate_override)
            .await?)
    }

    /// Current chain status as seen by the node
    pub async fn chain_status(&self) -> Result<ChainStatus, ServiceError> {
        Ok(self.wallet.chain_status().await?)
    }
}
