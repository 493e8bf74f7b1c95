// WithdrawEngine - constructs and broadcasts on-chain withdrawals
//
// Coin selection is greedy over the wallet's listing order; no optimization
// beyond that. The ledger is debited only after broadcast succeeds: any
// failure while constructing, signing, or broadcasting leaves the ledger
// untouched and surfaces the underlying error verbatim.

use crate::ledger::{LedgerError, LedgerStore, UserId};
use crate::wallet::{TxInput, Unspent, WalletBackend, WalletError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from withdrawal construction
#[derive(Error, Debug)]
pub enum WithdrawError {
    #[error("Amount must be a positive number of satoshis")]
    InvalidAmount,

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Not enough confirmed inputs: {available} sats confirmed, {required} required")]
    NotEnoughConfirmedInputs { available: u64, required: u64 },

    #[error("Fee of {fee_sats} sats meets or exceeds the withdrawal amount {amount_sats}")]
    FeeExceedsAmount { fee_sats: u64, amount_sats: u64 },

    #[error("Wallet failure: {0}")]
    Wallet(#[from] WalletError),

    #[error("Ledger failure: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for WithdrawError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                available,
                required,
            } => WithdrawError::InsufficientFunds {
                available,
                required,
            },
            other => WithdrawError::Ledger(other),
        }
    }
}

/// How the mining fee is determined. Exactly one mode is configured per
/// deployment; the modes are alternatives, never layered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeeMode {
    /// Draft the transaction, estimate its virtual size, multiply by a
    /// sat/vB rate, and subtract the fee from the destination payout
    SubtractFromPayout { sat_per_vbyte: u64 },
    /// Delegate coin selection and fee payment to the wallet's own send;
    /// the wallet decides the final paid amount
    WalletManaged,
}

/// Configuration for the withdrawal constructor
#[derive(Clone, Debug)]
pub struct WithdrawConfig {
    pub fee: FeeMode,
    /// Minimum confirmations for spendable inputs
    pub min_conf: u32,
    /// Change below this folds into the fee
    pub dust_limit_sats: u64,
}

impl Default for WithdrawConfig {
    fn default() -> Self {
        Self {
            fee: FeeMode::SubtractFromPayout { sat_per_vbyte: 5 },
            min_conf: 1,
            dust_limit_sats: 546,
        }
    }
}

impl WithdrawConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fee_mode(mut self, fee: FeeMode) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_min_conf(mut self, min_conf: u32) -> Self {
        self.min_conf = min_conf;
        self
    }

    pub fn with_dust_limit(mut self, dust_limit_sats: u64) -> Self {
        self.dust_limit_sats = dust_limit_sats;
        self
    }
}

/// Receipt for a broadcast withdrawal
#[derive(Clone, Debug)]
pub struct WithdrawalReceipt {
    pub txid: String,
    /// Amount debited from the ledger (always the requested amount)
    pub debited_sats: u64,
    /// Amount paid to the destination, when this side computed it
    pub paid_sats: Option<u64>,
    /// Fee taken out of the payout, when this side computed it
    pub fee_sats: Option<u64>,
}

/// Withdrawal constructor over a wallet backend
pub struct WithdrawEngine {
    ledger: Arc<LedgerStore>,
    wallet: Arc<dyn WalletBackend>,
    config: WithdrawConfig,
}

impl WithdrawEngine {
    pub fn new(
        ledger: Arc<LedgerStore>,
        wallet: Arc<dyn WalletBackend>,
        config: WithdrawConfig,
    ) -> Self {
        Self {
            ledger,
            wallet,
            config,
        }
    }

    /// Withdraw `amount_sats` to `dest`. A caller-supplied rate overrides
    /// the configured rate within the active fee mode only.
    pub async fn withdraw(
        &self,
        user: UserId,
        dest: &str,
        amount_sats: u64,
        rate_override: Option<u64>,
    ) -> Result<WithdrawalReceipt, WithdrawError> {
        if amount_sats == 0 {
            return Err(WithdrawError::InvalidAmount);
        }
        let available = self.ledger.balance(user)?.unwrap_or(0);
        if amount_sats > available {
            return Err(WithdrawError::InsufficientFunds {
                available,
                required: amount_sats,
            });
        }

        let receipt = match self.config.fee {
            FeeMode::WalletManaged => {
                let txid = self.wallet.send(dest, amount_sats, rate_override).await?;
                WithdrawalReceipt {
                    txid,
                    debited_sats: amount_sats,
                    paid_sats: None,
                    fee_sats: None,
                }
            }
            FeeMode::SubtractFromPayout { sat_per_vbyte } => {
                let rate = rate_override.unwrap_or(sat_per_vbyte);
                let (txid, paid, fee) = self.build_and_broadcast(dest, amount_sats, rate).await?;
                WithdrawalReceipt {
                    txid,
                    debited_sats: amount_sats,
                    paid_sats: Some(paid),
                    fee_sats: Some(fee),
                }
            }
        };

        // Sole commit point: the transaction is on the network
        self.ledger.debit(user, amount_sats)?;
        info!(
            user,
            txid = %receipt.txid,
            debited_sats = amount_sats,
            "withdrawal broadcast and debited"
        );
        Ok(receipt)
    }

    /// Greedy accumulation over the wallet's listing order until the target
    /// amount is covered
    fn select_inputs(
        unspent: &[Unspent],
        amount_sats: u64,
    ) -> Result<(Vec<Unspent>, u64), WithdrawError> {
        let mut selected = Vec::new();
        let mut total: u64 = 0;
        for output in unspent {
            if total >= amount_sats {
                break;
            }
            total = total.saturating_add(output.amount_sats);
            selected.push(output.clone());
        }
        if total < amount_sats {
            return Err(WithdrawError::NotEnoughConfirmedInputs {
                available: total,
                required: amount_sats,
            });
        }
        Ok((selected, total))
    }

    async fn build_and_broadcast(
        &self,
        dest: &str,
        amount_sats: u64,
        sat_per_vbyte: u64,
    ) -> Result<(String, u64, u64), WithdrawError> {
        let unspent = self
            .wallet
            .list_unspent(self.config.min_conf, 9_999_999, None)
            .await?;
        let (selected, total_in) = Self::select_inputs(&unspent, amount_sats)?;
        let inputs: Vec<TxInput> = selected.iter().map(TxInput::from_unspent).collect();

        // Change returns to the first selected input's address; no extra
        // wallet round-trip needed
        let change_address = selected[0].address.clone();
        let change = total_in - amount_sats;

        // Draft at the full amount to size the final transaction
        let mut draft_outputs = vec![(dest.to_string(), amount_sats)];
        if change >= self.config.dust_limit_sats {
            draft_outputs.push((change_address.clone(), change));
        }
        let draft = self
            .wallet
            .create_raw_transaction(&inputs, &draft_outputs)
            .await?;
        let vsize = self.wallet.decoded_vsize(&draft).await?;

        let fee = vsize
            .checked_mul(sat_per_vbyte)
            .ok_or(WithdrawError::FeeExceedsAmount {
                fee_sats: u64::MAX,
                amount_sats,
            })?;
        if fee >= amount_sats {
            return Err(WithdrawError::FeeExceedsAmount {
                fee_sats: fee,
                amount_sats,
            });
        }
        let payout = amount_sats - fee;

        // Sub-dust change folds into the fee by omission
        let mut outputs = vec![(dest.to_string(), payout)];
        if change >= self.config.dust_limit_sats {
            outputs.push((change_address, change));
        }
        let unsigned = self.wallet.create_raw_transaction(&inputs, &outputs).await?;
        let signed = self.wallet.sign_raw_transaction(&unsigned).await?;
        let txid = self.wallet.broadcast(&signed).await?;
        Ok((txid, payout, fee))
    }
}
