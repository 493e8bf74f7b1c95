// Withdraw module - LEAVING CUSTODY
// UTXO selection, fee handling, broadcast, then the single ledger debit

mod engine;

pub use engine::{
    FeeMode, WithdrawConfig, WithdrawEngine, WithdrawError, WithdrawalReceipt,
};
