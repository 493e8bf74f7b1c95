// Deposit module - RECONCILIATION
// Polls the wallet's unspent set and credits owners exactly once

mod reconciler;

pub use reconciler::{DepositReconciler, ReconcileError, ReconcilerConfig, ScanStats};
