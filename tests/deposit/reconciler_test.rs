// Scan-cycle attribution, idempotency, and failure-isolation tests

use satflip::deposit::{DepositReconciler, ReconcileError, ReconcilerConfig, ScanStats};
use satflip::ledger::LedgerStore;
use satflip::wallet::MockWallet;
use std::sync::Arc;
use tempfile::TempDir;

fn setup(dir: &TempDir, wallet: MockWallet) -> (Arc<LedgerStore>, Arc<MockWallet>, DepositReconciler) {
    let ledger = Arc::new(LedgerStore::open(dir.path()).unwrap());
    let wallet = Arc::new(wallet);
    let reconciler = DepositReconciler::new(
        Arc::clone(&ledger),
        Arc::clone(&wallet) as Arc<dyn satflip::wallet::WalletBackend>,
        ReconcilerConfig::new(),
    );
    (ledger, wallet, reconciler)
}

#[tokio::test]
async fn test_empty_wallet_credits_nothing() {
    let dir = TempDir::new().unwrap();
    let (_, _, reconciler) = setup(&dir, MockWallet::new());

    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats, ScanStats::default());
}

#[tokio::test]
async fn test_labelled_output_is_credited_to_its_account() {
    let dir = TempDir::new().unwrap();
    let wallet = MockWallet::new()
        .with_labelled_address("bc1-alice", "user_7")
        .with_unspent(MockWallet::unspent("tx-a", 0, "bc1-alice", 5000));
    let (ledger, _, reconciler) = setup(&dir, wallet);

    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.seen, 1);
    assert_eq!(stats.credited, 1);
    assert_eq!(stats.credited_sats, 5000);
    assert_eq!(ledger.balance(7).unwrap(), Some(5000));
}

#[tokio::test]
async fn test_rescans_credit_each_output_exactly_once() {
    let dir = TempDir::new().unwrap();
    let wallet = MockWallet::new()
        .with_labelled_address("bc1-alice", "user_7")
        .with_unspent(MockWallet::unspent("tx-a", 0, "bc1-alice", 5000));
    let (ledger, _, reconciler) = setup(&dir, wallet);

    for cycle in 0..4 {
        let stats = reconciler.scan_once().await.unwrap();
        if cycle == 0 {
            assert_eq!(stats.credited, 1);
        } else {
            assert_eq!(stats.credited, 0);
            assert_eq!(stats.skipped_duplicate, 1);
        }
    }
    assert_eq!(ledger.balance(7).unwrap(), Some(5000));
}

#[tokio::test]
async fn test_output_arriving_between_scans_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let wallet = MockWallet::new()
        .with_labelled_address("bc1-alice", "user_7")
        .with_unspent(MockWallet::unspent("tx-a", 0, "bc1-alice", 1000));
    let (ledger, wallet, reconciler) = setup(&dir, wallet);

    reconciler.scan_once().await.unwrap();
    wallet.add_unspent(MockWallet::unspent("tx-b", 1, "bc1-alice", 2500));

    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.credited, 1);
    assert_eq!(stats.skipped_duplicate, 1);
    assert_eq!(ledger.balance(7).unwrap(), Some(3500));
}

#[tokio::test]
async fn test_unlabelled_outputs_are_ignored() {
    let dir = TempDir::new().unwrap();
    // Change and third-party outputs carry no account label
    let wallet = MockWallet::new()
        .with_unspent(MockWallet::unspent("tx-c", 0, "bc1-change", 9000));
    let (ledger, _, reconciler) = setup(&dir, wallet);

    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.credited, 0);
    assert_eq!(stats.skipped_unlabelled, 1);
    assert_eq!(ledger.total_balance().unwrap(), 0);
}

#[tokio::test]
async fn test_malformed_account_label_is_skipped() {
    let dir = TempDir::new().unwrap();
    let wallet = MockWallet::new()
        .with_labelled_address("bc1-bad", "user_notanumber")
        .with_unspent(MockWallet::unspent("tx-d", 0, "bc1-bad", 700));
    let (ledger, _, reconciler) = setup(&dir, wallet);

    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.credited, 0);
    assert_eq!(stats.skipped_unlabelled, 1);
    assert_eq!(ledger.total_balance().unwrap(), 0);
}

#[tokio::test]
async fn test_foreign_label_is_skipped() {
    let dir = TempDir::new().unwrap();
    let wallet = MockWallet::new()
        .with_labelled_address("bc1-other", "invoice-42")
        .with_unspent(MockWallet::unspent("tx-e", 0, "bc1-other", 800));
    let (_, _, reconciler) = setup(&dir, wallet);

    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.skipped_unlabelled, 1);
}

#[tokio::test]
async fn test_unconfirmed_outputs_excluded_until_ready() {
    let dir = TempDir::new().unwrap();
    let mut fresh = MockWallet::unspent("tx-f", 0, "bc1-alice", 1200);
    fresh.confirmations = 0;
    let wallet = MockWallet::new()
        .with_labelled_address("bc1-alice", "user_7")
        .with_unspent(fresh);
    let (ledger, wallet, reconciler) = setup(&dir, wallet);

    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.seen, 0);
    assert_eq!(ledger.balance(7).unwrap(), None);

    // The same output at depth is credited on a later cycle
    wallet.add_unspent(MockWallet::unspent("tx-f", 0, "bc1-alice", 1200));
    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.credited, 1);
    assert_eq!(ledger.balance(7).unwrap(), Some(1200));
}

#[tokio::test]
async fn test_listing_failure_isolates_the_cycle() {
    let dir = TempDir::new().unwrap();
    let wallet = MockWallet::new()
        .with_labelled_address("bc1-alice", "user_7")
        .with_unspent(MockWallet::unspent("tx-g", 0, "bc1-alice", 4000))
        .with_listing_failure("connection refused");
    let (ledger, wallet, reconciler) = setup(&dir, wallet);

    let err = reconciler.scan_once().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Wallet(_)));
    assert_eq!(ledger.total_balance().unwrap(), 0);

    // The wallet comes back and the next cycle catches up in full
    wallet.clear_listing_failure();
    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.credited, 1);
    assert_eq!(ledger.balance(7).unwrap(), Some(4000));
}

#[tokio::test]
async fn test_multiple_accounts_credited_in_one_cycle() {
    let dir = TempDir::new().unwrap();
    let wallet = MockWallet::new()
        .with_labelled_address("bc1-alice", "user_1")
        .with_labelled_address("bc1-bob", "user_2")
        .with_unspent(MockWallet::unspent("tx-h", 0, "bc1-alice", 100))
        .with_unspent(MockWallet::unspent("tx-h", 1, "bc1-bob", 200))
        .with_unspent(MockWallet::unspent("tx-i", 0, "bc1-alice", 300));
    let (ledger, _, reconciler) = setup(&dir, wallet);

    let stats = reconciler.scan_once().await.unwrap();
    assert_eq!(stats.credited, 3);
    assert_eq!(stats.credited_sats, 600);
    assert_eq!(ledger.balance(1).unwrap(), Some(400));
    assert_eq!(ledger.balance(2).unwrap(), Some(200));
}
