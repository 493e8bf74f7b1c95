// Multi-account transfer atomicity tests

use satflip::ledger::{LedgerError, LedgerStore};
use tempfile::TempDir;

fn open_ledger(dir: &TempDir) -> LedgerStore {
    LedgerStore::open(dir.path()).unwrap()
}

#[test]
fn test_transfer_moves_funds() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    ledger.credit(1, 1000).unwrap();
    ledger.transfer(&[(1, 400)], &[(2, 400)]).unwrap();

    assert_eq!(ledger.balance(1).unwrap(), Some(600));
    assert_eq!(ledger.balance(2).unwrap(), Some(400));
    assert_eq!(ledger.total_balance().unwrap(), 1000);
}

#[test]
fn test_transfer_is_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    ledger.credit(1, 1000).unwrap();
    ledger.credit(2, 50).unwrap();

    // Account 2 cannot cover its debit, so account 1's debit and account 3's
    // credit must not land either
    let err = ledger
        .transfer(&[(1, 100), (2, 100)], &[(3, 200)])
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            available: 50,
            required: 100
        }
    ));
    assert_eq!(ledger.balance(1).unwrap(), Some(1000));
    assert_eq!(ledger.balance(2).unwrap(), Some(50));
    assert_eq!(ledger.balance(3).unwrap(), None);
}

#[test]
fn test_transfer_debit_not_funded_by_same_transfer_credit() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    ledger.credit(1, 100).unwrap();
    // Account 2 holds nothing; the credit to it in the same transfer must not
    // be usable to cover its own debit
    let err = ledger
        .transfer(&[(2, 100)], &[(2, 100), (1, 100)])
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(ledger.balance(1).unwrap(), Some(100));
    assert_eq!(ledger.balance(2).unwrap(), None);
}

#[test]
fn test_transfer_aggregates_repeated_accounts() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    ledger.credit(1, 300).unwrap();
    ledger
        .transfer(&[(1, 100), (1, 100)], &[(2, 150), (2, 50)])
        .unwrap();

    assert_eq!(ledger.balance(1).unwrap(), Some(100));
    assert_eq!(ledger.balance(2).unwrap(), Some(200));
}

#[test]
fn test_transfer_rejects_zero_amount_legs() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    ledger.credit(1, 100).unwrap();
    assert!(matches!(
        ledger.transfer(&[(1, 0)], &[(2, 0)]).unwrap_err(),
        LedgerError::InvalidAmount
    ));
    assert_eq!(ledger.balance(1).unwrap(), Some(100));
}

#[test]
fn test_transfer_conserves_total_across_many_legs() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    for user in 1..=4u64 {
        ledger.credit(user, 250).unwrap();
    }
    // Three losers pay one winner, the settlement shape
    ledger
        .transfer(&[(1, 100), (2, 100), (3, 100)], &[(4, 300)])
        .unwrap();

    assert_eq!(ledger.balance(4).unwrap(), Some(550));
    assert_eq!(ledger.total_balance().unwrap(), 1000);
}
