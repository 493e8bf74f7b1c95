// Deposit reconciler integration tests

mod reconciler_test;
