// Wager session and settlement integration tests

mod session_test;
