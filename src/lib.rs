// satflip - Custodial satoshi ledger with pooled-stake wager settlement
//
// Components, leaf-first:
// - ledger:   durable integer-satoshi accounting (sled)
// - wallet:   capability interface over the node's wallet RPC surface
// - deposit:  periodic reconciler crediting on-chain deposits exactly once
// - wager:    in-memory session state machine for pooled-stake games
// - withdraw: UTXO selection, fee handling, debit-on-broadcast
// - service:  the in-process command surface the front end calls

pub mod deposit;
pub mod ledger;
pub mod service;
pub mod wager;
pub mod wallet;
pub mod withdraw;

pub use service::Custodian;
