// Wager module - POOLED-STAKE GAMES
// Ephemeral session state machine; settlement commits through the ledger

mod manager;
mod session;

pub use manager::{JoinOutcome, Settlement, WagerConfig, WagerError, WagerManager};
pub use session::{Participant, SessionId, SessionState, WagerKind, WagerSession};
