// WagerManager - owns the active-session table and the settlement path
//
// All mutation goes through one tokio Mutex, so two near-simultaneous joins
// can never both complete the group or seat the same account twice, and a
// full session settles exactly once. The table is process-local; a single
// running instance is assumed.

use crate::ledger::{LedgerError, LedgerStore, UserId};
use crate::wager::session::{
    Participant, SessionId, SessionState, WagerKind, WagerSession,
};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// Errors from wager operations
#[derive(Error, Debug)]
pub enum WagerError {
    #[error("Stake must be a positive number of satoshis")]
    InvalidStake,

    #[error("Target count {target} is below the minimum {min} for this wager kind")]
    TargetTooSmall { target: usize, min: usize },

    #[error("A session with id {id} already exists")]
    DuplicateSession { id: SessionId },

    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("Already joined this session")]
    AlreadyJoined,

    #[error("Only the session creator may cancel it")]
    NotCreator,

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Payout would overflow")]
    PayoutOverflow,

    #[error("Ledger failure: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for WagerError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                available,
                required,
            } => WagerError::InsufficientFunds {
                available,
                required,
            },
            other => WagerError::Ledger(other),
        }
    }
}

/// Configuration for the session manager
#[derive(Clone, Debug)]
pub struct WagerConfig {
    /// How long an Open session accepts joins
    pub ttl: Duration,
    /// Whether the creator of a Pooled session is seated as its first
    /// participant (the target count then includes the creator). Sponsored
    /// creators are never participants.
    pub creator_participates: bool,
}

impl Default for WagerConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(15 * 60),
            creator_participates: true,
        }
    }
}

impl WagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_creator_participates(mut self, participates: bool) -> Self {
        self.creator_participates = participates;
        self
    }
}

/// Result of a join that did not error
#[derive(Clone, Debug)]
pub enum JoinOutcome {
    /// Seat taken; the session stays open
    Joined { joined: usize, target: usize },
    /// The join completed the group and settlement ran
    Settled(Settlement),
}

/// Outcome of a settlement run
#[derive(Clone, Debug)]
pub enum Settlement {
    /// Funds moved atomically; one winner was drawn uniformly at random
    Paid {
        winner: Participant,
        payout_sats: u64,
        stake_sats: u64,
        participants: usize,
    },
    /// A required account could no longer cover its stake at trigger time.
    /// No balance was mutated; the session is dropped as settled-without-
    /// payout, a failed game rather than a retryable error.
    Shortfall { user: UserId },
}

/// Manager for the active wager sessions of a single running instance
pub struct WagerManager {
    ledger: Arc<LedgerStore>,
    config: WagerConfig,
    sessions: Mutex<HashMap<SessionId, WagerSession>>,
}

impl WagerManager {
    pub fn new(ledger: Arc<LedgerStore>, config: WagerConfig) -> Self {
        Self {
            ledger,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn available(&self, user: UserId) -> Result<u64, WagerError> {
        Ok(self.ledger.balance(user)?.unwrap_or(0))
    }

    fn require_stake(&self, user: UserId, stake: u64) -> Result<(), WagerError> {
        let available = self.available(user)?;
        if available < stake {
            return Err(WagerError::InsufficientFunds {
                available,
                required: stake,
            });
        }
        Ok(())
    }

    /// Open a new session.
    ///
    /// Sponsored creation requires the creator to cover the prize; Pooled
    /// creation never pre-charges, but a participating creator must pass the
    /// same balance check a joiner would.
    pub async fn create(
        &self,
        id: SessionId,
        creator: UserId,
        creator_label: &str,
        stake_sats: u64,
        target: usize,
        kind: WagerKind,
    ) -> Result<(), WagerError> {
        if stake_sats == 0 {
            return Err(WagerError::InvalidStake);
        }
        let min = kind.min_target();
        if target < min {
            return Err(WagerError::TargetTooSmall { target, min });
        }
        match kind {
            WagerKind::Sponsored => self.require_stake(creator, stake_sats)?,
            WagerKind::Pooled if self.config.creator_participates => {
                self.require_stake(creator, stake_sats)?
            }
            WagerKind::Pooled => {}
        }

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&id) {
            return Err(WagerError::DuplicateSession { id });
        }
        let mut session = WagerSession::new(id, creator, stake_sats, target, kind);
        if kind == WagerKind::Pooled && self.config.creator_participates {
            session.participants.push(Participant::new(creator, creator_label));
        }
        info!(
            session = %id,
            creator,
            stake_sats,
            target,
            kind = ?kind,
            "wager session opened"
        );
        sessions.insert(id, session);
        Ok(())
    }

    /// Join an open session. Reaching the target count runs settlement
    /// synchronously before returning.
    ///
    /// A join that finds the session past its TTL lazily cancels it and
    /// reports Expired; no funds move.
    pub async fn join(
        &self,
        id: SessionId,
        user: UserId,
        label: &str,
    ) -> Result<JoinOutcome, WagerError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or(WagerError::NotFound)?;

        if session.is_expired(self.config.ttl) {
            session.state = SessionState::Cancelled;
            sessions.remove(&id);
            info!(session = %id, "session expired at join; cancelled");
            return Err(WagerError::Expired);
        }
        if session.has_participant(user) {
            return Err(WagerError::AlreadyJoined);
        }
        if session.kind == WagerKind::Pooled {
            let available = self.ledger.balance(user)?.unwrap_or(0);
            if available < session.stake_sats {
                return Err(WagerError::InsufficientFunds {
                    available,
                    required: session.stake_sats,
                });
            }
        }

        session.participants.push(Participant::new(user, label));
        if !session.is_full() {
            return Ok(JoinOutcome::Joined {
                joined: session.participants.len(),
                target: session.target,
            });
        }

        // Target reached: settle exactly once and drop the session from the
        // active set whatever the outcome
        let mut session = sessions.remove(&id).ok_or(WagerError::NotFound)?;
        session.state = SessionState::Settled;
        let settlement = self.settle(&session)?;
        Ok(JoinOutcome::Settled(settlement))
    }

    /// Cancel an open session. Only the creator may cancel; no funds move
    /// (stakes are never escrowed before settlement).
    pub async fn cancel(&self, id: SessionId, user: UserId) -> Result<(), WagerError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or(WagerError::NotFound)?;
        if session.creator != user {
            return Err(WagerError::NotCreator);
        }
        session.state = SessionState::Cancelled;
        sessions.remove(&id);
        info!(session = %id, user, "wager session cancelled");
        Ok(())
    }

    /// Cancel every Open session past its TTL. Lazy expiry on join still
    /// applies between sweeps; this keeps abandoned sessions from lingering.
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(self.config.ttl))
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            if let Some(mut session) = sessions.remove(id) {
                session.state = SessionState::Cancelled;
                info!(session = %id, "expired session swept");
            }
        }
        expired.len()
    }

    /// Snapshot of an active session, if present
    pub async fn session(&self, id: SessionId) -> Option<WagerSession> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Number of sessions currently open
    pub async fn open_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Re-verify funds at trigger time, draw the winner, and commit both
    /// payout shapes through the single atomic transfer primitive.
    fn settle(&self, session: &WagerSession) -> Result<Settlement, WagerError> {
        let stake = session.stake_sats;
        let n = session.participants.len();

        // Late funds check: balances may have drained since join
        let required: Vec<UserId> = match session.kind {
            WagerKind::Pooled => session.participants.iter().map(|p| p.user).collect(),
            WagerKind::Sponsored => vec![session.creator],
        };
        for user in &required {
            if self.available(*user)? < stake {
                info!(session = %session.id, user, "settlement aborted: funds shortfall");
                return Ok(Settlement::Shortfall { user: *user });
            }
        }

        let winner = session
            .participants
            .choose(&mut rand::thread_rng())
            .ok_or(WagerError::NotFound)?
            .clone();

        let (debits, credits, payout) = match session.kind {
            WagerKind::Pooled => {
                let payout = stake
                    .checked_mul((n - 1) as u64)
                    .ok_or(WagerError::PayoutOverflow)?;
                let debits: Vec<(UserId, u64)> = session
                    .participants
                    .iter()
                    .filter(|p| p.user != winner.user)
                    .map(|p| (p.user, stake))
                    .collect();
                (debits, vec![(winner.user, payout)], payout)
            }
            WagerKind::Sponsored => {
                (vec![(session.creator, stake)], vec![(winner.user, stake)], stake)
            }
        };

        match self.ledger.transfer(&debits, &credits) {
            Ok(()) => {}
            // A concurrent withdrawal can drain an account between the check
            // and the commit; the transfer applied nothing
            Err(LedgerError::InsufficientFunds { .. }) => {
                let offender = required
                    .iter()
                    .copied()
                    .find(|&user| matches!(self.available(user), Ok(b) if b < stake))
                    .unwrap_or(required[0]);
                info!(session = %session.id, user = offender, "settlement aborted: funds moved during commit");
                return Ok(Settlement::Shortfall { user: offender });
            }
            Err(other) => return Err(WagerError::Ledger(other)),
        }

        info!(
            session = %session.id,
            winner = winner.user,
            payout_sats = payout,
            participants = n,
            kind = ?session.kind,
            "wager settled"
        );
        Ok(Settlement::Paid {
            winner,
            payout_sats: payout,
            stake_sats: stake,
            participants: n,
        })
    }
}
