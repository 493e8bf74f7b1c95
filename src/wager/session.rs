// Wager session types and lifecycle

use crate::ledger::UserId;
use std::fmt;
use std::time::{Duration, Instant};

/// Session identity: the originating context (e.g. chat id) plus the
/// creation message id, unique together
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId {
    pub chat: i64,
    pub msg: i64,
}

impl SessionId {
    pub fn new(chat: i64, msg: i64) -> Self {
        Self { chat, msg }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat, self.msg)
    }
}

/// How a wager is funded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WagerKind {
    /// Every participant stakes equally; the winner takes the sum of all
    /// other participants' stakes ("coinflip")
    Pooled,
    /// Only the creator funds the prize; participants risk nothing and one
    /// receives the prize ("giveflip")
    Sponsored,
}

impl WagerKind {
    /// Smallest meaningful target participant count for this kind
    pub fn min_target(&self) -> usize {
        match self {
            Self::Pooled => 2,
            Self::Sponsored => 1,
        }
    }
}

/// Session lifecycle state. Transitions are one-way: terminal states never
/// re-enter Open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Settled,
    Cancelled,
}

impl SessionState {
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Settled) | (Self::Open, Self::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// A joined account with its display label. The label is cosmetic only and
/// never affects settlement math.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub user: UserId,
    pub label: String,
}

impl Participant {
    pub fn new(user: UserId, label: &str) -> Self {
        Self {
            user,
            label: label.to_string(),
        }
    }
}

/// One pooled-stake game instance
#[derive(Clone, Debug)]
pub struct WagerSession {
    pub id: SessionId,
    pub creator: UserId,
    pub stake_sats: u64,
    pub target: usize,
    pub kind: WagerKind,
    pub participants: Vec<Participant>,
    pub state: SessionState,
    created_at: Instant,
}

impl WagerSession {
    pub fn new(id: SessionId, creator: UserId, stake_sats: u64, target: usize, kind: WagerKind) -> Self {
        Self {
            id,
            creator,
            stake_sats,
            target,
            kind,
            participants: Vec::new(),
            state: SessionState::Open,
            created_at: Instant::now(),
        }
    }

    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.user == user)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.target
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.state == SessionState::Open && self.created_at.elapsed() > ttl
    }
}
