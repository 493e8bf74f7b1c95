// Session lifecycle unit tests

use satflip::wager::{SessionId, SessionState, WagerKind, WagerSession};
use std::time::Duration;

#[test]
fn test_session_id_display() {
    let id = SessionId::new(-100123, 42);
    assert_eq!(id.to_string(), "-100123:42");
}

#[test]
fn test_min_targets_per_kind() {
    assert_eq!(WagerKind::Pooled.min_target(), 2);
    assert_eq!(WagerKind::Sponsored.min_target(), 1);
}

#[test]
fn test_state_transitions_are_one_way() {
    assert!(SessionState::Open.can_transition_to(SessionState::Settled));
    assert!(SessionState::Open.can_transition_to(SessionState::Cancelled));

    // Terminal states never re-open or cross over
    assert!(!SessionState::Settled.can_transition_to(SessionState::Open));
    assert!(!SessionState::Settled.can_transition_to(SessionState::Cancelled));
    assert!(!SessionState::Cancelled.can_transition_to(SessionState::Open));
    assert!(!SessionState::Cancelled.can_transition_to(SessionState::Settled));

    assert!(!SessionState::Open.is_terminal());
    assert!(SessionState::Settled.is_terminal());
    assert!(SessionState::Cancelled.is_terminal());
}

#[test]
fn test_fullness_tracks_target() {
    let mut session = WagerSession::new(SessionId::new(1, 1), 10, 100, 2, WagerKind::Pooled);
    assert!(!session.is_full());
    session.participants.push(satflip::wager::Participant::new(10, "a"));
    assert!(!session.is_full());
    session.participants.push(satflip::wager::Participant::new(11, "b"));
    assert!(session.is_full());
    assert!(session.has_participant(10));
    assert!(!session.has_participant(12));
}

#[test]
fn test_fresh_session_not_expired_under_generous_ttl() {
    let session = WagerSession::new(SessionId::new(1, 1), 10, 100, 2, WagerKind::Pooled);
    assert!(!session.is_expired(Duration::from_secs(3600)));
}

#[test]
fn test_zero_ttl_expires_immediately() {
    let session = WagerSession::new(SessionId::new(1, 1), 10, 100, 2, WagerKind::Pooled);
    std::thread::sleep(Duration::from_millis(5));
    assert!(session.is_expired(Duration::ZERO));
}

#[test]
fn test_terminal_session_never_reports_expired() {
    let mut session = WagerSession::new(SessionId::new(1, 1), 10, 100, 2, WagerKind::Pooled);
    session.state = SessionState::Settled;
    std::thread::sleep(Duration::from_millis(5));
    assert!(!session.is_expired(Duration::ZERO));
}
