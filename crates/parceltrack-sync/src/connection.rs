//! Connection lifecycle state machine and reconnect backoff.
//!
//! `Idle → Connecting → Connected`; a transport failure from `Connecting`
//! or `Connected` passes through `Error` into `Disconnected`, and the
//! backoff policy decides whether (and when) to try `Connecting` again.
//! The machine only records state; the runtime owns sockets and timers.

use std::time::Duration;

use parceltrack_core::ConnectionState;
use serde::{Deserialize, Serialize};

// ─── Constants ───────────────────────────────────────────────────────

/// First retry delay after a failure.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on any single retry delay.
const DEFAULT_CEILING: Duration = Duration::from_secs(30);

const DEFAULT_FACTOR: u32 = 2;

// ─── Backoff ─────────────────────────────────────────────────────────

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub ceiling: Duration,
    /// `None` retries forever (at the ceiling cadence).
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            factor: DEFAULT_FACTOR,
            ceiling: DEFAULT_CEILING,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let multiplier = self.factor.max(1).saturating_pow(exp);
        self.base
            .checked_mul(multiplier)
            .unwrap_or(self.ceiling)
            .min(self.ceiling)
    }

    /// True once `failures` consecutive failures exhaust the attempt budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures > max)
    }
}

// ─── Transitions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// What the runtime should do after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    After { delay: Duration, attempt: u32 },
    GiveUp { failures: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opened {
    pub transition: Transition,
    /// The channel had been open at least once before this one.
    pub reconnected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failed {
    /// `→ Error` then `Error → Disconnected`.
    pub transitions: [Transition; 2],
    pub retry: Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub consecutive_failures: u32,
    pub max_attempts: Option<u32>,
    pub ever_connected: bool,
}

// ─── Machine ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
    policy: BackoffPolicy,
    consecutive_failures: u32,
    ever_connected: bool,
    retry_pending: bool,
}

impl ConnectionMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn move_to(&mut self, to: ConnectionState) -> Transition {
        let from = std::mem::replace(&mut self.state, to);
        Transition { from, to }
    }

    /// `connect()`: no-op while already connecting or connected.
    pub fn begin_connect(&mut self) -> Option<Transition> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => None,
            _ => {
                self.retry_pending = false;
                Some(self.move_to(ConnectionState::Connecting))
            }
        }
    }

    /// Handshake completed. Only meaningful from `Connecting`.
    pub fn on_open(&mut self) -> Option<Opened> {
        if self.state != ConnectionState::Connecting {
            return None;
        }
        let reconnected = self.ever_connected;
        self.ever_connected = true;
        self.consecutive_failures = 0;
        Some(Opened {
            transition: self.move_to(ConnectionState::Connected),
            reconnected,
        })
    }

    /// Transport drop or handshake failure.
    pub fn on_failure(&mut self) -> Option<Failed> {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return None;
        }
        let to_error = self.move_to(ConnectionState::Error);
        let to_disconnected = self.move_to(ConnectionState::Disconnected);

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let failures = self.consecutive_failures;
        let retry = if self.policy.exhausted(failures) {
            self.retry_pending = false;
            Retry::GiveUp { failures }
        } else {
            self.retry_pending = true;
            Retry::After {
                delay: self.policy.delay_for(failures),
                attempt: failures,
            }
        };
        Some(Failed {
            transitions: [to_error, to_disconnected],
            retry,
        })
    }

    /// A scheduled retry came due. Ignored if it was superseded by a manual
    /// disconnect, reconnect or teardown.
    pub fn on_retry_due(&mut self) -> Option<Transition> {
        if !self.retry_pending || self.state != ConnectionState::Disconnected {
            return None;
        }
        self.begin_connect()
    }

    /// Manual disconnect: no retry is scheduled.
    pub fn disconnect(&mut self) -> Option<Transition> {
        self.retry_pending = false;
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected => None,
            _ => Some(self.move_to(ConnectionState::Disconnected)),
        }
    }

    pub fn reset_attempts(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Back to `Idle` with a fresh attempt budget.
    pub fn teardown(&mut self) -> Option<Transition> {
        self.retry_pending = false;
        self.consecutive_failures = 0;
        (self.state != ConnectionState::Idle).then(|| self.move_to(ConnectionState::Idle))
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            max_attempts: self.policy.max_attempts,
            ever_connected: self.ever_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn backoff_schedule_doubles_to_ceiling() {
        let policy = BackoffPolicy::default();
        let delays: Vec<_> = (1..=7).map(|a| policy.delay_for(a)).collect();
        assert_eq!(
            delays,
            vec![secs(1), secs(2), secs(4), secs(8), secs(16), secs(30), secs(30)]
        );
        // Large attempt counts must not overflow.
        assert_eq!(policy.delay_for(u32::MAX), secs(30));
    }

    #[test]
    fn backoff_exhaustion() {
        let unlimited = BackoffPolicy::default();
        assert!(!unlimited.exhausted(10_000));

        let capped = BackoffPolicy {
            max_attempts: Some(5),
            ..BackoffPolicy::default()
        };
        assert!(!capped.exhausted(5));
        assert!(capped.exhausted(6));
    }

    #[test]
    fn connect_is_idempotent() {
        let mut m = ConnectionMachine::default();
        assert_eq!(
            m.begin_connect(),
            Some(Transition {
                from: Idle,
                to: Connecting
            })
        );
        assert_eq!(m.begin_connect(), None);
        m.on_open().expect("opened");
        assert_eq!(m.begin_connect(), None);
        assert_eq!(m.state(), Connected);
    }

    #[test]
    fn first_open_is_not_a_reconnect() {
        let mut m = ConnectionMachine::default();
        m.begin_connect();
        let opened = m.on_open().expect("opened");
        assert!(!opened.reconnected);

        m.on_failure().expect("failed");
        m.on_retry_due().expect("retrying");
        let opened = m.on_open().expect("opened");
        assert!(opened.reconnected);
    }

    #[test]
    fn failure_passes_through_error() {
        let mut m = ConnectionMachine::default();
        m.begin_connect();
        m.on_open();
        let failed = m.on_failure().expect("failed");
        assert_eq!(
            failed.transitions,
            [
                Transition {
                    from: Connected,
                    to: Error
                },
                Transition {
                    from: Error,
                    to: Disconnected
                },
            ]
        );
        assert_eq!(
            failed.retry,
            Retry::After {
                delay: secs(1),
                attempt: 1
            }
        );
        assert_eq!(m.state(), Disconnected);
    }

    #[test]
    fn failure_outside_active_states_is_ignored() {
        let mut m = ConnectionMachine::default();
        assert!(m.on_failure().is_none());
        assert_eq!(m.state(), Idle);
    }

    #[test]
    fn consecutive_failures_back_off_and_reset_on_open() {
        let mut m = ConnectionMachine::default();
        m.begin_connect();
        for expected in [1, 2, 4, 8] {
            let failed = m.on_failure().expect("failed");
            assert_eq!(
                failed.retry,
                Retry::After {
                    delay: secs(expected),
                    attempt: m.stats().consecutive_failures
                }
            );
            m.on_retry_due().expect("retrying");
        }
        m.on_open();
        assert_eq!(m.stats().consecutive_failures, 0);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut m = ConnectionMachine::new(BackoffPolicy {
            max_attempts: Some(2),
            ..BackoffPolicy::default()
        });
        m.begin_connect();
        assert!(matches!(
            m.on_failure().expect("failed").retry,
            Retry::After { attempt: 1, .. }
        ));
        m.on_retry_due();
        assert!(matches!(
            m.on_failure().expect("failed").retry,
            Retry::After { attempt: 2, .. }
        ));
        m.on_retry_due();
        assert_eq!(
            m.on_failure().expect("failed").retry,
            Retry::GiveUp { failures: 3 }
        );
        assert_eq!(m.on_retry_due(), None);
        assert_eq!(m.state(), Disconnected);
    }

    #[test]
    fn manual_disconnect_cancels_pending_retry() {
        let mut m = ConnectionMachine::default();
        m.begin_connect();
        m.on_failure();
        assert_eq!(m.disconnect(), None, "already disconnected");
        assert_eq!(m.on_retry_due(), None);

        // An explicit connect still works.
        assert!(m.begin_connect().is_some());
    }

    #[test]
    fn manual_disconnect_from_connected() {
        let mut m = ConnectionMachine::default();
        m.begin_connect();
        m.on_open();
        assert_eq!(
            m.disconnect(),
            Some(Transition {
                from: Connected,
                to: Disconnected
            })
        );
    }

    #[test]
    fn teardown_returns_to_idle() {
        let mut m = ConnectionMachine::default();
        m.begin_connect();
        m.on_failure();
        let t = m.teardown().expect("transition");
        assert_eq!(t.to, Idle);
        assert_eq!(m.stats().consecutive_failures, 0);
        assert_eq!(m.on_retry_due(), None);
        assert_eq!(m.teardown(), None);
    }

    #[test]
    fn stale_open_is_ignored() {
        let mut m = ConnectionMachine::default();
        assert!(m.on_open().is_none());
        m.begin_connect();
        m.disconnect();
        assert!(m.on_open().is_none());
    }
}
