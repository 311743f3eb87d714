use crate::alerts::{classify, Classification};
use crate::model::{Reading, StoredReading};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Rolling client-side history, matching the history hydration size.
pub const WINDOW_CAPACITY: usize = 100;

/// How long a denied session lingers before teardown, giving the user time
/// to read the error before being bounced to login.
pub const AUTH_FAILURE_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authorizing,
    Subscribing,
    Subscribed,
    Closed,
}

/// Inputs fed to the session by its embedder (socket events, collaborator
/// responses).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Start { token: String },
    AuthorizationGranted,
    AuthorizationDenied,
    HistoryLoaded(Vec<StoredReading>),
    ReadingReceived(StoredReading),
    TransportClosed,
}

/// Effects the embedder must carry out. The session itself performs no IO.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Authorize { token: String },
    FetchHistory { limit: usize },
    AnnounceViewer,
    DiscardCredential,
    Teardown { grace: Duration },
    RaiseAlert(Classification),
}

/// Per-connection state machine for a dashboard viewer:
/// `Unauthenticated → Authorizing → Subscribing → Subscribed → Closed`.
///
/// Holds the rolling window of the last [`WINDOW_CAPACITY`] readings and the
/// classification of the newest one. `Closed` is terminal; reconnection means
/// constructing a fresh session (see [`ReconnectPolicy`]).
pub struct ViewerSession {
    state: SessionState,
    window: VecDeque<StoredReading>,
    // Live readings that raced the history response.
    pending: Vec<StoredReading>,
    latest: Option<Classification>,
}

impl ViewerSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            window: VecDeque::with_capacity(WINDOW_CAPACITY),
            pending: Vec::new(),
            latest: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn window(&self) -> &VecDeque<StoredReading> {
        &self.window
    }

    /// Classification of the newest reading, if any reading has arrived.
    pub fn latest_classification(&self) -> Option<Classification> {
        self.latest
    }

    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionCommand> {
        match (self.state, event) {
            (SessionState::Unauthenticated, SessionEvent::Start { token }) => {
                self.state = SessionState::Authorizing;
                vec![SessionCommand::Authorize { token }]
            }
            (SessionState::Authorizing, SessionEvent::AuthorizationGranted) => {
                self.state = SessionState::Subscribing;
                vec![
                    SessionCommand::FetchHistory {
                        limit: WINDOW_CAPACITY,
                    },
                    SessionCommand::AnnounceViewer,
                ]
            }
            (SessionState::Authorizing, SessionEvent::AuthorizationDenied) => {
                self.state = SessionState::Closed;
                vec![
                    SessionCommand::DiscardCredential,
                    SessionCommand::Teardown {
                        grace: AUTH_FAILURE_GRACE,
                    },
                ]
            }
            (SessionState::Subscribing, SessionEvent::HistoryLoaded(rows)) => {
                self.state = SessionState::Subscribed;
                self.window.clear();
                let skip = rows.len().saturating_sub(WINDOW_CAPACITY);
                for row in rows.into_iter().skip(skip) {
                    self.push(row);
                }
                let mut commands = Vec::new();
                for row in std::mem::take(&mut self.pending) {
                    if let Some(alert) = self.push(row) {
                        commands.push(alert);
                    }
                }
                commands
            }
            (SessionState::Subscribing, SessionEvent::ReadingReceived(row)) => {
                self.pending.push(row);
                Vec::new()
            }
            (SessionState::Subscribed, SessionEvent::ReadingReceived(row)) => {
                self.push(row).into_iter().collect()
            }
            (
                SessionState::Authorizing
                | SessionState::Subscribing
                | SessionState::Subscribed,
                SessionEvent::TransportClosed,
            ) => {
                self.state = SessionState::Closed;
                Vec::new()
            }
            (state, event) => {
                debug!(?state, ?event, "session event ignored");
                Vec::new()
            }
        }
    }

    fn push(&mut self, row: StoredReading) -> Option<SessionCommand> {
        if self.window.len() == WINDOW_CAPACITY {
            self.window.pop_front();
        }
        let classification = classify(&row.reading);
        self.window.push_back(row);
        self.latest = Some(classification);
        classification
            .danger()
            .then(|| SessionCommand::RaiseAlert(classification))
    }
}

impl Default for ViewerSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconnect policy for a closed viewer transport. Each permitted attempt
/// builds a brand-new session, re-running authorization and history
/// hydration from scratch; nothing from the dead session is reused.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based), or `None` once
    /// the attempt budget is spent.
    pub fn backoff_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt);
        Some(
            self.initial_backoff
                .saturating_mul(factor)
                .min(self.max_backoff),
        )
    }
}

/// Min/max/avg summary over the structural metrics of a window; input for
/// the external chart layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

pub fn metric_stats<'a, I, F>(rows: I, metric: F) -> Option<MetricStats>
where
    I: IntoIterator<Item = &'a StoredReading>,
    F: Fn(&Reading) -> Option<f64>,
{
    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for row in rows {
        if let Some(v) = metric(&row.reading) {
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
    }
    (count > 0).then(|| MetricStats {
        min,
        max,
        avg: sum / count as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Reading, StructuralReading};
    use chrono::{TimeZone, Utc};

    fn stored(seq: i64, vibration_x: f64) -> StoredReading {
        StoredReading {
            seq,
            reading: Reading::Structural(StructuralReading {
                device_id: "shm-node-alpha-01".to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                location: "bridge-span-north".to_string(),
                vibration_x,
                vibration_y: 0.0,
                vibration_z: 1.0,
                temperature_c: 25.0,
                humidity_percent: 50.0,
                battery_voltage: 3.8,
                error_code: 0,
            }),
        }
    }

    fn subscribed_session() -> ViewerSession {
        let mut session = ViewerSession::new();
        session.handle(SessionEvent::Start {
            token: "tok".to_string(),
        });
        session.handle(SessionEvent::AuthorizationGranted);
        session.handle(SessionEvent::HistoryLoaded(Vec::new()));
        assert_eq!(session.state(), SessionState::Subscribed);
        session
    }

    #[test]
    fn test_happy_path_commands() {
        let mut session = ViewerSession::new();

        let commands = session.handle(SessionEvent::Start {
            token: "tok".to_string(),
        });
        assert_eq!(
            commands,
            vec![SessionCommand::Authorize {
                token: "tok".to_string()
            }]
        );
        assert_eq!(session.state(), SessionState::Authorizing);

        let commands = session.handle(SessionEvent::AuthorizationGranted);
        assert_eq!(
            commands,
            vec![
                SessionCommand::FetchHistory { limit: 100 },
                SessionCommand::AnnounceViewer,
            ]
        );
        assert_eq!(session.state(), SessionState::Subscribing);

        session.handle(SessionEvent::HistoryLoaded(vec![stored(1, 0.0)]));
        assert_eq!(session.state(), SessionState::Subscribed);
        assert_eq!(session.window().len(), 1);
    }

    #[test]
    fn test_denial_closes_and_never_subscribes() {
        let mut session = ViewerSession::new();
        session.handle(SessionEvent::Start {
            token: "bad".to_string(),
        });
        let commands = session.handle(SessionEvent::AuthorizationDenied);
        assert_eq!(
            commands,
            vec![
                SessionCommand::DiscardCredential,
                SessionCommand::Teardown {
                    grace: AUTH_FAILURE_GRACE
                },
            ]
        );
        assert_eq!(session.state(), SessionState::Closed);

        // Nothing is ever issued after the terminal state.
        assert!(session
            .handle(SessionEvent::AuthorizationGranted)
            .is_empty());
        assert!(session
            .handle(SessionEvent::ReadingReceived(stored(1, 0.0)))
            .is_empty());
        assert_eq!(session.window().len(), 0);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_window_is_a_ring_buffer_of_100() {
        let mut session = subscribed_session();
        for seq in 1..=150 {
            session.handle(SessionEvent::ReadingReceived(stored(seq, 0.0)));
        }
        assert_eq!(session.window().len(), WINDOW_CAPACITY);
        assert_eq!(session.window().front().unwrap().seq, 51);
        assert_eq!(session.window().back().unwrap().seq, 150);
    }

    #[test]
    fn test_dangerous_reading_raises_alert() {
        let mut session = subscribed_session();
        let commands = session.handle(SessionEvent::ReadingReceived(stored(1, 0.5)));
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], SessionCommand::RaiseAlert(c) if c.danger()));

        let commands = session.handle(SessionEvent::ReadingReceived(stored(2, 0.1)));
        assert!(commands.is_empty());
        assert!(!session.latest_classification().unwrap().danger());
    }

    #[test]
    fn test_readings_racing_hydration_are_replayed_in_order() {
        let mut session = ViewerSession::new();
        session.handle(SessionEvent::Start {
            token: "tok".to_string(),
        });
        session.handle(SessionEvent::AuthorizationGranted);

        session.handle(SessionEvent::ReadingReceived(stored(11, 0.0)));
        session.handle(SessionEvent::ReadingReceived(stored(12, 0.0)));

        session.handle(SessionEvent::HistoryLoaded(vec![stored(9, 0.0), stored(10, 0.0)]));
        let seqs: Vec<i64> = session.window().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![9, 10, 11, 12]);
    }

    #[test]
    fn test_oversized_hydration_is_truncated_to_window() {
        let mut session = ViewerSession::new();
        session.handle(SessionEvent::Start {
            token: "tok".to_string(),
        });
        session.handle(SessionEvent::AuthorizationGranted);
        let rows: Vec<StoredReading> = (1..=120).map(|seq| stored(seq, 0.0)).collect();
        session.handle(SessionEvent::HistoryLoaded(rows));
        assert_eq!(session.window().len(), WINDOW_CAPACITY);
        assert_eq!(session.window().front().unwrap().seq, 21);
    }

    #[test]
    fn test_transport_close_is_terminal() {
        let mut session = subscribed_session();
        session.handle(SessionEvent::TransportClosed);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session
            .handle(SessionEvent::ReadingReceived(stored(1, 0.0)))
            .is_empty());
    }

    #[test]
    fn test_reconnect_backoff_schedule() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<Option<Duration>> = (0..7).map(|a| policy.backoff_for(a)).collect();
        assert_eq!(delays[0], Some(Duration::from_millis(500)));
        assert_eq!(delays[1], Some(Duration::from_secs(1)));
        assert_eq!(delays[2], Some(Duration::from_secs(2)));
        assert_eq!(delays[5], Some(Duration::from_secs(16)));
        assert_eq!(delays[6], None);
    }

    #[test]
    fn test_window_stats() {
        let mut session = subscribed_session();
        for (seq, vx) in [(1, 0.1), (2, 0.2), (3, 0.3)] {
            session.handle(SessionEvent::ReadingReceived(stored(seq, vx)));
        }
        let stats = metric_stats(session.window(), |r| match r {
            Reading::Structural(s) => Some(s.vibration_x),
            Reading::Environmental(_) => None,
        })
        .unwrap();
        assert!((stats.min - 0.1).abs() < 1e-9);
        assert!((stats.max - 0.3).abs() < 1e-9);
        assert!((stats.avg - 0.2).abs() < 1e-9);
    }
}
