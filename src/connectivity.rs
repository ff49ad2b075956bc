//! Low-level network reachability tracking.
//!
//! The monitor is the only writer of [`ConnectivityState`]. Host path-change
//! notifications (or the built-in polling task) feed [`ConnectivityMonitor::report`],
//! and listeners receive edge-triggered [`ConnectivityEvent`]s: one per
//! transition, never one per status tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const EVENT_CAPACITY: usize = 16;

/// Status of the host's network path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    Satisfied,
    Unsatisfied,
    RequiresConnection,
}

impl PathStatus {
    pub fn is_usable(self) -> bool {
        matches!(self, PathStatus::Satisfied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub reachable: bool,
    pub last_changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    BecameReachable,
    BecameUnreachable,
}

/// Source of path status for the polling task
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn check(&self) -> PathStatus;
}

/// Treats a successful TCP connect to a well-known address as a usable path
pub struct TcpReachability {
    address: String,
    timeout: Duration,
}

impl TcpReachability {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReachabilityCheck for TcpReachability {
    async fn check(&self) -> PathStatus {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => PathStatus::Satisfied,
            Ok(Err(e)) => {
                tracing::debug!(address = %self.address, "Reachability check failed: {}", e);
                PathStatus::Unsatisfied
            }
            Err(_) => {
                tracing::debug!(address = %self.address, "Reachability check timed out");
                PathStatus::Unsatisfied
            }
        }
    }
}

pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    /// Starts unreachable; the first usable report raises `BecameReachable`.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectivityState {
            reachable: false,
            last_changed_at: Utc::now(),
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { state, events }
    }

    pub fn is_reachable(&self) -> bool {
        self.state.borrow().reachable
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Each subscriber sees every transition once, in order. A subscriber
    /// that falls more than the channel capacity behind gets `Lagged` and
    /// should re-read [`ConnectivityMonitor::state`].
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Record a path update, returning the transition it caused, if any
    pub fn report(&self, status: PathStatus) -> Option<ConnectivityEvent> {
        let reachable = status.is_usable();
        let mut transition = None;

        self.state.send_if_modified(|current| {
            if current.reachable == reachable {
                return false;
            }
            current.reachable = reachable;
            current.last_changed_at = Utc::now();
            transition = Some(if reachable {
                ConnectivityEvent::BecameReachable
            } else {
                ConnectivityEvent::BecameUnreachable
            });
            true
        });

        if let Some(event) = transition {
            tracing::info!(?status, "Network {}", if reachable { "connected" } else { "disconnected" });
            // No subscribers is fine
            let _ = self.events.send(event);
        }
        transition
    }

    /// Poll `check` every `interval` on a background task. The task ends
    /// once the monitor is dropped.
    pub fn spawn(
        self: &Arc<Self>,
        check: Arc<dyn ReachabilityCheck>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = check.check().await;
                match monitor.upgrade() {
                    Some(monitor) => {
                        monitor.report(status);
                    }
                    None => break,
                }
            }
            tracing::debug!("Connectivity polling stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_only_satisfied_is_usable() {
        assert!(PathStatus::Satisfied.is_usable());
        assert!(!PathStatus::Unsatisfied.is_usable());
        assert!(!PathStatus::RequiresConnection.is_usable());
    }

    #[tokio::test]
    async fn test_events_are_edge_triggered() {
        let monitor = ConnectivityMonitor::new();
        let mut events = monitor.subscribe();
        assert!(!monitor.is_reachable());

        assert_eq!(
            monitor.report(PathStatus::Satisfied),
            Some(ConnectivityEvent::BecameReachable)
        );
        assert_eq!(monitor.report(PathStatus::Satisfied), None);
        assert_eq!(monitor.report(PathStatus::Satisfied), None);
        assert!(monitor.is_reachable());

        assert_eq!(
            monitor.report(PathStatus::RequiresConnection),
            Some(ConnectivityEvent::BecameUnreachable)
        );
        assert_eq!(monitor.report(PathStatus::Unsatisfied), None);

        assert_eq!(events.recv().await.unwrap(), ConnectivityEvent::BecameReachable);
        assert_eq!(events.recv().await.unwrap(), ConnectivityEvent::BecameUnreachable);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_last_changed_only_moves_on_transition() {
        let monitor = ConnectivityMonitor::new();
        monitor.report(PathStatus::Satisfied);
        let changed = monitor.state().last_changed_at;
        monitor.report(PathStatus::Satisfied);
        assert_eq!(monitor.state().last_changed_at, changed);
    }

    #[tokio::test]
    async fn test_polling_task_reports_status() {
        let mut check = MockReachabilityCheck::new();
        check.expect_check().returning(|| PathStatus::Satisfied);

        let monitor = Arc::new(ConnectivityMonitor::new());
        let mut events = monitor.subscribe();
        let handle = monitor.spawn(Arc::new(check), Duration::from_millis(10));

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no event from polling task")
            .unwrap();
        assert_eq!(event, ConnectivityEvent::BecameReachable);
        assert!(monitor.is_reachable());
        handle.abort();
    }

    #[tokio::test]
    async fn test_tcp_reachability() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let check = TcpReachability::new(addr.clone(), Duration::from_secs(1));
        assert_eq!(check.check().await, PathStatus::Satisfied);

        drop(listener);
        assert_eq!(check.check().await, PathStatus::Unsatisfied);
    }
}
