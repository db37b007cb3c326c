//! Session supervisor
//!
//! Consumes the transport event stream for every session, turns events into
//! notices and closes tabs whose transport has ended for good.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::event::TransportEvent;
use crate::manager::SessionManager;
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::session::SessionId;

/// Delay between a terminal failure and the tab closing
pub const AUTO_CLOSE_GRACE: Duration = Duration::from_millis(2_500);

pub struct Supervisor {
    manager: Arc<Mutex<SessionManager>>,
    notifier: Arc<dyn Notifier>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    grace: Duration,
    pending: HashMap<SessionId, Instant>,
    removed: Option<mpsc::UnboundedSender<SessionId>>,
}

impl Supervisor {
    pub fn new(
        manager: Arc<Mutex<SessionManager>>,
        notifier: Arc<dyn Notifier>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            manager,
            notifier,
            events,
            grace: AUTO_CLOSE_GRACE,
            pending: HashMap::new(),
            removed: None,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Report every session the supervisor auto-closes.
    pub fn with_removal_listener(mut self, tx: mpsc::UnboundedSender<SessionId>) -> Self {
        self.removed = Some(tx);
        self
    }

    /// Runs until every event sender is gone.
    pub async fn run(mut self) {
        loop {
            let next = self
                .pending
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(id, at)| (id.clone(), *at));
            let deadline = next
                .as_ref()
                .map(|(_, at)| *at)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                _ = sleep_until(deadline), if next.is_some() => {
                    if let Some((id, _)) = next {
                        self.pending.remove(&id);
                        self.auto_close(&id).await;
                    }
                }
            }
        }

        debug!(
            component = "supervisor",
            event = "supervisor.stopped",
            "Event stream ended"
        );
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        let known = self.manager.lock().await.session(&event.session_id).is_some();
        if !known {
            debug!(
                component = "supervisor",
                event = "supervisor.event.orphaned",
                session_id = %event.session_id,
                "Ignoring event for a session that is gone"
            );
            return;
        }

        if let Some(notice) = Notice::from_event(&event) {
            self.notifier.notify(notice);
        }

        if event.kind.is_terminal_failure() && !self.pending.contains_key(&event.session_id) {
            info!(
                component = "supervisor",
                event = "supervisor.auto_close.scheduled",
                session_id = %event.session_id,
                grace_ms = self.grace.as_millis() as u64,
                "Scheduling tab close"
            );
            self.pending
                .insert(event.session_id, Instant::now() + self.grace);
        }
    }

    async fn auto_close(&mut self, id: &SessionId) {
        let removed = self.manager.lock().await.remove_session(id);
        let Some(session) = removed else {
            return;
        };

        info!(
            component = "supervisor",
            event = "supervisor.auto_close.done",
            session_id = %id,
            "Closed tab after transport ended"
        );
        self.notifier.notify(Notice {
            level: NoticeLevel::Info,
            text: format!("Closed {}", session.title),
        });
        if let Some(tx) = &self.removed {
            let _ = tx.send(id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use shellgate_protocol::{AuthMethod, HostConfig};

    use super::*;
    use crate::config::ServerUrl;
    use crate::connection::WebSocketDialer;
    use crate::event::{ErrorKind, TransportEventKind};
    use crate::manager::SessionTransport;
    use crate::transition::TransportConfig;
    use crate::transport::TransportContext;

    #[derive(Default)]
    struct RecordingNotifier(std::sync::Mutex<Vec<Notice>>);

    impl RecordingNotifier {
        fn texts(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|n| n.text.clone()).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.0.lock().unwrap().push(notice);
        }
    }

    struct CountingTransport(Arc<AtomicUsize>);

    impl SessionTransport for CountingTransport {
        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        manager: Arc<Mutex<SessionManager>>,
        notifier: Arc<RecordingNotifier>,
        events: mpsc::UnboundedSender<TransportEvent>,
        removed: mpsc::UnboundedReceiver<SessionId>,
        closes: Arc<AtomicUsize>,
        session: SessionId,
    }

    async fn harness() -> Harness {
        let (events, rx) = mpsc::unbounded_channel();
        let mut manager = SessionManager::new(TransportContext {
            dialer: Arc::new(WebSocketDialer),
            endpoint: Arc::new(ServerUrl::new(None)),
            events: events.clone(),
            config: TransportConfig::default(),
        });
        let session = manager.add_session(HostConfig {
            id: 7,
            name: "web".to_string(),
            address: "10.0.0.5".to_string(),
            port: 22,
            username: "deploy".to_string(),
            auth: AuthMethod::Password {
                password: "pw".to_string(),
            },
        });
        let closes = Arc::new(AtomicUsize::new(0));
        manager.attach_transport(&session, Box::new(CountingTransport(Arc::clone(&closes))));

        let manager = Arc::new(Mutex::new(manager));
        let notifier = Arc::new(RecordingNotifier::default());
        let (removed_tx, removed) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(
            Arc::clone(&manager),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            rx,
        )
        .with_removal_listener(removed_tx);
        tokio::spawn(supervisor.run());

        Harness {
            manager,
            notifier,
            events,
            removed,
            closes,
            session,
        }
    }

    fn event(session: &SessionId, kind: TransportEventKind) -> TransportEvent {
        TransportEvent {
            session_id: session.clone(),
            host_name: "web".to_string(),
            kind,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn max_retries_closes_tab_after_grace() {
        let mut h = harness().await;
        h.events
            .send(event(
                &h.session,
                TransportEventKind::MaxRetriesReached { max_attempts: 3 },
            ))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_400)).await;
        assert_eq!(h.manager.lock().await.len(), 1);
        assert_eq!(h.closes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.manager.lock().await.is_empty());
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.removed.recv().await, Some(h.session.clone()));

        let texts = h.notifier.texts();
        assert_eq!(texts[0], "Could not reconnect to web after 3 attempts");
        assert_eq!(texts.last().map(String::as_str), Some("Closed web"));
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_error_and_remote_disconnect_are_terminal() {
        let h = harness().await;
        h.events
            .send(event(
                &h.session,
                TransportEventKind::Error {
                    kind: ErrorKind::Configuration,
                    message: "no gateway server URL configured".to_string(),
                },
            ))
            .unwrap();
        // A second terminal event must not schedule a second close.
        h.events
            .send(event(
                &h.session,
                TransportEventKind::Disconnected {
                    reason: Some("session ended".to_string()),
                },
            ))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.manager.lock().await.is_empty());
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.notifier
                .texts()
                .iter()
                .filter(|t| t.starts_with("Closed"))
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_events_only_notify() {
        let h = harness().await;
        for kind in [
            TransportEventKind::Connecting { attempt: 0 },
            TransportEventKind::Retrying {
                attempt: 1,
                max_attempts: 3,
                delay: Duration::from_secs(2),
            },
            TransportEventKind::Error {
                kind: ErrorKind::Timeout,
                message: "connection timeout".to_string(),
            },
            TransportEventKind::Debug {
                message: "handshake sent".to_string(),
            },
        ] {
            h.events.send(event(&h.session, kind)).unwrap();
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.manager.lock().await.len(), 1);
        assert_eq!(h.notifier.texts().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn events_for_removed_sessions_are_ignored() {
        let h = harness().await;
        h.manager.lock().await.remove_session(&h.session);
        h.events
            .send(event(
                &h.session,
                TransportEventKind::MaxRetriesReached { max_attempts: 3 },
            ))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.notifier.texts().is_empty());
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    }
}
