// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Session lifecycle state machine.
//!
//! All transitions run on one task that owns the session fields. Callers
//! talk to it through [`SessionController`]; registry answers come back as
//! messages tagged with the generation that requested them, and answers for
//! an older generation are dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Session, SessionMetadata, SessionState, SessionStatus};
use crate::bluetooth::ble_constants::SERVICE_UUID;
use crate::bluetooth::Advertiser;
use crate::display::{Display, DisplayEvent};
use crate::error::{RegistryError, SessionError};
use crate::handler::RequestHandler;
use crate::otp::OtpStore;
use crate::registry::RegistrySync;

/// Everything the controller drives.
pub struct ControllerParts {
    pub advertiser: Arc<dyn Advertiser>,
    pub registry: RegistrySync,
    pub display: Arc<dyn Display>,
    pub store: Arc<OtpStore>,
    pub handler: Arc<RequestHandler>,
    /// Interval of the background sweep while advertising.
    pub sweep_interval: Option<Duration>,
}

enum Command {
    Start {
        metadata: SessionMetadata,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Registry answer for a session creation request.
struct SessionCreated {
    generation: u64,
    result: Result<String, RegistryError>,
}

/// Handle to the session controller task.
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionController {
    /// Spawn the controller task. Must be called inside a tokio runtime.
    pub fn spawn(parts: ControllerParts) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (created_tx, created_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::idle());

        let task = ControllerTask {
            parts,
            commands: commands_rx,
            created_tx,
            created_rx,
            status_tx,
            state: SessionState::Idle,
            generation: 0,
            pending: None,
            session: None,
            sweeper: None,
        };
        tokio::spawn(task.run());

        Self {
            commands: commands_tx,
            status: status_rx,
        }
    }

    /// Begin a session. Returns once the request is accepted; the session
    /// becomes active after the registry has answered.
    pub async fn start(&self, metadata: SessionMetadata) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { metadata, reply }).await?;
        rx.await.map_err(|_| SessionError::ControllerClosed)?
    }

    /// Stop the current session, if any. Returns after cleanup.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| SessionError::ControllerClosed)
    }

    /// Stop any session and end the controller task.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| SessionError::ControllerClosed)
    }

    /// Current state and session.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until the controller reaches `state`.
    pub async fn wait_for_state(&self, state: SessionState) -> Result<SessionStatus, SessionError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| s.state == state)
            .await
            .map_err(|_| SessionError::ControllerClosed)?;
        Ok(status.clone())
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::ControllerClosed)
    }
}

struct ControllerTask {
    parts: ControllerParts,
    commands: mpsc::Receiver<Command>,
    created_tx: mpsc::UnboundedSender<SessionCreated>,
    created_rx: mpsc::UnboundedReceiver<SessionCreated>,
    status_tx: watch::Sender<SessionStatus>,
    state: SessionState,
    generation: u64,
    pending: Option<SessionMetadata>,
    session: Option<Session>,
    sweeper: Option<JoinHandle<()>>,
}

impl ControllerTask {
    async fn run(mut self) {
        debug!("Session controller started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Start { metadata, reply }) => {
                        let _ = reply.send(self.handle_start(metadata));
                    }
                    Some(Command::Stop { reply }) => {
                        self.handle_stop().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Shutdown { reply }) => {
                        self.handle_stop().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.handle_stop().await;
                        break;
                    }
                },
                Some(created) = self.created_rx.recv() => {
                    self.handle_session_created(created).await;
                }
            }
        }

        debug!("Session controller exited");
    }

    fn handle_start(&mut self, metadata: SessionMetadata) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            warn!("Start requested while {:?}", self.state);
            return Err(SessionError::AlreadyActive);
        }

        let metadata = match metadata.validated() {
            Ok(m) => m,
            Err(e) => {
                warn!("Rejected session start: {}", e);
                self.parts
                    .display
                    .notify(DisplayEvent::ValidationFailed(e.to_string()));
                return Err(e);
            }
        };

        info!(
            "Starting session: {}, period {}, room {}",
            metadata.class_name, metadata.period, metadata.room
        );

        self.generation += 1;
        let generation = self.generation;
        self.pending = Some(metadata.clone());
        self.set_state(SessionState::CreatingSession);

        let registry = self.parts.registry.clone();
        let created_tx = self.created_tx.clone();
        tokio::spawn(async move {
            let result = registry.create_session(&metadata).await;
            let _ = created_tx.send(SessionCreated { generation, result });
        });

        Ok(())
    }

    async fn handle_session_created(&mut self, created: SessionCreated) {
        if created.generation != self.generation || self.state != SessionState::CreatingSession {
            debug!(
                "Ignoring registry answer for superseded session (generation {})",
                created.generation
            );
            return;
        }

        let Some(metadata) = self.pending.take() else {
            return;
        };

        let session = match created.result {
            Ok(session_id) => {
                info!("Session registered with ID: {}", session_id);
                Session::registered(session_id, metadata)
            }
            Err(e) => {
                warn!("Session creation failed ({}), starting demo mode", e);
                let session = Session::demo(metadata);
                info!("Demo session ID: {}", session.session_id);
                session
            }
        };

        self.session = Some(session.clone());

        let payload = session.session_id.as_bytes().to_vec();
        match self.parts.advertiser.start(SERVICE_UUID, payload).await {
            Ok(()) => {
                info!("Beacon active for session {}", session.session_id);
                self.parts.handler.attach(session.session_id.clone());
                self.parts.display.notify(DisplayEvent::SessionActive {
                    session_id: session.session_id.clone(),
                    demo: session.demo,
                });
                self.set_state(SessionState::Advertising);
                self.start_sweeper();
            }
            Err(failure) => {
                error!("Advertising failed: {}", failure.reason());
                self.generation += 1;
                self.teardown().await;
                self.set_state(SessionState::Idle);
                self.parts
                    .display
                    .notify(DisplayEvent::AdvertiseFailed(failure));
            }
        }
    }

    async fn handle_stop(&mut self) {
        match self.state {
            SessionState::Idle => {
                debug!("Stop requested with no active session");
            }
            SessionState::CreatingSession | SessionState::Advertising => {
                info!("Stopping session");
                self.generation += 1;
                self.set_state(SessionState::Stopping);
                self.teardown().await;
                self.parts.display.notify(DisplayEvent::SessionInactive);
                self.set_state(SessionState::Idle);
                info!("Session stopped");
            }
            SessionState::Stopping => {}
        }
    }

    /// Release the radio, stop serving reads and forget all OTPs.
    async fn teardown(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        if self.session.take().is_some() {
            self.parts.advertiser.stop().await;
        }
        self.parts.handler.detach();
        self.parts.store.clear();
        self.pending = None;
    }

    fn start_sweeper(&mut self) {
        let Some(interval) = self.parts.sweep_interval else {
            return;
        };
        let store = self.parts.store.clone();
        let display = self.parts.display.clone();

        self.sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            let mut last_count = None;

            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    debug!("Swept {} expired OTP(s)", removed);
                }
                let count = store.size();
                if last_count != Some(count) {
                    display.notify(DisplayEvent::ActiveOtps(count));
                    last_count = Some(count);
                }
            }
        }));
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.status_tx.send_replace(SessionStatus {
            state,
            session: self.session.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RegistryConfig;
    use crate::error::{AdvertiseFailure, ReadError};
    use crate::handler::Endpoint;
    use crate::registry::Registry;
    use crate::session::DEMO_SESSION_PREFIX;
    use crate::testing::{FakeAdvertiser, FakeRegistry, RecordingDisplay};

    struct Fixture {
        controller: SessionController,
        advertiser: Arc<FakeAdvertiser>,
        display: Arc<RecordingDisplay>,
        store: Arc<OtpStore>,
        handler: Arc<RequestHandler>,
    }

    fn fixture_with(
        registry: Arc<dyn Registry>,
        advertiser: FakeAdvertiser,
        sweep_interval: Option<Duration>,
    ) -> Fixture {
        let config = RegistryConfig {
            timeout_secs: 1,
            ..Default::default()
        };
        let sync = RegistrySync::spawn(registry, &config);
        let advertiser = Arc::new(advertiser);
        let display = Arc::new(RecordingDisplay::default());
        let store = Arc::new(OtpStore::new());
        let handler = Arc::new(RequestHandler::new(
            store.clone(),
            sync.clone(),
            display.clone(),
        ));

        let controller = SessionController::spawn(ControllerParts {
            advertiser: advertiser.clone(),
            registry: sync,
            display: display.clone(),
            store: store.clone(),
            handler: handler.clone(),
            sweep_interval,
        });

        Fixture {
            controller,
            advertiser,
            display,
            store,
            handler,
        }
    }

    fn fixture(registry: FakeRegistry) -> Fixture {
        fixture_with(Arc::new(registry), FakeAdvertiser::default(), None)
    }

    fn metadata() -> SessionMetadata {
        SessionMetadata::new("CS101", "1", "A101", "T001")
    }

    #[tokio::test]
    async fn test_start_with_registry_id() {
        let f = fixture(FakeRegistry::succeeding("SES_9001"));

        f.controller.start(metadata()).await.unwrap();
        let status = f
            .controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();

        let session = status.session.unwrap();
        assert_eq!(session.session_id, "SES_9001");
        assert!(!session.demo);
        assert_eq!(
            f.advertiser.starts(),
            vec![(SERVICE_UUID, b"SES_9001".to_vec())]
        );
        assert!(f.display.events().contains(&DisplayEvent::SessionActive {
            session_id: "SES_9001".into(),
            demo: false,
        }));
        assert_eq!(f.handler.session_id().as_deref(), Some("SES_9001"));
    }

    #[tokio::test]
    async fn test_registry_failure_enters_demo_mode() {
        let f = fixture(FakeRegistry::failing());

        f.controller.start(metadata()).await.unwrap();
        let status = f
            .controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();

        let session = status.session.unwrap();
        assert!(session.demo);
        let suffix = session.session_id.strip_prefix(DEMO_SESSION_PREFIX).unwrap();
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_registry_timeout_enters_demo_mode() {
        let f = fixture(FakeRegistry::hanging());

        f.controller.start(metadata()).await.unwrap();
        let status = f
            .controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();

        let session = status.session.unwrap();
        assert!(session.session_id.starts_with(DEMO_SESSION_PREFIX));
        f.display
            .wait_for(|e| matches!(e, DisplayEvent::SessionActive { demo: true, .. }))
            .await;
    }

    #[tokio::test]
    async fn test_start_then_stop_leaves_idle_and_empty() {
        let f = fixture(FakeRegistry::succeeding("SES_9001"));

        f.controller.start(metadata()).await.unwrap();
        f.controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();
        f.handler.read(Endpoint::Otp, "AA:BB:CC").unwrap();
        assert_eq!(f.store.size(), 1);

        f.controller.stop().await.unwrap();

        assert_eq!(f.controller.status(), SessionStatus::idle());
        assert_eq!(f.store.size(), 0);
        assert_eq!(f.advertiser.stops(), 1);
        assert!(f.handler.session_id().is_none());
        assert_eq!(
            f.display.events().last(),
            Some(&DisplayEvent::SessionInactive)
        );
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let f = fixture(FakeRegistry::succeeding("SES_9001"));

        f.controller.stop().await.unwrap();
        f.controller.stop().await.unwrap();

        assert_eq!(f.controller.status().state, SessionState::Idle);
        assert_eq!(f.advertiser.stops(), 0);
        assert!(f.display.events().is_empty());
    }

    #[tokio::test]
    async fn test_validation_error_stays_idle() {
        let f = fixture(FakeRegistry::succeeding("SES_9001"));

        let err = f
            .controller
            .start(SessionMetadata::new("CS101", "", "A101", "T001"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(f.controller.status().state, SessionState::Idle);
        assert!(matches!(
            f.display.events().as_slice(),
            [DisplayEvent::ValidationFailed(_)]
        ));
        assert!(f.advertiser.starts().is_empty());
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let (registry, gate) = FakeRegistry::gated("SES_9001");
        let f = fixture(registry);

        f.controller.start(metadata()).await.unwrap();
        assert_eq!(
            f.controller.start(metadata()).await,
            Err(SessionError::AlreadyActive)
        );

        gate.notify_one();
        f.controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();
        assert_eq!(
            f.controller.start(metadata()).await,
            Err(SessionError::AlreadyActive)
        );
    }

    #[tokio::test]
    async fn test_stop_while_creating_ignores_late_answer() {
        let (registry, gate) = FakeRegistry::gated("SES_9001");
        let registry = Arc::new(registry);
        let f = fixture_with(registry.clone(), FakeAdvertiser::default(), None);

        f.controller.start(metadata()).await.unwrap();
        assert_eq!(
            f.controller.status().state,
            SessionState::CreatingSession
        );

        f.controller.stop().await.unwrap();
        assert_eq!(f.controller.status().state, SessionState::Idle);
        let events_after_stop = f.display.events();

        // Let the superseded creation finish.
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(registry.create_calls(), 1);
        assert!(f.advertiser.starts().is_empty());
        assert_eq!(f.display.events(), events_after_stop);
        assert_eq!(f.controller.status(), SessionStatus::idle());
    }

    #[tokio::test]
    async fn test_stop_while_creating_ignores_late_failure() {
        let (registry, gate) = FakeRegistry::gated_failing();
        let registry = Arc::new(registry);
        let f = fixture_with(registry.clone(), FakeAdvertiser::default(), None);

        f.controller.start(metadata()).await.unwrap();
        f.controller.stop().await.unwrap();
        let events_after_stop = f.display.events();
        assert_eq!(events_after_stop, vec![DisplayEvent::SessionInactive]);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // No demo session either.
        assert_eq!(registry.create_calls(), 1);
        assert!(f.advertiser.starts().is_empty());
        assert_eq!(f.display.events(), events_after_stop);
        assert_eq!(f.controller.status(), SessionStatus::idle());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let f = fixture(FakeRegistry::succeeding("SES_9001"));

        f.controller.start(metadata()).await.unwrap();
        f.controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();
        f.controller.stop().await.unwrap();

        f.controller.start(metadata()).await.unwrap();
        f.controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();
        assert_eq!(f.advertiser.starts().len(), 2);
    }

    #[tokio::test]
    async fn test_advertise_failure_returns_to_idle() {
        let f = fixture_with(
            Arc::new(FakeRegistry::succeeding("SES_9001")),
            FakeAdvertiser::failing(AdvertiseFailure::DataTooLarge),
            None,
        );

        f.controller.start(metadata()).await.unwrap();
        let event = f
            .display
            .wait_for(|e| matches!(e, DisplayEvent::AdvertiseFailed(_)))
            .await;

        assert_eq!(
            event,
            DisplayEvent::AdvertiseFailed(AdvertiseFailure::DataTooLarge)
        );
        assert_eq!(f.controller.status(), SessionStatus::idle());
        assert!(f.handler.session_id().is_none());
        assert!(!f
            .display
            .events()
            .iter()
            .any(|e| matches!(e, DisplayEvent::SessionActive { .. })));

        // A failed attempt does not block the next one.
        assert!(f.controller.start(metadata()).await.is_ok());
    }

    #[tokio::test]
    async fn test_reads_refused_until_advertising_accepted() {
        let registry = Arc::new(FakeRegistry::succeeding("SES_9001"));
        let f = fixture_with(
            registry.clone(),
            FakeAdvertiser::failing(AdvertiseFailure::DataTooLarge),
            None,
        );
        f.advertiser.read_during_start(f.handler.clone());

        f.controller.start(metadata()).await.unwrap();
        f.display
            .wait_for(|e| matches!(e, DisplayEvent::AdvertiseFailed(_)))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.advertiser.reads(), vec![Err(ReadError::NoSession)]);
        assert_eq!(registry.log_attempts(), 0);
        assert_eq!(f.store.size(), 0);
        assert!(!f
            .display
            .events()
            .iter()
            .any(|e| matches!(e, DisplayEvent::OtpIssued { .. })));
    }

    #[tokio::test]
    async fn test_reads_served_once_advertising() {
        let registry = Arc::new(FakeRegistry::succeeding("SES_9001"));
        let f = fixture_with(registry.clone(), FakeAdvertiser::default(), None);
        f.advertiser.read_during_start(f.handler.clone());

        f.controller.start(metadata()).await.unwrap();
        f.controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();

        assert_eq!(f.advertiser.reads(), vec![Err(ReadError::NoSession)]);
        assert_eq!(f.handler.session_id().as_deref(), Some("SES_9001"));
        let otp = f.handler.read(Endpoint::Otp, "AA:BB:CC").unwrap();
        assert_eq!(otp.len(), 6);
        registry.wait_for_logs(1).await;
    }

    #[tokio::test]
    async fn test_sweeper_reports_active_otps() {
        let f = fixture_with(
            Arc::new(FakeRegistry::succeeding("SES_9001")),
            FakeAdvertiser::default(),
            Some(Duration::from_millis(20)),
        );

        f.controller.start(metadata()).await.unwrap();
        f.controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();
        f.handler.read(Endpoint::Otp, "AA:BB:CC").unwrap();

        f.display
            .wait_for(|e| *e == DisplayEvent::ActiveOtps(1))
            .await;
        f.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_classroom_scenario() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(OtpStore::with_clock(clock.clone()));
        let registry = Arc::new(FakeRegistry::succeeding("SES_9001"));
        let sync = RegistrySync::spawn(registry.clone(), &RegistryConfig::default());
        let display = Arc::new(RecordingDisplay::default());
        let handler = Arc::new(RequestHandler::new(
            store.clone(),
            sync.clone(),
            display.clone(),
        ));
        let controller = SessionController::spawn(ControllerParts {
            advertiser: Arc::new(FakeAdvertiser::default()),
            registry: sync,
            display,
            store: store.clone(),
            handler: handler.clone(),
            sweep_interval: None,
        });

        controller.start(metadata()).await.unwrap();
        let status = controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();
        assert_eq!(status.session.unwrap().session_id, "SES_9001");

        let first = handler.read(Endpoint::Otp, "AA:BB:CC").unwrap();
        clock.advance(chrono::Duration::seconds(5));
        let again = handler.read(Endpoint::Otp, "AA:BB:CC").unwrap();
        assert_eq!(first, again);

        let before = store.get("AA:BB:CC").unwrap();
        clock.advance(chrono::Duration::seconds(90));
        handler.read(Endpoint::Otp, "AA:BB:CC").unwrap();
        let after = store.get("AA:BB:CC").unwrap();
        assert!(after.issued_at > before.issued_at);
        assert_eq!(after.otp.len(), 6);

        let logged = registry.wait_for_logs(3).await;
        assert!(logged.iter().all(|e| e.session_id == "SES_9001"));

        controller.stop().await.unwrap();
        assert_eq!(store.size(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_session() {
        let f = fixture(FakeRegistry::succeeding("SES_9001"));

        f.controller.start(metadata()).await.unwrap();
        f.controller
            .wait_for_state(SessionState::Advertising)
            .await
            .unwrap();

        f.controller.shutdown().await.unwrap();
        assert_eq!(f.advertiser.stops(), 1);
        assert_eq!(
            f.controller.start(metadata()).await,
            Err(SessionError::ControllerClosed)
        );
    }
}
