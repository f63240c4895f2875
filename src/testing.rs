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

//! In-memory fakes for the external collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::bluetooth::Advertiser;
use crate::display::{Display, DisplayEvent};
use crate::error::{AdvertiseFailure, ReadError, RegistryError};
use crate::handler::{Endpoint, RequestHandler};
use crate::registry::{OtpLogEvent, Registry};
use crate::session::SessionMetadata;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Poll `check` until it yields a value or the wait limit passes.
async fn poll_until<T>(mut check: impl FnMut() -> Option<T>) -> T {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        if let Some(value) = check() {
            return value;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within {:?}", WAIT_LIMIT);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

enum Behaviour {
    Succeed(String),
    Fail,
    Hang,
    Gated(String, Arc<Notify>),
    GatedFail(Arc<Notify>),
}

/// Registry with scripted answers that records OTP logs.
pub struct FakeRegistry {
    behaviour: Behaviour,
    logs: Mutex<Vec<OtpLogEvent>>,
    log_attempts: Mutex<usize>,
    create_calls: Mutex<usize>,
}

impl FakeRegistry {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            logs: Mutex::new(Vec::new()),
            log_attempts: Mutex::new(0),
            create_calls: Mutex::new(0),
        }
    }

    pub fn succeeding(session_id: &str) -> Self {
        Self::with(Behaviour::Succeed(session_id.to_string()))
    }

    pub fn failing() -> Self {
        Self::with(Behaviour::Fail)
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self::with(Behaviour::Hang)
    }

    /// Answers session creation once the returned gate is notified.
    pub fn gated(session_id: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (
            Self::with(Behaviour::Gated(session_id.to_string(), gate.clone())),
            gate,
        )
    }

    /// Fails session creation once the returned gate is notified.
    pub fn gated_failing() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (Self::with(Behaviour::GatedFail(gate.clone())), gate)
    }

    pub fn create_calls(&self) -> usize {
        *self.create_calls.lock()
    }

    pub fn log_attempts(&self) -> usize {
        *self.log_attempts.lock()
    }

    pub async fn wait_for_logs(&self, n: usize) -> Vec<OtpLogEvent> {
        poll_until(|| {
            let logs = self.logs.lock();
            (logs.len() >= n).then(|| logs.clone())
        })
        .await
    }

    pub async fn wait_for_log_attempts(&self, n: usize) {
        poll_until(|| (self.log_attempts() >= n).then_some(())).await
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn create_session(
        &self,
        _metadata: &SessionMetadata,
        _started_at: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        *self.create_calls.lock() += 1;
        match &self.behaviour {
            Behaviour::Succeed(id) => Ok(id.clone()),
            Behaviour::Fail => Err(RegistryError::Status {
                status: 500,
                body: "Internal server error".into(),
            }),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Gated(id, gate) => {
                gate.notified().await;
                Ok(id.clone())
            }
            Behaviour::GatedFail(gate) => {
                gate.notified().await;
                Err(RegistryError::Unavailable("connection refused".into()))
            }
        }
    }

    async fn log_otp(&self, event: &OtpLogEvent) -> Result<(), RegistryError> {
        *self.log_attempts.lock() += 1;
        match &self.behaviour {
            Behaviour::Fail => Err(RegistryError::Unavailable("connection refused".into())),
            Behaviour::Hang => std::future::pending().await,
            _ => {
                self.logs.lock().push(event.clone());
                Ok(())
            }
        }
    }
}

/// Advertiser that records calls and can be told to fail.
#[derive(Default)]
pub struct FakeAdvertiser {
    failure: Option<AdvertiseFailure>,
    starts: Mutex<Vec<(Uuid, Vec<u8>)>>,
    stops: Mutex<usize>,
    reader: Mutex<Option<Arc<RequestHandler>>>,
    reads: Mutex<Vec<Result<Vec<u8>, ReadError>>>,
}

impl FakeAdvertiser {
    pub fn failing(failure: AdvertiseFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }

    pub fn starts(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.starts.lock().clone()
    }

    pub fn stops(&self) -> usize {
        *self.stops.lock()
    }

    /// Read the OTP characteristic through `handler` while starting.
    pub fn read_during_start(&self, handler: Arc<RequestHandler>) {
        *self.reader.lock() = Some(handler);
    }

    pub fn reads(&self) -> Vec<Result<Vec<u8>, ReadError>> {
        self.reads.lock().clone()
    }
}

#[async_trait]
impl Advertiser for FakeAdvertiser {
    async fn start(&self, service: Uuid, payload: Vec<u8>) -> Result<(), AdvertiseFailure> {
        self.starts.lock().push((service, payload));
        let reader = self.reader.lock().clone();
        if let Some(handler) = reader {
            let read = handler.read(Endpoint::Otp, "AA:BB:CC:DD:EE:FF");
            self.reads.lock().push(read);
        }
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    async fn stop(&self) {
        *self.stops.lock() += 1;
    }
}

/// Display that keeps every event.
#[derive(Default)]
pub struct RecordingDisplay {
    events: Mutex<Vec<DisplayEvent>>,
}

impl RecordingDisplay {
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().clone()
    }

    /// Wait for an event matching `pred` and return it.
    pub async fn wait_for(&self, pred: impl Fn(&DisplayEvent) -> bool) -> DisplayEvent {
        poll_until(|| self.events.lock().iter().find(|e| pred(e)).cloned()).await
    }
}

impl Display for RecordingDisplay {
    fn notify(&self, event: DisplayEvent) {
        self.events.lock().push(event);
    }
}
