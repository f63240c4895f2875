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

//! Characteristic read handling.
//!
//! Reads are answered synchronously from local state. The registry is only
//! ever handed a queued record afterwards, never awaited.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bluetooth::ble_constants::{OTP_CHAR_UUID, SESSION_CHAR_UUID};
use crate::display::{Display, DisplayEvent};
use crate::error::ReadError;
use crate::otp::{Issued, OtpStore};
use crate::registry::{OtpLogEvent, RegistrySync};

/// Readable endpoints of the attendance service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Otp,
    Session,
    Other(Uuid),
}

impl Endpoint {
    pub fn from_uuid(uuid: Uuid) -> Self {
        if uuid == OTP_CHAR_UUID {
            Self::Otp
        } else if uuid == SESSION_CHAR_UUID {
            Self::Session
        } else {
            Self::Other(uuid)
        }
    }
}

/// Answers reads from connected devices.
pub struct RequestHandler {
    store: Arc<OtpStore>,
    registry: RegistrySync,
    display: Arc<dyn Display>,
    session_id: RwLock<Option<String>>,
}

impl RequestHandler {
    pub fn new(store: Arc<OtpStore>, registry: RegistrySync, display: Arc<dyn Display>) -> Self {
        Self {
            store,
            registry,
            display,
            session_id: RwLock::new(None),
        }
    }

    /// Start serving reads for `session_id`.
    pub(crate) fn attach(&self, session_id: String) {
        debug!("Request handler attached to session {}", session_id);
        *self.session_id.write() = Some(session_id);
    }

    /// Stop serving reads. Waits for reads already in progress.
    pub(crate) fn detach(&self) {
        if let Some(id) = self.session_id.write().take() {
            debug!("Request handler detached from session {}", id);
        }
    }

    /// Session currently served, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Answer a read of `endpoint` by the device `peer_id`.
    pub fn read(&self, endpoint: Endpoint, peer_id: &str) -> Result<Vec<u8>, ReadError> {
        // Held for the whole read so detach-then-clear can't leave an OTP behind.
        let session = self.session_id.read();

        match endpoint {
            Endpoint::Session => {
                let id = session.as_ref().ok_or(ReadError::NoSession)?;
                debug!("Session ID read by {}", peer_id);
                Ok(id.as_bytes().to_vec())
            }
            Endpoint::Otp => {
                let session_id = session.as_ref().ok_or(ReadError::NoSession)?;
                let (record, issued) = self.store.get_or_issue(peer_id);

                if issued == Issued::Fresh {
                    self.display.notify(DisplayEvent::OtpIssued {
                        peer_id: peer_id.to_string(),
                        otp: record.otp.clone(),
                        count: self.store.size(),
                    });
                }

                self.registry.log_otp(OtpLogEvent {
                    otp: record.otp.clone(),
                    session_id: session_id.clone(),
                    peer_id: peer_id.to_string(),
                    issued_at: record.issued_at,
                    expires_at: record.expires_at,
                });

                Ok(record.otp.into_bytes())
            }
            Endpoint::Other(uuid) => {
                warn!("Read of unknown characteristic {} by {}", uuid, peer_id);
                Err(ReadError::UnknownEndpoint)
            }
        }
    }
}
