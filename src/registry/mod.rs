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

//! Attendance backend ("registry") client side.
//!
//! The registry is a record keeper, not a gatekeeper: session creation may
//! fail and the beacon carries on in demo mode, and OTP logs are
//! best-effort and never retried.

mod http;
mod sync;

pub use http::HttpRegistry;
pub use sync::RegistrySync;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RegistryError;
use crate::session::SessionMetadata;

/// Record of an OTP handed to a device, sent to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpLogEvent {
    pub otp: String,
    pub session_id: String,
    pub peer_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Transport to the attendance backend.
///
/// Requests are sent unauthenticated today; credentials belong in an
/// implementation of this trait.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Register a new session and return the backend-assigned ID.
    async fn create_session(
        &self,
        metadata: &SessionMetadata,
        started_at: DateTime<Utc>,
    ) -> Result<String, RegistryError>;

    /// Record that an OTP was issued.
    async fn log_otp(&self, event: &OtpLogEvent) -> Result<(), RegistryError>;
}

/// Registry used when no backend is configured. Every call fails, which
/// puts sessions straight into demo mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRegistry;

#[async_trait]
impl Registry for OfflineRegistry {
    async fn create_session(
        &self,
        _metadata: &SessionMetadata,
        _started_at: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        Err(RegistryError::Unavailable("no registry configured".into()))
    }

    async fn log_otp(&self, _event: &OtpLogEvent) -> Result<(), RegistryError> {
        Err(RegistryError::Unavailable("no registry configured".into()))
    }
}
