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

//! Error types shared across the beacon.

use thiserror::Error;

/// Errors returned by [`crate::session::SessionController`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Required session metadata was missing.
    #[error("invalid session metadata: {0}")]
    Validation(String),

    /// A session is already being created or advertised.
    #[error("a session is already active")]
    AlreadyActive,

    /// The controller task has shut down.
    #[error("session controller is not running")]
    ControllerClosed,
}

/// Errors talking to the attendance backend.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No backend is configured or it could not be reached.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// Connection, timeout or other transport failure.
    #[error("registry transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("registry returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered but the body made no sense.
    #[error("invalid registry response: {0}")]
    InvalidResponse(String),
}

/// Reasons an attempt to start advertising can fail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseFailure {
    #[error("Already advertising")]
    AlreadyStarted,
    #[error("Data too large")]
    DataTooLarge,
    #[error("Feature not supported")]
    FeatureUnsupported,
    #[error("Internal error")]
    InternalError,
    #[error("Too many advertisers")]
    TooManyAdvertisers,
    #[error("Unknown error")]
    Unknown,
}

impl AdvertiseFailure {
    /// Map a platform advertise-callback error code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::DataTooLarge,
            2 => Self::TooManyAdvertisers,
            3 => Self::AlreadyStarted,
            4 => Self::InternalError,
            5 => Self::FeatureUnsupported,
            _ => Self::Unknown,
        }
    }

    /// Human-readable reason for the display.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl From<&bluer::Error> for AdvertiseFailure {
    fn from(err: &bluer::Error) -> Self {
        use bluer::ErrorKind;

        match err.kind {
            ErrorKind::AlreadyExists | ErrorKind::InProgress => Self::AlreadyStarted,
            ErrorKind::InvalidLength => Self::DataTooLarge,
            ErrorKind::NotSupported | ErrorKind::NotAvailable => Self::FeatureUnsupported,
            ErrorKind::NotPermitted => Self::TooManyAdvertisers,
            ErrorKind::Failed | ErrorKind::Internal(_) => Self::InternalError,
            _ => Self::Unknown,
        }
    }
}

/// Failure answers to a characteristic read.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// No session is currently advertised.
    #[error("no active session")]
    NoSession,

    /// The read targeted a characteristic we do not serve.
    #[error("unknown characteristic")]
    UnknownEndpoint,
}
