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

//! Classroom attendance beacon.
//!
//! The instructor's machine advertises the current class session over BLE.
//! Student devices connect, read the OTP characteristic and get a
//! six-digit code valid for 90 seconds, which they later submit to the
//! attendance backend as proof of presence.

pub mod bluetooth;
pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod handler;
pub mod otp;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use display::{ChannelDisplay, Display, DisplayEvent};
pub use error::{AdvertiseFailure, ReadError, RegistryError, SessionError};
pub use handler::{Endpoint, RequestHandler};
pub use otp::{OtpRecord, OtpStore};
pub use registry::{HttpRegistry, OfflineRegistry, Registry, RegistrySync};
pub use session::{SessionController, SessionMetadata, SessionState, SessionStatus};
