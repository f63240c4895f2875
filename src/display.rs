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

//! Status notifications for whatever front end is showing the beacon.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AdvertiseFailure;

/// Events pushed to the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    /// Beacon is advertising the given session.
    SessionActive { session_id: String, demo: bool },
    /// No session is active any more.
    SessionInactive,
    /// Advertising could not be started.
    AdvertiseFailed(AdvertiseFailure),
    /// Session metadata was rejected.
    ValidationFailed(String),
    /// A device was handed a new OTP.
    OtpIssued {
        peer_id: String,
        otp: String,
        count: usize,
    },
    /// Number of OTPs still held after a periodic sweep.
    ActiveOtps(usize),
}

/// Receiver of status notifications.
///
/// Implementations must not block: notifications are sent from the
/// characteristic read path.
pub trait Display: Send + Sync {
    fn notify(&self, event: DisplayEvent);
}

/// Display that forwards events into a channel.
#[derive(Clone)]
pub struct ChannelDisplay {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelDisplay {
    pub fn new(tx: mpsc::UnboundedSender<DisplayEvent>) -> Self {
        Self { tx }
    }

    /// Create a display and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Display for ChannelDisplay {
    fn notify(&self, event: DisplayEvent) {
        if self.tx.send(event).is_err() {
            debug!("Display channel closed, dropping event");
        }
    }
}
