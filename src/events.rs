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

//! Display event processing for the command-line front end.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::display::DisplayEvent;

/// Longest session ID shown in full on the status line.
const STATUS_ID_MAX: usize = 20;

/// What the front end currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeaconSummary {
    pub session_id: Option<String>,
    pub demo: bool,
    /// OTPs currently held.
    pub active_otps: usize,
    /// OTPs issued since the session started.
    pub issued: usize,
    pub last_error: Option<String>,
}

/// Folds display events into a [`BeaconSummary`] and logs them.
#[derive(Debug, Default)]
pub struct EventProcessor {
    summary: BeaconSummary,
}

impl EventProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> &BeaconSummary {
        &self.summary
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: DisplayEvent) {
        match event {
            DisplayEvent::SessionActive { session_id, demo } => {
                if demo {
                    info!("Session creation failed, running in demo mode");
                }
                self.summary = BeaconSummary {
                    session_id: Some(session_id),
                    demo,
                    ..Default::default()
                };
                info!("{}", self.status_line());
            }
            DisplayEvent::SessionInactive => {
                self.summary.session_id = None;
                self.summary.demo = false;
                self.summary.active_otps = 0;
                info!("{}", self.status_line());
            }
            DisplayEvent::AdvertiseFailed(failure) => {
                self.summary.session_id = None;
                self.summary.active_otps = 0;
                self.summary.last_error = Some(failure.reason());
                error!("{}", self.status_line());
            }
            DisplayEvent::ValidationFailed(msg) => {
                warn!("Please fill all fields: {}", msg);
                self.summary.last_error = Some(msg);
            }
            DisplayEvent::OtpIssued {
                peer_id,
                otp,
                count,
            } => {
                self.summary.issued += 1;
                self.summary.active_otps = count;
                info!("Active OTPs: {} | Latest: {} -> {}", count, peer_id, otp);
            }
            DisplayEvent::ActiveOtps(count) => {
                self.summary.active_otps = count;
                info!("Active OTPs: {}", count);
            }
        }
    }

    /// One-line status for the console.
    pub fn status_line(&self) -> String {
        match (&self.summary.session_id, &self.summary.last_error) {
            (Some(id), _) => {
                let shown = if id.chars().count() > STATUS_ID_MAX {
                    format!("{}...", id.chars().take(STATUS_ID_MAX).collect::<String>())
                } else {
                    id.clone()
                };
                let mode = if self.summary.demo { " (demo)" } else { "" };
                format!("Beacon Active{} - Session: {}", mode, shown)
            }
            (None, Some(err)) => format!("Beacon Failed - {}", err),
            (None, None) => "No Active Session".to_string(),
        }
    }

    /// Drain `rx` until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DisplayEvent>) -> Self {
        while let Some(event) = rx.recv().await {
            self.process_event(event);
        }
        self
    }
}
