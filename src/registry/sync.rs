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

//! Fire-and-forget dispatch of registry calls.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{OtpLogEvent, Registry};
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::session::SessionMetadata;

/// Handle for sending records to the registry.
///
/// OTP logs are queued with `try_send` and shipped by a background worker,
/// so queuing never waits on the network.
#[derive(Clone)]
pub struct RegistrySync {
    registry: Arc<dyn Registry>,
    log_tx: mpsc::Sender<OtpLogEvent>,
    timeout: Duration,
}

impl RegistrySync {
    /// Start the log worker. Must be called inside a tokio runtime.
    pub fn spawn(registry: Arc<dyn Registry>, config: &RegistryConfig) -> Self {
        let (log_tx, log_rx) = mpsc::channel(config.log_queue_capacity.max(1));
        let timeout = config.timeout();

        tokio::spawn(run_log_worker(
            registry.clone(),
            log_rx,
            Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            timeout,
        ));

        Self {
            registry,
            log_tx,
            timeout,
        }
    }

    /// Register a session with the backend. One attempt, no retry.
    pub async fn create_session(&self, metadata: &SessionMetadata) -> Result<String, RegistryError> {
        info!("Creating session for {} on registry", metadata.class_name);

        match tokio::time::timeout(self.timeout, self.registry.create_session(metadata, Utc::now()))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Unavailable(format!(
                "session creation timed out after {:?}",
                self.timeout
            ))),
        }
    }

    /// Queue an OTP log record. Returns `false` if it was dropped.
    pub fn log_otp(&self, event: OtpLogEvent) -> bool {
        match self.log_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    "OTP log queue full, dropping record for {}",
                    event.peer_id
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("OTP log worker stopped, dropping record");
                false
            }
        }
    }
}

async fn run_log_worker(
    registry: Arc<dyn Registry>,
    mut log_rx: mpsc::Receiver<OtpLogEvent>,
    limit: Arc<Semaphore>,
    timeout: Duration,
) {
    debug!("OTP log worker started");

    while let Some(event) = log_rx.recv().await {
        let permit = match limit.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let registry = registry.clone();

        tokio::spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(timeout, registry.log_otp(&event)).await {
                Ok(Ok(())) => debug!("OTP logged to registry for {}", event.peer_id),
                Ok(Err(e)) => warn!("Failed to log OTP for {}: {}", event.peer_id, e),
                Err(_) => warn!("Timed out logging OTP for {}", event.peer_id),
            }
        });
    }

    debug!("OTP log worker exited");
}
