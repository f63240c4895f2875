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

//! Per-device OTP store with lazy expiry.
//!
//! Each connecting device gets at most one live OTP at a time. Expired and
//! used records are swept before every issuance, under the same lock, so a
//! record can never look live to one caller and expired to another.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// How long an issued OTP stays valid.
pub const OTP_TTL_SECS: i64 = 90;

/// Largest OTP value; values are rendered as 6 zero-padded digits.
const OTP_MAX: u32 = 999_999;

/// An OTP handed to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    /// Address of the device that requested the OTP.
    pub peer_id: String,
    /// Six decimal digits, zero padded.
    pub otp: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set once the OTP has been consumed.
    pub used: bool,
}

impl OtpRecord {
    /// Whether the record can still be handed out at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.used && now <= self.expires_at
    }
}

/// Whether [`OtpStore::get_or_issue`] created a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issued {
    Fresh,
    Reused,
}

/// Keyed OTP store shared between the controller and the read handler.
pub struct OtpStore {
    records: Mutex<HashMap<String, OtpRecord>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl OtpStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            ttl: Duration::seconds(OTP_TTL_SECS),
        }
    }

    /// Return the live OTP for `peer_id`, issuing a new one if there is none.
    pub fn get_or_issue(&self, peer_id: &str) -> (OtpRecord, Issued) {
        let now = self.clock.now();
        let mut records = self.records.lock();

        Self::sweep_locked(&mut records, now);

        if let Some(existing) = records.get(peer_id) {
            return (existing.clone(), Issued::Reused);
        }

        let record = OtpRecord {
            peer_id: peer_id.to_string(),
            otp: generate_otp(),
            issued_at: now,
            expires_at: now + self.ttl,
            used: false,
        };
        debug!(
            "Issued OTP for {} (expires {})",
            peer_id,
            record.expires_at.to_rfc3339()
        );
        records.insert(peer_id.to_string(), record.clone());

        (record, Issued::Fresh)
    }

    /// Look up the live OTP for `peer_id` without issuing one.
    pub fn get(&self, peer_id: &str) -> Option<OtpRecord> {
        let now = self.clock.now();
        self.records
            .lock()
            .get(peer_id)
            .filter(|r| r.is_live(now))
            .cloned()
    }

    /// Mark the live OTP for `peer_id` as consumed.
    ///
    /// Returns `false` when the device has no live OTP.
    pub fn mark_used(&self, peer_id: &str) -> bool {
        let now = self.clock.now();
        match self.records.lock().get_mut(peer_id) {
            Some(record) if record.is_live(now) => {
                record.used = true;
                true
            }
            _ => false,
        }
    }

    /// Drop expired and used records. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        Self::sweep_locked(&mut self.records.lock(), now)
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Number of stored records, including stale ones not yet swept.
    pub fn size(&self) -> usize {
        self.records.lock().len()
    }

    fn sweep_locked(records: &mut HashMap<String, OtpRecord>, now: DateTime<Utc>) -> usize {
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        before - records.len()
    }
}

impl Default for OtpStore {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_otp() -> String {
    let value = rand::thread_rng().gen_range(0..=OTP_MAX);
    format!("{:06}", value)
}
