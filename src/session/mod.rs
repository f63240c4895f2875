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

//! Class session identity and lifecycle.

mod controller;

pub use controller::{ControllerParts, SessionController};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Prefix of locally synthesized session IDs.
pub const DEMO_SESSION_PREFIX: &str = "demo-session-";

/// Descriptive data entered by the instructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub class_name: String,
    pub period: String,
    pub room: String,
    pub teacher_id: String,
}

impl SessionMetadata {
    pub fn new(
        class_name: impl Into<String>,
        period: impl Into<String>,
        room: impl Into<String>,
        teacher_id: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            period: period.into(),
            room: room.into(),
            teacher_id: teacher_id.into(),
        }
    }

    /// Trim every field and reject blanks.
    pub fn validated(&self) -> Result<Self, SessionError> {
        let fields = [
            ("class name", self.class_name.trim()),
            ("period", self.period.trim()),
            ("room", self.room.trim()),
            ("teacher ID", self.teacher_id.trim()),
        ];

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(SessionError::Validation(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        Ok(Self::new(fields[0].1, fields[1].1, fields[2].1, fields[3].1))
    }
}

/// The session currently being advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub metadata: SessionMetadata,
    pub created_at: DateTime<Utc>,
    /// True when the registry could not confirm the session.
    pub demo: bool,
}

impl Session {
    /// Session confirmed by the registry.
    pub fn registered(session_id: String, metadata: SessionMetadata) -> Self {
        Self {
            session_id,
            metadata,
            created_at: Utc::now(),
            demo: false,
        }
    }

    /// Session with a locally synthesized ID.
    pub fn demo(metadata: SessionMetadata) -> Self {
        let created_at = Utc::now();
        Self {
            session_id: format!("{}{}", DEMO_SESSION_PREFIX, created_at.timestamp_millis()),
            metadata,
            created_at,
            demo: true,
        }
    }
}

/// Controller lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    CreatingSession,
    Advertising,
    Stopping,
}

/// Snapshot of the controller, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session: Option<Session>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            session: None,
        }
    }
}
