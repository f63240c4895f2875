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

//! JSON-over-HTTP registry client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{OtpLogEvent, Registry};
use crate::error::RegistryError;
use crate::session::SessionMetadata;

/// Body of `POST /sessions`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody<'a> {
    class_name: &'a str,
    period: &'a str,
    room_number: &'a str,
    teacher_id: &'a str,
    date: String,
    start_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: Option<serde_json::Value>,
}

/// Body of `POST /otp/generate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OtpLogBody<'a> {
    otp: &'a str,
    session_id: &'a str,
    device_address: &'a str,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_at: DateTime<Utc>,
}

/// Registry reached over HTTP(S).
pub struct HttpRegistry {
    base_url: String,
    client: Client,
}

impl HttpRegistry {
    /// Create a client for the backend at `base_url` (e.g. `https://host/api`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(format!("attendance-beacon/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, RegistryError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("Unknown error"));
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn create_session(
        &self,
        metadata: &SessionMetadata,
        started_at: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        let body = CreateSessionBody {
            class_name: &metadata.class_name,
            period: &metadata.period,
            room_number: &metadata.room,
            teacher_id: &metadata.teacher_id,
            date: started_at.format("%Y-%m-%d").to_string(),
            start_time: started_at.to_rfc3339(),
        };

        let response = self.post_json("/sessions", &body).await?;
        let text = response.text().await?;

        let parsed: CreateSessionResponse = serde_json::from_str(&text).map_err(|e| {
            RegistryError::InvalidResponse(format!("failed to parse session response: {e}"))
        })?;

        match parsed.session_id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id),
            Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
            _ => Err(RegistryError::InvalidResponse(
                "missing sessionId in response".into(),
            )),
        }
    }

    async fn log_otp(&self, event: &OtpLogEvent) -> Result<(), RegistryError> {
        let body = OtpLogBody {
            otp: &event.otp,
            session_id: &event.session_id,
            device_address: &event.peer_id,
            created_at: event.issued_at,
            expires_at: event.expires_at,
        };

        self.post_json("/otp/generate", &body).await?;
        Ok(())
    }
}
