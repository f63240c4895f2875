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

//! Radio-side interface used by the session controller.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AdvertiseFailure;

/// Something that can broadcast a beacon.
#[async_trait]
pub trait Advertiser: Send + Sync {
    /// Start advertising `payload` as service data under `service`.
    async fn start(&self, service: Uuid, payload: Vec<u8>) -> Result<(), AdvertiseFailure>;

    /// Stop advertising. Calling this while stopped is harmless.
    async fn stop(&self);
}
