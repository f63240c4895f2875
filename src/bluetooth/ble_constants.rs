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

//! BLE identifiers of the attendance service.
//!
//! These must match what the student app scans and reads for.

use uuid::Uuid;

/// Attendance service, also the key of the advertised service data.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_123456789abc);

/// OTP characteristic (read).
pub const OTP_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_123456789abd);

/// Session ID characteristic (read).
pub const SESSION_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_123456789abe);
