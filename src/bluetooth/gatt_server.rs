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

//! BLE GATT server and advertiser backed by BlueZ.

use anyhow::Result;
use async_trait::async_trait;
use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicRead, CharacteristicReadRequest,
    ReqError, Service,
};
use bluer::Adapter;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::ble_constants::*;
use super::Advertiser;
use crate::error::AdvertiseFailure;
use crate::handler::{Endpoint, RequestHandler};

/// Registration handles; dropping them unregisters from BlueZ.
struct ServerHandles {
    _app_handle: ApplicationHandle,
    _adv_handle: AdvertisementHandle,
}

/// Attendance beacon on the default Bluetooth adapter.
pub struct BeaconServer {
    adapter: Adapter,
    handler: Arc<RequestHandler>,
    handles: Mutex<Option<ServerHandles>>,
}

impl BeaconServer {
    /// Open a BlueZ session on the default adapter.
    pub async fn new(handler: Arc<RequestHandler>, local_name: &str) -> Result<Self> {
        info!("Initializing BLE beacon...");

        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        adapter.set_alias(local_name.to_string()).await?;
        info!("Bluetooth name set to: {}", local_name);

        Ok(Self {
            adapter,
            handler,
            handles: Mutex::new(None),
        })
    }

    /// Build the attendance service with its two read characteristics.
    fn application(&self) -> Application {
        debug!("Registering OTP characteristic: {}", OTP_CHAR_UUID);
        debug!("Registering session characteristic: {}", SESSION_CHAR_UUID);

        let service = Service {
            uuid: SERVICE_UUID,
            primary: true,
            characteristics: vec![
                Self::read_characteristic(OTP_CHAR_UUID, self.handler.clone()),
                Self::read_characteristic(SESSION_CHAR_UUID, self.handler.clone()),
            ],
            ..Default::default()
        };

        Application {
            services: vec![service],
            ..Default::default()
        }
    }

    fn read_characteristic(uuid: Uuid, handler: Arc<RequestHandler>) -> Characteristic {
        let endpoint = Endpoint::from_uuid(uuid);

        Characteristic {
            uuid,
            read: Some(CharacteristicRead {
                read: true,
                fun: Box::new(move |req: CharacteristicReadRequest| {
                    let handler = handler.clone();
                    Box::pin(async move {
                        let peer_id = req.device_address.to_string();
                        debug!(
                            "BLE READ: {:?} from {}, offset={}, MTU={}",
                            endpoint, peer_id, req.offset, req.mtu
                        );

                        let value = handler.read(endpoint, &peer_id).map_err(|e| {
                            debug!("Read from {} refused: {}", peer_id, e);
                            ReqError::Failed
                        })?;
                        debug!("Read value (hex): {}", hex::encode(&value));

                        apply_offset(value, req.offset)
                    })
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Serve the part of `value` a long read asked for.
fn apply_offset(value: Vec<u8>, offset: u16) -> Result<Vec<u8>, ReqError> {
    let offset = offset as usize;
    if offset > value.len() {
        return Err(ReqError::InvalidOffset);
    }
    Ok(value[offset..].to_vec())
}

/// Session id as service data under the service UUID.
///
/// Legacy PDUs hold 31 bytes; longer ids need extended advertising support
/// in the controller or BlueZ rejects them.
fn advertisement(service: Uuid, payload: Vec<u8>) -> Advertisement {
    Advertisement {
        service_data: vec![(service, payload)].into_iter().collect(),
        discoverable: Some(true),
        ..Default::default()
    }
}

#[async_trait]
impl Advertiser for BeaconServer {
    async fn start(&self, service: Uuid, payload: Vec<u8>) -> Result<(), AdvertiseFailure> {
        let mut handles = self.handles.lock().await;
        if handles.is_some() {
            return Err(AdvertiseFailure::AlreadyStarted);
        }

        let app_handle = self
            .adapter
            .serve_gatt_application(self.application())
            .await
            .map_err(|e| {
                error!("Failed to register GATT service: {}", e);
                AdvertiseFailure::from(&e)
            })?;
        info!("GATT service registered");

        let adv_handle = self
            .adapter
            .advertise(advertisement(service, payload))
            .await
            .map_err(|e| {
                error!("Failed to start advertising: {}", e);
                AdvertiseFailure::from(&e)
            })?;

        *handles = Some(ServerHandles {
            _app_handle: app_handle,
            _adv_handle: adv_handle,
        });

        info!("BLE advertising started");
        Ok(())
    }

    async fn stop(&self) {
        if self.handles.lock().await.take().is_some() {
            info!("BLE advertising stopped, GATT service unregistered");
        }
    }
}
