/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2026 OpenStack Foundation. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::net::IpAddr;

use db::DatabaseError;
use quark_uuid::network::{NetworkId, SubnetId};

pub mod config;
pub mod engine;
mod locks;
pub mod log;
pub mod notifier;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use config::IpamConfig;
pub use engine::{IpAllocateRequest, MacAllocateRequest, QuarkIpam};
pub use notifier::{AddressEvent, AddressEventPayload, LogNotifier, MqttNotifier, Notifier};

#[derive(thiserror::Error, Debug)]
pub enum IpamError {
    #[error("failed to generate a MAC address on network {network_id}")]
    MacAddressGenerationFailure { network_id: NetworkId },

    #[error("failed to generate an IP address on network {network_id}")]
    IpAddressGenerationFailure { network_id: NetworkId },

    #[error("IP address {ip} is already in use on network {network_id}")]
    IpAddressInUse { ip: IpAddr, network_id: NetworkId },

    #[error("transient conflict allocating {ip} on network {network_id}")]
    IpAddressRetryableFailure { ip: IpAddr, network_id: NetworkId },

    #[error("candidate {ip} violates the IP policy on network {network_id}")]
    IpAddressPolicyRetryableFailure { ip: IpAddr, network_id: NetworkId },

    #[error("IP address {ip} is not in subnet {subnet_id}")]
    IpAddressNotInSubnet { ip: IpAddr, subnet_id: SubnetId },

    #[error("no MAC address {0} found")]
    MacAddressNotFound(mac_address::MacAddress),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl IpamError {
    /// Retryable kinds are consumed by the engine's own retry loops and
    /// never surface to callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IpamError::IpAddressRetryableFailure { .. }
                | IpamError::IpAddressPolicyRetryableFailure { .. }
        )
    }
}
