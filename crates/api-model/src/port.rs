/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2025 OpenStack Foundation. All rights reserved.
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
use chrono::{DateTime, Utc};
use quark_uuid::ip::IpAddressId;
use quark_uuid::network::NetworkId;
use quark_uuid::port::PortId;
use sqlx::FromRow;

use crate::ip_address::IpAddress;

/// A virtual port. Addresses are attached through
/// `quark_port_ip_address_associations`; a port references its addresses
/// but does not own them, and a deallocated address can outlive every port
/// it was ever attached to.
#[derive(Debug, FromRow, Clone)]
pub struct Port {
    pub id: PortId,
    pub network_id: NetworkId,
    pub tenant_id: String,
    pub device_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub ip_addresses: Vec<IpAddress>,
}

#[derive(Debug, FromRow, Clone)]
pub struct PortIpAssociation {
    pub port_id: PortId,
    pub ip_address_id: IpAddressId,
    pub enabled: bool,
}

pub struct NewPort<'a> {
    pub network_id: NetworkId,
    pub device_id: &'a str,
    pub name: Option<&'a str>,
}
