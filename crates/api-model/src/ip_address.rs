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

use chrono::{DateTime, Utc};
use quark_uuid::ip::IpAddressId;
use quark_uuid::network::{NetworkId, SubnetId};
use quark_uuid::transaction::TransactionId;
use sqlx::FromRow;

/// What an address is used for. Cleared when the address is deallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(type_name = "quark_address_type", rename_all = "lowercase")]
pub enum AddressType {
    Fixed,
    Shared,
    Floating,
}

/// An IP address row. A row is either allocated or deallocated, never
/// deleted on release; deallocated rows become reclaimable `reuse_after`
/// seconds after `deallocated_at`. The `transaction_id` stamp is how a claim
/// re-finds the concrete row it won.
#[derive(Debug, FromRow, Clone)]
pub struct IpAddress {
    pub id: IpAddressId,
    pub address: IpAddr,
    pub version: i32,
    pub subnet_id: SubnetId,
    pub network_id: NetworkId,
    pub used_by_tenant_id: String,
    pub address_type: Option<AddressType>,
    pub allocated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub deallocated: bool,
    pub deallocated_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<TransactionId>,
}
