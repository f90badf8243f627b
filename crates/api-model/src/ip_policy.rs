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
use ipnetwork::IpNetwork;
use quark_network::ip::{IpSet, ToPrefix};
use quark_uuid::ip::IpPolicyId;
use sqlx::FromRow;

/// An IP policy: a set of CIDRs excluded from automatic allocation inside
/// the subnets that reference it. `size` is the aggregate number of distinct
/// excluded addresses, computed when the exclusion set is written so that
/// the subnet selector can do capacity math without expanding any CIDR.
#[derive(Debug, FromRow, Clone)]
pub struct IpPolicy {
    pub id: IpPolicyId,
    pub tenant_id: String,
    pub name: Option<String>,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow, Clone)]
pub struct IpPolicyCidr {
    pub id: uuid::Uuid,
    pub ip_policy_id: IpPolicyId,
    pub cidr: IpNetwork,
    pub first_ip: IpAddr,
    pub last_ip: IpAddr,
}

/// Build the membership structure for a policy's exclusion rows. Lookups
/// against the result are O(log n); nothing ever enumerates the covered
/// addresses.
pub fn exclusion_set(cidrs: &[IpPolicyCidr]) -> IpSet {
    IpSet::from(cidrs.iter().map(|row| row.cidr.to_prefix()))
}

/// The `size` value for an exclusion list: distinct addresses across the
/// CIDRs, overlap counted once. Saturates at i64::MAX for v6-sized
/// exclusions, which simply makes any subnet carrying the policy non-viable.
pub fn exclusion_size(exclude: &[IpNetwork]) -> i64 {
    let set = IpSet::from(exclude.iter().map(|cidr| cidr.to_prefix()));
    i64::try_from(set.num_addresses()).unwrap_or(i64::MAX)
}
