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
use quark_network::ip::{contains_canonical, subnet_size};
use quark_uuid::ip::IpPolicyId;
use quark_uuid::network::{NetworkId, SegmentId, SubnetId};
use sqlx::FromRow;

/// A subnet row. `next_auto_assign_ip` is the allocation cursor for the v4
/// create path; NULL means the subnet is full and is never revisited. Cursor
/// movement is only ever done with conditional updates keyed on the cursor
/// being non-NULL, so a subnet that went full concurrently loses the race
/// instead of resurrecting.
#[derive(Debug, FromRow, Clone)]
pub struct Subnet {
    pub id: SubnetId,
    pub network_id: NetworkId,
    pub segment_id: Option<SegmentId>,
    pub tenant_id: String,
    pub cidr: IpNetwork,
    pub first_ip: IpAddr,
    pub last_ip: IpAddr,
    pub ip_version: i32,
    pub next_auto_assign_ip: Option<IpAddr>,
    pub do_not_use: bool,
    pub ip_policy_id: Option<IpPolicyId>,
    pub allocation_pool_cache: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Subnet {
    /// Number of addresses the cidr covers.
    pub fn size(&self) -> u128 {
        subnet_size(&self.cidr)
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        contains_canonical(&self.cidr, addr)
    }

    pub fn is_full(&self) -> bool {
        self.next_auto_assign_ip.is_none()
    }
}

pub struct NewSubnet {
    pub network_id: NetworkId,
    pub segment_id: Option<SegmentId>,
    pub cidr: IpNetwork,
    pub ip_policy_id: Option<IpPolicyId>,
    pub do_not_use: bool,
}

impl NewSubnet {
    pub fn for_network(network_id: NetworkId, cidr: IpNetwork) -> Self {
        Self {
            network_id,
            segment_id: None,
            cidr,
            ip_policy_id: None,
            do_not_use: false,
        }
    }
}
