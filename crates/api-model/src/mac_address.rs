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
use chrono::{DateTime, Utc};
use quark_network::mac::int_to_mac;
use quark_uuid::mac::MacAddressRangeId;
use quark_uuid::transaction::TransactionId;
use sqlx::FromRow;

/// A MAC address row, keyed by the EUI-48 integer itself.
#[derive(Debug, FromRow, Clone)]
pub struct MacAddress {
    pub address: i64,
    pub mac_address_range_id: MacAddressRangeId,
    pub tenant_id: String,
    pub deallocated: bool,
    pub deallocated_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
}

impl MacAddress {
    pub fn readable(&self) -> mac_address::MacAddress {
        int_to_mac(self.address)
    }
}

/// A MAC address range. `next_auto_assign_mac = -1` means the range is full
/// and the create path never revisits it; cursor updates are conditional on
/// the cursor not being -1.
#[derive(Debug, FromRow, Clone)]
pub struct MacAddressRange {
    pub id: MacAddressRangeId,
    pub cidr: String,
    pub first_address: i64,
    pub last_address: i64,
    pub next_auto_assign_mac: i64,
    pub do_not_use: bool,
    pub created_at: DateTime<Utc>,
}

impl MacAddressRange {
    pub fn len(&self) -> i64 {
        self.last_address - self.first_address + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.next_auto_assign_mac == -1
    }
}

pub struct NewMacAddressRange<'a> {
    pub cidr: &'a str,
    pub do_not_use: bool,
}
