/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 OpenStack Foundation. All rights reserved.
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
use quark_uuid::security_group::{SecurityGroupId, SecurityGroupRuleId};
use sqlx::FromRow;

/// Security group rows are stored here for the adjacent driver; the IPAM
/// engine itself never reads them.
#[derive(Debug, FromRow, Clone)]
pub struct SecurityGroup {
    pub id: SecurityGroupId,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow, Clone)]
pub struct SecurityGroupRule {
    pub id: SecurityGroupRuleId,
    pub group_id: SecurityGroupId,
    pub tenant_id: String,
    pub direction: String,
    pub ethertype: i32,
    pub protocol: Option<i32>,
    pub port_range_min: Option<i32>,
    pub port_range_max: Option<i32>,
    pub created_at: DateTime<Utc>,
}
