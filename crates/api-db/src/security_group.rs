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
use model::security_group::{SecurityGroup, SecurityGroupRule};
use quark_uuid::security_group::{SecurityGroupId, SecurityGroupRuleId};
use sqlx::PgConnection;

use super::{Context, DatabaseError};

pub async fn find_for_tenant(
    ctx: &Context,
    txn: &mut PgConnection,
) -> Result<Vec<SecurityGroup>, DatabaseError> {
    let query = "SELECT * FROM quark_security_groups WHERE tenant_id = $1";
    sqlx::query_as(query)
        .bind(&ctx.tenant_id)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find(
    txn: &mut PgConnection,
    id: SecurityGroupId,
) -> Result<Option<SecurityGroup>, DatabaseError> {
    let query = "SELECT * FROM quark_security_groups WHERE id = $1";
    sqlx::query_as(query)
        .bind(id)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn create(
    ctx: &Context,
    txn: &mut PgConnection,
    name: &str,
    description: Option<&str>,
) -> Result<SecurityGroup, DatabaseError> {
    let id = SecurityGroupId::from(uuid::Uuid::new_v4());
    let query = "INSERT INTO quark_security_groups (id, tenant_id, name, description) \
                 VALUES ($1, $2, $3, $4) RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .bind(&ctx.tenant_id)
        .bind(name)
        .bind(description)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn rules_for_group(
    txn: &mut PgConnection,
    group_id: SecurityGroupId,
) -> Result<Vec<SecurityGroupRule>, DatabaseError> {
    let query = "SELECT * FROM quark_security_group_rules WHERE group_id = $1";
    sqlx::query_as(query)
        .bind(group_id)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub struct NewSecurityGroupRule {
    pub group_id: SecurityGroupId,
    pub direction: String,
    pub ethertype: i32,
    pub protocol: Option<i32>,
    pub port_range_min: Option<i32>,
    pub port_range_max: Option<i32>,
}

pub async fn create_rule(
    ctx: &Context,
    txn: &mut PgConnection,
    value: NewSecurityGroupRule,
) -> Result<SecurityGroupRule, DatabaseError> {
    let id = SecurityGroupRuleId::from(uuid::Uuid::new_v4());
    let query = "INSERT INTO quark_security_group_rules \
                 (id, group_id, tenant_id, direction, ethertype, protocol, port_range_min, port_range_max) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .bind(value.group_id)
        .bind(&ctx.tenant_id)
        .bind(&value.direction)
        .bind(value.ethertype)
        .bind(value.protocol)
        .bind(value.port_range_min)
        .bind(value.port_range_max)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(txn: &mut PgConnection, id: SecurityGroupId) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_security_groups WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete_rule(
    txn: &mut PgConnection,
    id: SecurityGroupRuleId,
) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_security_group_rules WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}
