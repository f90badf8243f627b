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
use model::network::{Network, NewNetwork};
use quark_uuid::network::NetworkId;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::{Context, DatabaseError, NetworkStrategy};

#[derive(Default)]
pub struct NetworkFilters<'a> {
    pub ids: Option<&'a [NetworkId]>,
    /// Some(true): only shared (provider) networks. Some(false): only the
    /// caller's own networks. None: the caller's networks plus any shared
    /// networks named in `ids`.
    pub shared: Option<bool>,
}

/// Find networks visible to the caller. Shared networks live outside tenant
/// scoping, so the id list is split through the strategy resolver first and
/// the two halves are queried with different tenancy rules.
pub async fn find(
    ctx: &Context,
    txn: &mut PgConnection,
    strategy: &dyn NetworkStrategy,
    filters: &NetworkFilters<'_>,
) -> Result<Vec<Network>, DatabaseError> {
    let (tenant_ids, shared_ids) = match filters.ids {
        Some(ids) => strategy.split_network_ids(ids),
        None => (Vec::new(), Vec::new()),
    };

    let mut builder: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("SELECT * FROM quark_networks WHERE ");
    match filters.shared {
        Some(true) => {
            // Shared networks only: the assignable set, narrowed to the
            // requested ids when any were given.
            let assignable = match filters.ids {
                Some(_) => shared_ids,
                None => strategy.assignable_networks(),
            };
            if assignable.is_empty() {
                return Ok(Vec::new());
            }
            builder.push("id = ANY(");
            builder.push_bind(assignable);
            builder.push(")");
        }
        Some(false) => {
            let all_shared = strategy.assignable_networks();
            builder.push("NOT (id = ANY(");
            builder.push_bind(all_shared);
            builder.push("))");
            if filters.ids.is_some() {
                builder.push(" AND id = ANY(");
                builder.push_bind(tenant_ids);
                builder.push(")");
            }
            push_tenant_scope(&mut builder, ctx);
        }
        None => {
            builder.push("(true");
            if filters.ids.is_some() {
                builder.push(" AND id = ANY(");
                builder.push_bind(tenant_ids);
                builder.push(")");
            }
            push_tenant_scope(&mut builder, ctx);
            builder.push(")");
            if !shared_ids.is_empty() {
                builder.push(" OR id = ANY(");
                builder.push_bind(shared_ids);
                builder.push(")");
            }
        }
    }

    builder
        .build_query_as()
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(builder.sql(), e))
}

fn push_tenant_scope(builder: &mut QueryBuilder<'_, Postgres>, ctx: &Context) {
    if !ctx.is_admin {
        builder.push(" AND tenant_id = ");
        builder.push_bind(ctx.tenant_id.clone());
    }
}

pub async fn find_one(
    txn: &mut PgConnection,
    id: NetworkId,
) -> Result<Option<Network>, DatabaseError> {
    let query = "SELECT * FROM quark_networks WHERE id = $1";
    sqlx::query_as(query)
        .bind(id)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn create(
    ctx: &Context,
    txn: &mut PgConnection,
    value: NewNetwork<'_>,
) -> Result<Network, DatabaseError> {
    let id = NetworkId::from(uuid::Uuid::new_v4());
    let query = "INSERT INTO quark_networks (id, tenant_id, name) \
                 VALUES ($1, $2, $3) RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .bind(&ctx.tenant_id)
        .bind(value.name)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn count_all(ctx: &Context, txn: &mut PgConnection) -> Result<i64, DatabaseError> {
    let query = "SELECT COUNT(*) FROM quark_networks WHERE tenant_id = $1";
    sqlx::query_scalar(query)
        .bind(&ctx.tenant_id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(txn: &mut PgConnection, id: NetworkId) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_networks WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}
