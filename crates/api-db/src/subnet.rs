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
use model::subnet::{NewSubnet, Subnet};
use quark_network::ip::{int_to_ip, subnet_bounds};
use quark_uuid::network::{NetworkId, SegmentId, SubnetId};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};

use super::{ColumnInfo, Context, DatabaseError, FilterableQueryBuilder, ObjectColumnFilter};

#[derive(Clone, Copy)]
pub struct IdColumn;

impl ColumnInfo<'_> for IdColumn {
    type TableType = Subnet;
    type ColumnType = SubnetId;

    fn column_name(&self) -> &'static str {
        "id"
    }
}

#[derive(Clone, Copy)]
pub struct NetworkIdColumn;

impl ColumnInfo<'_> for NetworkIdColumn {
    type TableType = Subnet;
    type ColumnType = NetworkId;

    fn column_name(&self) -> &'static str {
        "network_id"
    }
}

#[derive(Clone, Copy)]
pub struct SegmentIdColumn;

impl ColumnInfo<'_> for SegmentIdColumn {
    type TableType = Subnet;
    type ColumnType = SegmentId;

    fn column_name(&self) -> &'static str {
        "segment_id"
    }
}

#[derive(Debug, FromRow)]
struct SubnetWithCount {
    #[sqlx(flatten)]
    subnet: Subnet,
    allocated_count: i64,
}

// Search for a specific subnet
pub async fn find(txn: &mut PgConnection, id: SubnetId) -> Result<Subnet, DatabaseError> {
    let query = "SELECT * FROM quark_subnets WHERE id = $1";
    sqlx::query_as(query)
        .bind(id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_optional(
    txn: &mut PgConnection,
    id: SubnetId,
) -> Result<Option<Subnet>, DatabaseError> {
    let query = "SELECT * FROM quark_subnets WHERE id = $1";
    sqlx::query_as(query)
        .bind(id)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find_by<'a, C: ColumnInfo<'a, TableType = Subnet>>(
    txn: &mut PgConnection,
    filter: ObjectColumnFilter<'a, C>,
) -> Result<Vec<Subnet>, DatabaseError> {
    let mut query = FilterableQueryBuilder::new("SELECT * FROM quark_subnets").filter(&filter);

    query
        .build_query_as()
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query.sql(), e))
}

/// Return the subnet ids under a segment of a network. The reuse path uses
/// this to translate a segment constraint into a subnet-id constraint.
pub async fn ids_for_segment(
    txn: &mut PgConnection,
    network_id: NetworkId,
    segment_id: SegmentId,
) -> Result<Vec<SubnetId>, DatabaseError> {
    let query = "SELECT id FROM quark_subnets WHERE network_id = $1 AND segment_id = $2";
    sqlx::query_scalar(query)
        .bind(network_id)
        .bind(segment_id)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Candidate subnets for the create path, joined with their current
/// allocation counts and locked for the remainder of the transaction.
///
/// Ordered v4 before v6, then by residual capacity ascending — most full
/// first — with the id as a stable tie-break. Residual capacity is computed
/// as numeric so a v6 /64 can't overflow the arithmetic. Subnets marked full
/// (NULL cursor) or do_not_use never come back.
pub async fn find_ordered_by_most_full(
    txn: &mut PgConnection,
    network_id: NetworkId,
    ip_version: Option<i32>,
    segment_id: Option<SegmentId>,
    subnet_ids: Option<&[SubnetId]>,
) -> Result<Vec<(Subnet, i64)>, DatabaseError> {
    let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
        "SELECT s.*, ip_counts.allocated_count \
         FROM quark_subnets s \
         CROSS JOIN LATERAL ( \
             SELECT COUNT(*) AS allocated_count \
             FROM quark_ip_addresses a WHERE a.subnet_id = s.id \
         ) ip_counts \
         WHERE s.do_not_use = false \
           AND s.next_auto_assign_ip IS NOT NULL \
           AND s.network_id = ",
    );
    builder.push_bind(network_id);
    if let Some(version) = ip_version {
        builder.push(" AND s.ip_version = ");
        builder.push_bind(version);
    }
    if let Some(segment_id) = segment_id {
        builder.push(" AND s.segment_id = ");
        builder.push_bind(segment_id);
    }
    if let Some(ids) = subnet_ids {
        builder.push(" AND s.id = ANY(");
        builder.push_bind(ids.to_vec());
        builder.push(")");
    }
    builder.push(
        " ORDER BY s.ip_version ASC, \
          power(2::numeric, (CASE WHEN s.ip_version = 4 THEN 32 ELSE 128 END) - masklen(s.cidr)) \
              - ip_counts.allocated_count ASC, \
          s.id ASC \
          FOR UPDATE OF s",
    );

    let rows: Vec<SubnetWithCount> = builder
        .build_query_as()
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(builder.sql(), e))?;
    Ok(rows
        .into_iter()
        .map(|row| (row.subnet, row.allocated_count))
        .collect())
}

/// Advance the allocation cursor by one. The update is conditional on the
/// subnet not having gone full; the returned row count is the signal.
pub async fn update_next_auto_assign_ip(
    txn: &mut PgConnection,
    subnet_id: SubnetId,
) -> Result<u64, DatabaseError> {
    let query = "UPDATE quark_subnets \
                 SET next_auto_assign_ip = next_auto_assign_ip + 1 \
                 WHERE id = $1 AND next_auto_assign_ip IS NOT NULL";
    sqlx::query(query)
        .bind(subnet_id)
        .execute(txn)
        .await
        .map(|result| result.rows_affected())
        .map_err(|e| DatabaseError::query(query, e))
}

/// Mark a subnet full. Idempotent by construction: once the cursor is NULL
/// the condition can never match again.
pub async fn update_set_full(
    txn: &mut PgConnection,
    subnet_id: SubnetId,
) -> Result<u64, DatabaseError> {
    let query = "UPDATE quark_subnets \
                 SET next_auto_assign_ip = NULL \
                 WHERE id = $1 AND next_auto_assign_ip IS NOT NULL";
    sqlx::query(query)
        .bind(subnet_id)
        .execute(txn)
        .await
        .map(|result| result.rows_affected())
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn create(
    ctx: &Context,
    txn: &mut PgConnection,
    value: NewSubnet,
) -> Result<Subnet, DatabaseError> {
    let id = SubnetId::from(uuid::Uuid::new_v4());
    let (first, last) = subnet_bounds(&value.cidr);
    let first_ip = int_to_ip(first);
    let last_ip = int_to_ip(last);
    let ip_version: i32 = if value.cidr.is_ipv4() { 4 } else { 6 };

    let query = "INSERT INTO quark_subnets \
                 (id, network_id, segment_id, tenant_id, cidr, first_ip, last_ip, ip_version, \
                  next_auto_assign_ip, do_not_use, ip_policy_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .bind(value.network_id)
        .bind(value.segment_id)
        .bind(&ctx.tenant_id)
        .bind(value.cidr)
        .bind(first_ip)
        .bind(last_ip)
        .bind(ip_version)
        .bind(first_ip)
        .bind(value.do_not_use)
        .bind(value.ip_policy_id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Cache the expanded allocation pools for a subnet, or clear the cache by
/// passing None.
pub async fn set_allocation_pool_cache(
    txn: &mut PgConnection,
    subnet_id: SubnetId,
    cache: Option<serde_json::Value>,
) -> Result<(), DatabaseError> {
    let query = "UPDATE quark_subnets SET allocation_pool_cache = $1 WHERE id = $2";
    sqlx::query(query)
        .bind(cache)
        .bind(subnet_id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(txn: &mut PgConnection, subnet_id: SubnetId) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_subnets WHERE id = $1";
    sqlx::query(query)
        .bind(subnet_id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}
