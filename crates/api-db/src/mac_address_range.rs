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
use model::mac_address::{MacAddressRange, NewMacAddressRange};
use quark_network::mac::mac_range_bounds;
use quark_uuid::mac::MacAddressRangeId;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};

use super::DatabaseError;

#[derive(Debug, FromRow)]
struct RangeWithCount {
    #[sqlx(flatten)]
    range: MacAddressRange,
    allocated_count: i64,
}

/// The most-allocated viable range, locked for the remainder of the
/// transaction, together with its current allocation count. When an
/// explicit MAC is requested, only a range containing it qualifies.
/// Forbidden (do_not_use) ranges are only candidates when the caller says
/// so.
pub async fn find_allocation_counts(
    txn: &mut PgConnection,
    address: Option<i64>,
    use_forbidden_mac_range: bool,
) -> Result<Option<(MacAddressRange, i64)>, DatabaseError> {
    let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
        "SELECT r.*, mac_counts.allocated_count \
         FROM quark_mac_address_ranges r \
         CROSS JOIN LATERAL ( \
             SELECT COUNT(*) AS allocated_count \
             FROM quark_mac_addresses m WHERE m.mac_address_range_id = r.id \
         ) mac_counts \
         WHERE r.next_auto_assign_mac != -1",
    );
    if let Some(address) = address {
        builder.push(" AND r.first_address <= ");
        builder.push_bind(address);
        builder.push(" AND r.last_address >= ");
        builder.push_bind(address);
    }
    if !use_forbidden_mac_range {
        builder.push(" AND r.do_not_use = false");
    }
    builder.push(" ORDER BY mac_counts.allocated_count DESC LIMIT 1 FOR UPDATE OF r");

    let row: Option<RangeWithCount> = builder
        .build_query_as()
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(builder.sql(), e))?;
    Ok(row.map(|row| (row.range, row.allocated_count)))
}

/// Advance the range's allocation cursor by one, conditional on the range
/// not being full; the matched-row count is the signal.
pub async fn update_next_auto_assign_mac(
    txn: &mut PgConnection,
    range_id: MacAddressRangeId,
) -> Result<u64, DatabaseError> {
    let query = "UPDATE quark_mac_address_ranges \
                 SET next_auto_assign_mac = next_auto_assign_mac + 1 \
                 WHERE id = $1 AND next_auto_assign_mac != -1";
    sqlx::query(query)
        .bind(range_id)
        .execute(txn)
        .await
        .map(|result| result.rows_affected())
        .map_err(|e| DatabaseError::query(query, e))
}

/// Mark a range full so the create path never revisits it.
pub async fn update_set_full(
    txn: &mut PgConnection,
    range_id: MacAddressRangeId,
) -> Result<u64, DatabaseError> {
    let query = "UPDATE quark_mac_address_ranges \
                 SET next_auto_assign_mac = -1 \
                 WHERE id = $1 AND next_auto_assign_mac != -1";
    sqlx::query(query)
        .bind(range_id)
        .execute(txn)
        .await
        .map(|result| result.rows_affected())
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn find(
    txn: &mut PgConnection,
    id: MacAddressRangeId,
) -> Result<MacAddressRange, DatabaseError> {
    let query = "SELECT * FROM quark_mac_address_ranges WHERE id = $1";
    sqlx::query_as(query)
        .bind(id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn create(
    txn: &mut PgConnection,
    value: &NewMacAddressRange<'_>,
) -> Result<MacAddressRange, DatabaseError> {
    let (first, last) = mac_range_bounds(value.cidr)
        .map_err(|e| DatabaseError::InvalidArgument(e.to_string()))?;
    let id = MacAddressRangeId::from(uuid::Uuid::new_v4());
    let query = "INSERT INTO quark_mac_address_ranges \
                 (id, cidr, first_address, last_address, next_auto_assign_mac, do_not_use) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .bind(value.cidr)
        .bind(first)
        .bind(last)
        .bind(first)
        .bind(value.do_not_use)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(
    txn: &mut PgConnection,
    id: MacAddressRangeId,
) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_mac_address_ranges WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}
