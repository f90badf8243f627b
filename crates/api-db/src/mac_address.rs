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
use model::mac_address::MacAddress;
use quark_network::mac::int_to_mac;
use quark_uuid::mac::MacAddressRangeId;
use quark_uuid::transaction::TransactionId;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};

use super::{Context, DatabaseError, reuse_cutoff};

#[derive(Default)]
pub struct MacAddressFilters {
    pub address: Option<i64>,
    pub deallocated: Option<bool>,
    pub reuse_after: Option<i64>,
    pub transaction_id: Option<TransactionId>,
    pub mac_address_range_id: Option<MacAddressRangeId>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &MacAddressFilters) {
    builder.push(" WHERE true");
    if let Some(address) = filters.address {
        builder.push(" AND address = ");
        builder.push_bind(address);
    }
    if let Some(deallocated) = filters.deallocated {
        builder.push(" AND deallocated = ");
        builder.push_bind(deallocated);
    }
    if let Some(reuse_after) = filters.reuse_after {
        builder.push(" AND deallocated_at <= ");
        builder.push_bind(reuse_cutoff(reuse_after));
    }
    if let Some(transaction_id) = filters.transaction_id {
        builder.push(" AND transaction_id = ");
        builder.push_bind(transaction_id);
    }
    if let Some(range_id) = filters.mac_address_range_id {
        builder.push(" AND mac_address_range_id = ");
        builder.push_bind(range_id);
    }
}

pub async fn find_one(
    ctx: &Context,
    txn: &mut PgConnection,
    filters: &MacAddressFilters,
) -> Result<Option<MacAddress>, DatabaseError> {
    let mut builder = QueryBuilder::new("SELECT * FROM quark_mac_addresses");
    push_filters(&mut builder, filters);
    if !ctx.is_admin {
        builder.push(" AND tenant_id = ");
        builder.push_bind(ctx.tenant_id.clone());
    }
    builder.push(" LIMIT 1");
    builder
        .build_query_as()
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(builder.sql(), e))
}

/// Insert a new MAC at a chosen value. A primary-key conflict means another
/// allocator picked the same value first; the engine treats that as a signal
/// to try the next candidate.
pub async fn create(
    ctx: &Context,
    txn: &mut PgConnection,
    address: i64,
    mac_address_range_id: MacAddressRangeId,
) -> Result<MacAddress, DatabaseError> {
    let query = "INSERT INTO quark_mac_addresses \
                 (address, mac_address_range_id, tenant_id, deallocated, deallocated_at) \
                 VALUES ($1, $2, $3, false, NULL) \
                 RETURNING *";
    sqlx::query_as(query)
        .bind(address)
        .bind(mac_address_range_id)
        .bind(&ctx.tenant_id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// The MAC flavor of the claim primitive: transition at most one matching
/// deallocated MAC to "owned by this transaction".
pub async fn reallocate(
    txn: &mut PgConnection,
    transaction_id: TransactionId,
    filters: &MacAddressFilters,
) -> Result<bool, DatabaseError> {
    let mut builder = QueryBuilder::new(
        "UPDATE quark_mac_addresses \
         SET deallocated = false, deallocated_at = NULL, transaction_id = ",
    );
    builder.push_bind(transaction_id);
    builder.push(" WHERE address = (SELECT address FROM quark_mac_addresses");
    push_filters(&mut builder, filters);
    builder.push(" LIMIT 1 FOR UPDATE SKIP LOCKED)");

    let result = builder
        .build()
        .execute(txn)
        .await
        .map_err(|e| DatabaseError::query(builder.sql(), e))?;
    Ok(result.rows_affected() == 1)
}

#[derive(Debug, FromRow)]
struct MacWithRangeFlag {
    #[sqlx(flatten)]
    mac: MacAddress,
    range_do_not_use: bool,
}

/// Resolve a MAC claim back to its row. A deallocated MAC sitting in a
/// range that has since been marked do_not_use is deleted instead of
/// returned, so forbidden ranges drain as their addresses are touched.
pub async fn reallocate_find(
    txn: &mut PgConnection,
    transaction_id: TransactionId,
) -> Result<Option<MacAddress>, DatabaseError> {
    let query = "SELECT m.*, r.do_not_use AS range_do_not_use \
                 FROM quark_mac_addresses m \
                 JOIN quark_mac_address_ranges r ON r.id = m.mac_address_range_id \
                 WHERE m.transaction_id = $1 \
                 LIMIT 1";
    let row: Option<MacWithRangeFlag> = sqlx::query_as(query)
        .bind(transaction_id)
        .fetch_optional(&mut *txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    let Some(row) = row else {
        tracing::warn!(%transaction_id, "couldn't find MAC address for claim");
        return Ok(None);
    };

    if row.range_do_not_use {
        delete(txn, row.mac.address).await?;
        tracing::debug!(
            address = %int_to_mac(row.mac.address),
            "found a deallocated MAC in a do_not_use range and deleted it, retrying"
        );
        return Ok(None);
    }

    Ok(Some(row.mac))
}

/// Release a MAC back into its range.
pub async fn deallocate(txn: &mut PgConnection, address: i64) -> Result<MacAddress, DatabaseError> {
    let query = "UPDATE quark_mac_addresses \
                 SET deallocated = true, deallocated_at = now() \
                 WHERE address = $1 \
                 RETURNING *";
    sqlx::query_as(query)
        .bind(address)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(txn: &mut PgConnection, address: i64) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_mac_addresses WHERE address = $1";
    sqlx::query(query)
        .bind(address)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}
