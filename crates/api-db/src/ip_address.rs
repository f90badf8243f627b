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

use model::ip_address::{AddressType, IpAddress};
use model::ip_policy;
use quark_uuid::ip::IpAddressId;
use quark_uuid::network::{NetworkId, SubnetId};
use quark_uuid::port::PortId;
use quark_uuid::transaction::TransactionId;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::{Context, DatabaseError, reuse_cutoff};

/// Filter composition for address lookups. Every field is optional;
/// whatever is set is ANDed together. Non-admin contexts that don't filter
/// by tenant get scoped to their own tenant implicitly.
#[derive(Default)]
pub struct IpAddressFilters<'a> {
    pub ids: Option<&'a [IpAddressId]>,
    pub network_id: Option<NetworkId>,
    pub subnet_ids: Option<&'a [SubnetId]>,
    pub versions: Option<&'a [i32]>,
    pub address: Option<IpAddr>,
    pub deallocated: Option<bool>,
    /// Minimum age, in seconds, of the deallocation. Rows whose
    /// `deallocated_at` is newer than this (or NULL) don't match.
    pub reuse_after: Option<i64>,
    pub transaction_id: Option<TransactionId>,
    pub address_type: Option<AddressType>,
    pub used_by_tenant_ids: Option<&'a [&'a str]>,
    pub device_ids: Option<&'a [&'a str]>,
    pub port_id: Option<PortId>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, ctx: &Context, filters: &IpAddressFilters<'_>) {
    builder.push(" WHERE true");
    if let Some(ids) = filters.ids {
        builder.push(" AND id = ANY(");
        builder.push_bind(ids.to_vec());
        builder.push(")");
    }
    if let Some(network_id) = filters.network_id {
        builder.push(" AND network_id = ");
        builder.push_bind(network_id);
    }
    if let Some(subnet_ids) = filters.subnet_ids {
        builder.push(" AND subnet_id = ANY(");
        builder.push_bind(subnet_ids.to_vec());
        builder.push(")");
    }
    if let Some(versions) = filters.versions {
        builder.push(" AND version = ANY(");
        builder.push_bind(versions.to_vec());
        builder.push(")");
    }
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
    if let Some(address_type) = filters.address_type {
        builder.push(" AND address_type = ");
        builder.push_bind(address_type);
    }
    if let Some(tenants) = filters.used_by_tenant_ids {
        builder.push(" AND used_by_tenant_id = ANY(");
        builder.push_bind(tenants.iter().map(|t| t.to_string()).collect::<Vec<_>>());
        builder.push(")");
    } else if !ctx.is_admin {
        // We don't need unqualified queries: scope to the caller's tenant
        // whenever no explicit tenant filter was supplied.
        builder.push(" AND used_by_tenant_id = ");
        builder.push_bind(ctx.tenant_id.clone());
    }
    if let Some(device_ids) = filters.device_ids {
        builder.push(
            " AND EXISTS ( \
               SELECT 1 FROM quark_port_ip_address_associations assoc \
               JOIN quark_ports p ON p.id = assoc.port_id \
               WHERE assoc.ip_address_id = quark_ip_addresses.id AND p.device_id = ANY(",
        );
        builder.push_bind(device_ids.iter().map(|d| d.to_string()).collect::<Vec<_>>());
        builder.push("))");
    }
    if let Some(port_id) = filters.port_id {
        builder.push(
            " AND EXISTS ( \
               SELECT 1 FROM quark_port_ip_address_associations assoc \
               WHERE assoc.ip_address_id = quark_ip_addresses.id AND assoc.port_id = ",
        );
        builder.push_bind(port_id);
        builder.push(")");
    }
}

pub async fn find_all(
    ctx: &Context,
    txn: &mut PgConnection,
    filters: &IpAddressFilters<'_>,
) -> Result<Vec<IpAddress>, DatabaseError> {
    let mut builder = QueryBuilder::new("SELECT * FROM quark_ip_addresses");
    push_filters(&mut builder, ctx, filters);
    builder
        .build_query_as()
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(builder.sql(), e))
}

pub async fn find_one(
    ctx: &Context,
    txn: &mut PgConnection,
    filters: &IpAddressFilters<'_>,
    lock_for_update: bool,
) -> Result<Option<IpAddress>, DatabaseError> {
    let mut builder = QueryBuilder::new("SELECT * FROM quark_ip_addresses");
    push_filters(&mut builder, ctx, filters);
    builder.push(" LIMIT 1");
    if lock_for_update {
        builder.push(" FOR UPDATE");
    }
    builder
        .build_query_as()
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(builder.sql(), e))
}

pub struct NewIpAddress {
    pub address: IpAddr,
    pub version: i32,
    pub subnet_id: SubnetId,
    pub network_id: NetworkId,
    pub address_type: Option<AddressType>,
}

/// Insert a freshly allocated address. A unique-key conflict on
/// (subnet_id, address) comes back as a query error the engine inspects
/// with `DatabaseError::is_unique_violation`.
pub async fn create(
    ctx: &Context,
    txn: &mut PgConnection,
    value: NewIpAddress,
) -> Result<IpAddress, DatabaseError> {
    let id = IpAddressId::from(uuid::Uuid::new_v4());
    let query = "INSERT INTO quark_ip_addresses \
                 (id, address, version, subnet_id, network_id, used_by_tenant_id, address_type, \
                  deallocated, allocated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, false, now()) \
                 RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .bind(value.address)
        .bind(value.version)
        .bind(value.subnet_id)
        .bind(value.network_id)
        .bind(&ctx.tenant_id)
        .bind(value.address_type)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// The values stamped onto a row by a successful claim.
pub struct ReallocateIpUpdate<'a> {
    pub transaction_id: TransactionId,
    pub address_type: AddressType,
    pub used_by_tenant_id: &'a str,
}

/// The claim primitive: atomically transition at most one matching
/// deallocated row to "owned by this transaction". Returns whether a row
/// was claimed; the caller re-finds the concrete row by transaction id.
///
/// `FOR UPDATE SKIP LOCKED` on the inner select is what makes concurrent
/// claimers pick distinct rows instead of serializing on the same one.
pub async fn reallocate(
    ctx: &Context,
    txn: &mut PgConnection,
    update: &ReallocateIpUpdate<'_>,
    filters: &IpAddressFilters<'_>,
) -> Result<bool, DatabaseError> {
    let mut builder = QueryBuilder::new("UPDATE quark_ip_addresses SET transaction_id = ");
    builder.push_bind(update.transaction_id);
    builder.push(", address_type = ");
    builder.push_bind(update.address_type);
    builder.push(
        ", deallocated = false, deallocated_at = NULL, allocated_at = now(), \
         used_by_tenant_id = ",
    );
    builder.push_bind(update.used_by_tenant_id.to_string());
    builder.push(" WHERE id = (SELECT id FROM quark_ip_addresses");
    push_filters(&mut builder, ctx, filters);
    builder.push(" LIMIT 1 FOR UPDATE SKIP LOCKED)");

    let result = builder
        .build()
        .execute(txn)
        .await
        .map_err(|e| DatabaseError::query(builder.sql(), e))?;
    Ok(result.rows_affected() == 1)
}

/// Resolve a claim back to its row and validate it. The row is discarded
/// (returning None) when its subnet is gone or unusable, and deleted
/// outright when it violates the subnet's current policy or falls outside
/// the subnet's cidr — either means the row predates a reconfiguration and
/// must not circulate again.
pub async fn reallocate_find(
    ctx: &Context,
    txn: &mut PgConnection,
    transaction_id: TransactionId,
) -> Result<Option<IpAddress>, DatabaseError> {
    let filters = IpAddressFilters {
        transaction_id: Some(transaction_id),
        ..Default::default()
    };
    let Some(address) = find_one(ctx, txn, &filters, false).await? else {
        tracing::warn!(%transaction_id, "couldn't find IP address for claim");
        return Ok(None);
    };
    tracing::info!(address = %address.address, "potentially reallocatable IP found");

    let Some(subnet) = super::subnet::find_optional(txn, address.subnet_id).await? else {
        tracing::debug!(address = %address.address, "no subnet associated with address");
        return Ok(None);
    };
    if subnet.do_not_use {
        tracing::debug!(subnet_id = %subnet.id, "subnet marked as do_not_use");
        return Ok(None);
    }

    let policy_cidrs = super::ip_policy::cidrs_for_subnet(txn, &subnet).await?;
    if let Some(cidrs) = policy_cidrs {
        let excluded = ip_policy::exclusion_set(&cidrs);
        if excluded.contains(address.address) {
            tracing::info!(
                address = %address.address,
                "deleting address due to policy violation"
            );
            delete(txn, address.id).await?;
            return Ok(None);
        }
    }

    if !subnet.contains(address.address) {
        tracing::info!(
            address = %address.address,
            subnet_id = %subnet.id,
            "address isn't in the subnet it claims to be in"
        );
        delete(txn, address.id).await?;
        return Ok(None);
    }

    Ok(Some(address))
}

/// Flip a deallocated row (already located and locked by the caller) back
/// to allocated. The v6 create path uses this when the generator re-emits
/// an address that already has a reclaimable row.
pub async fn update_claimed(
    ctx: &Context,
    txn: &mut PgConnection,
    id: IpAddressId,
    address_type: AddressType,
) -> Result<IpAddress, DatabaseError> {
    let query = "UPDATE quark_ip_addresses \
                 SET deallocated = false, deallocated_at = NULL, allocated_at = now(), \
                     used_by_tenant_id = $1, address_type = $2 \
                 WHERE id = $3 \
                 RETURNING *";
    sqlx::query_as(query)
        .bind(&ctx.tenant_id)
        .bind(address_type)
        .bind(id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Release an address. The row is kept (it becomes reclaimable after the
/// reuse window) and its address_type is cleared.
pub async fn deallocate(
    txn: &mut PgConnection,
    id: IpAddressId,
) -> Result<IpAddress, DatabaseError> {
    let query = "UPDATE quark_ip_addresses \
                 SET deallocated = true, deallocated_at = now(), address_type = NULL \
                 WHERE id = $1 \
                 RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(txn: &mut PgConnection, id: IpAddressId) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_ip_addresses WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}
