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
use model::ip_address::IpAddress;
use model::port::{NewPort, Port};
use quark_uuid::ip::IpAddressId;
use quark_uuid::port::PortId;
use sqlx::PgConnection;

use super::{ColumnInfo, Context, DatabaseError, ObjectColumnFilter};

#[derive(Clone, Copy)]
pub struct IdColumn;

impl ColumnInfo<'_> for IdColumn {
    type TableType = Port;
    type ColumnType = PortId;

    fn column_name(&self) -> &'static str {
        "id"
    }
}

#[derive(Clone, Copy)]
pub struct DeviceIdColumn;

impl<'a> ColumnInfo<'a> for DeviceIdColumn {
    type TableType = Port;
    type ColumnType = &'a str;

    fn column_name(&self) -> &'static str {
        "device_id"
    }
}

#[derive(Clone, Copy)]
pub struct NameColumn;

impl<'a> ColumnInfo<'a> for NameColumn {
    type TableType = Port;
    type ColumnType = &'a str;

    fn column_name(&self) -> &'static str {
        "name"
    }
}

pub async fn find_by<'a, C: ColumnInfo<'a, TableType = Port>>(
    txn: &mut PgConnection,
    filter: ObjectColumnFilter<'a, C>,
) -> Result<Vec<Port>, DatabaseError> {
    let mut query = super::FilterableQueryBuilder::new("SELECT * FROM quark_ports").filter(&filter);

    query
        .build_query_as()
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query.sql(), e))
}

/// Fetch a port with its associated addresses loaded.
pub async fn find_with_addresses(
    txn: &mut PgConnection,
    port_id: PortId,
) -> Result<Option<Port>, DatabaseError> {
    let mut ports = find_by(&mut *txn, ObjectColumnFilter::One(IdColumn, &port_id)).await?;
    let Some(mut port) = ports.pop() else {
        return Ok(None);
    };

    let query = "SELECT a.* FROM quark_ip_addresses a \
                 JOIN quark_port_ip_address_associations assoc ON assoc.ip_address_id = a.id \
                 WHERE assoc.port_id = $1";
    let addresses: Vec<IpAddress> = sqlx::query_as(query)
        .bind(port_id)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    port.ip_addresses = addresses;
    Ok(Some(port))
}

pub async fn create(
    ctx: &Context,
    txn: &mut PgConnection,
    value: NewPort<'_>,
) -> Result<Port, DatabaseError> {
    let id = PortId::from(uuid::Uuid::new_v4());
    let query = "INSERT INTO quark_ports (id, network_id, tenant_id, device_id, name) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .bind(value.network_id)
        .bind(&ctx.tenant_id)
        .bind(value.device_id)
        .bind(value.name)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Attach an address to a set of ports. At most one port can have the
/// address enabled on it.
pub async fn associate_ip(
    txn: &mut PgConnection,
    port_ids: &[PortId],
    ip_address_id: IpAddressId,
    enabled_port: Option<PortId>,
) -> Result<(), DatabaseError> {
    let query = "INSERT INTO quark_port_ip_address_associations (port_id, ip_address_id, enabled) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (port_id, ip_address_id) DO UPDATE SET enabled = EXCLUDED.enabled";
    for port_id in port_ids {
        sqlx::query(query)
            .bind(port_id)
            .bind(ip_address_id)
            .bind(enabled_port == Some(*port_id))
            .execute(&mut *txn)
            .await
            .map_err(|e| DatabaseError::query(query, e))?;
    }
    Ok(())
}

pub async fn disassociate_ip(
    txn: &mut PgConnection,
    port_ids: &[PortId],
    ip_address_id: IpAddressId,
) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_port_ip_address_associations \
                 WHERE ip_address_id = $1 AND port_id = ANY($2)";
    sqlx::query(query)
        .bind(ip_address_id)
        .bind(port_ids.to_vec())
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}

/// Reconcile an address's associations to exactly the given port set.
pub async fn update_port_associations_for_ip(
    txn: &mut PgConnection,
    port_ids: &[PortId],
    ip_address_id: IpAddressId,
) -> Result<(), DatabaseError> {
    let query = "SELECT port_id FROM quark_port_ip_address_associations WHERE ip_address_id = $1";
    let current: Vec<PortId> = sqlx::query_scalar(query)
        .bind(ip_address_id)
        .fetch_all(&mut *txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    let added: Vec<PortId> = port_ids
        .iter()
        .filter(|id| !current.contains(id))
        .copied()
        .collect();
    let removed: Vec<PortId> = current
        .iter()
        .filter(|id| !port_ids.contains(id))
        .copied()
        .collect();

    associate_ip(&mut *txn, &added, ip_address_id, None).await?;
    disassociate_ip(txn, &removed, ip_address_id).await
}

/// How many ports an address is currently attached to. Deallocation by port
/// only releases addresses attached to exactly one port.
pub async fn association_count(
    txn: &mut PgConnection,
    ip_address_id: IpAddressId,
) -> Result<i64, DatabaseError> {
    let query =
        "SELECT COUNT(*) FROM quark_port_ip_address_associations WHERE ip_address_id = $1";
    sqlx::query_scalar(query)
        .bind(ip_address_id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// The device ids of every port an address is attached to, for event
/// payloads.
pub async fn device_ids_for_address(
    txn: &mut PgConnection,
    ip_address_id: IpAddressId,
) -> Result<Vec<String>, DatabaseError> {
    let query = "SELECT p.device_id FROM quark_ports p \
                 JOIN quark_port_ip_address_associations assoc ON assoc.port_id = p.id \
                 WHERE assoc.ip_address_id = $1";
    sqlx::query_scalar(query)
        .bind(ip_address_id)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn delete(txn: &mut PgConnection, port_id: PortId) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_ports WHERE id = $1";
    sqlx::query(query)
        .bind(port_id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}
