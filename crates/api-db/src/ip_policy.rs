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
use ipnetwork::IpNetwork;
use model::ip_policy::{IpPolicy, IpPolicyCidr, exclusion_size};
use model::subnet::Subnet;
use quark_network::ip::{int_to_ip, subnet_bounds};
use quark_uuid::ip::IpPolicyId;
use sqlx::PgConnection;

use super::{Context, DatabaseError};

pub struct NewIpPolicy<'a> {
    pub name: Option<&'a str>,
    pub exclude: &'a [IpNetwork],
}

/*
 * Create a policy together with its exclusion rows.
 *
 * The aggregate exclusion size is computed here, at write time, so the
 * subnet selector can use it without expanding any CIDR. Since this performs
 * multiple inserts it wraps the actions in a sub-transaction and rolls back
 * if any of them fail, so it won't leave half of them written.
 */
pub async fn create(
    ctx: &Context,
    txn: &mut PgConnection,
    value: NewIpPolicy<'_>,
) -> Result<IpPolicy, DatabaseError> {
    let mut inner_transaction = crate::Transaction::begin_inner(txn).await?;

    let id = IpPolicyId::from(uuid::Uuid::new_v4());
    let size = exclusion_size(value.exclude);
    let query = "INSERT INTO quark_ip_policies (id, tenant_id, name, size) \
                 VALUES ($1, $2, $3, $4) RETURNING *";
    let policy: IpPolicy = sqlx::query_as(query)
        .bind(id)
        .bind(&ctx.tenant_id)
        .bind(value.name)
        .bind(size)
        .fetch_one(inner_transaction.as_pgconn())
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    insert_cidrs(inner_transaction.as_pgconn(), id, value.exclude).await?;

    inner_transaction.commit().await?;
    Ok(policy)
}

/// Replace a policy's exclusion set and recompute its size.
pub async fn update_exclusions(
    txn: &mut PgConnection,
    policy_id: IpPolicyId,
    exclude: &[IpNetwork],
) -> Result<(), DatabaseError> {
    let mut inner_transaction = crate::Transaction::begin_inner(txn).await?;

    let query = "DELETE FROM quark_ip_policy_cidrs WHERE ip_policy_id = $1";
    sqlx::query(query)
        .bind(policy_id)
        .execute(inner_transaction.as_pgconn())
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    insert_cidrs(inner_transaction.as_pgconn(), policy_id, exclude).await?;

    let query = "UPDATE quark_ip_policies SET size = $1 WHERE id = $2";
    sqlx::query(query)
        .bind(exclusion_size(exclude))
        .bind(policy_id)
        .execute(inner_transaction.as_pgconn())
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    inner_transaction.commit().await
}

async fn insert_cidrs(
    txn: &mut PgConnection,
    policy_id: IpPolicyId,
    exclude: &[IpNetwork],
) -> Result<(), DatabaseError> {
    // https://github.com/launchbadge/sqlx/issues/294
    //
    // No way to insert multiple rows easily. This is more readable than some
    // hack to save tiny amounts of time.
    let query = "INSERT INTO quark_ip_policy_cidrs (id, ip_policy_id, cidr, first_ip, last_ip) \
                 VALUES ($1, $2, $3, $4, $5)";
    for cidr in exclude {
        let (first, last) = subnet_bounds(cidr);
        sqlx::query(query)
            .bind(uuid::Uuid::new_v4())
            .bind(policy_id)
            .bind(cidr)
            .bind(int_to_ip(first))
            .bind(int_to_ip(last))
            .execute(&mut *txn)
            .await
            .map_err(|e| DatabaseError::query(query, e))?;
    }
    Ok(())
}

pub async fn find(
    txn: &mut PgConnection,
    id: IpPolicyId,
) -> Result<Option<IpPolicy>, DatabaseError> {
    let query = "SELECT * FROM quark_ip_policies WHERE id = $1";
    sqlx::query_as(query)
        .bind(id)
        .fetch_optional(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn cidrs_for_policy(
    txn: &mut PgConnection,
    policy_id: IpPolicyId,
) -> Result<Vec<IpPolicyCidr>, DatabaseError> {
    let query = "SELECT * FROM quark_ip_policy_cidrs WHERE ip_policy_id = $1";
    sqlx::query_as(query)
        .bind(policy_id)
        .fetch_all(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// The exclusion rows for a subnet's policy, or None when the subnet has no
/// policy attached.
pub async fn cidrs_for_subnet(
    txn: &mut PgConnection,
    subnet: &Subnet,
) -> Result<Option<Vec<IpPolicyCidr>>, DatabaseError> {
    match subnet.ip_policy_id {
        Some(policy_id) => Ok(Some(cidrs_for_policy(txn, policy_id).await?)),
        None => Ok(None),
    }
}

pub async fn delete(txn: &mut PgConnection, id: IpPolicyId) -> Result<(), DatabaseError> {
    let query = "DELETE FROM quark_ip_policies WHERE id = $1";
    sqlx::query(query)
        .bind(id)
        .execute(txn)
        .await
        .map(|_| ())
        .map_err(|e| DatabaseError::query(query, e))
}
