/*
 * SPDX-FileCopyrightText: Copyright (c) 2025-2026 OpenStack Foundation. All rights reserved.
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

use db::ip_address::IpAddressFilters;
use model::ip_address::IpAddress;
use model::ipam_strategy::IpamStrategy;

use crate::tests::common::{TestEnv, create_test_env, new_port_id, test_engine};

async fn allocate_one(env: &TestEnv, ipam: &crate::QuarkIpam) -> IpAddress {
    let mut addresses = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, env.request(new_port_id()))
        .await
        .unwrap();
    addresses.pop().unwrap()
}

#[quark_macros::sqlx_test]
async fn deallocated_address_is_reused(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.0.0.0/29", &["10.0.0.0/32", "10.0.0.7/32"])
        .await;
    let ipam = test_engine(IpamStrategy::Any);

    for _ in 0..3 {
        allocate_one(&env, &ipam).await;
    }
    let third: IpAddr = "10.0.0.3".parse().unwrap();

    let mut txn = db::Transaction::begin(&env.pool).await?;
    let filters = IpAddressFilters {
        address: Some(third),
        ..Default::default()
    };
    let victim = db::ip_address::find_one(&env.ctx, txn.as_pgconn(), &filters, false)
        .await?
        .expect("10.0.0.3 should have been allocated");
    txn.commit().await?;

    let released = ipam.deallocate_ip_address(&env.ctx, &env.pool, &victim).await?;
    assert!(released.deallocated);
    assert!(released.deallocated_at.is_some());

    // With reuse_after=0 the deallocated address comes back immediately,
    // with a fresh allocation stamp.
    let reused = allocate_one(&env, &ipam).await;
    assert_eq!(reused.address, third);
    assert!(!reused.deallocated);
    assert!(reused.deallocated_at.is_none());
    assert!(reused.allocated_at > victim.allocated_at);
    assert!(reused.transaction_id.is_some());

    Ok(())
}

#[quark_macros::sqlx_test]
async fn reuse_respects_the_reuse_window(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.0.0.0/28", &[]).await;
    let ipam = test_engine(IpamStrategy::Any);

    let first = allocate_one(&env, &ipam).await;
    ipam.deallocate_ip_address(&env.ctx, &env.pool, &first).await?;

    // An hour-long reuse window means the just-released address must not
    // be reclaimed; a new one is created instead.
    let mut request = env.request(new_port_id());
    request.reuse_after = 3600;
    let mut addresses = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, request)
        .await?;
    assert_eq!(addresses.len(), 1);
    assert_ne!(addresses[0].address, first.address);

    Ok(())
}

#[quark_macros::sqlx_test]
async fn reuse_is_scoped_to_the_tenant(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.0.0.0/28", &[]).await;
    let ipam = test_engine(IpamStrategy::Any);

    let address = allocate_one(&env, &ipam).await;

    // A different, non-admin tenant sees nothing without an explicit
    // tenant filter; elevated contexts see everything.
    let other = db::Context::new("tenant-b");
    let mut txn = db::Transaction::begin(&env.pool).await?;
    let visible =
        db::ip_address::find_all(&other, txn.as_pgconn(), &IpAddressFilters::default()).await?;
    assert!(visible.is_empty());

    let visible =
        db::ip_address::find_all(&other.elevated(), txn.as_pgconn(), &IpAddressFilters::default())
            .await?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, address.id);
    txn.commit().await?;

    Ok(())
}
