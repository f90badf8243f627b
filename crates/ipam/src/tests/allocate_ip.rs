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
use std::collections::BTreeSet;
use std::net::IpAddr;

use model::ipam_strategy::IpamStrategy;

use crate::IpamError;
use crate::tests::common::{create_test_env, new_port_id, test_engine};

#[quark_macros::sqlx_test]
async fn sequential_allocation_fills_the_subnet(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.0.0.0/29", &["10.0.0.0/32", "10.0.0.7/32"])
        .await;
    let ipam = test_engine(IpamStrategy::Any);

    // The policy excludes the network and "broadcast" addresses, leaving
    // .1 through .6 allocatable, in order.
    for expected_octet in 1..=6u8 {
        let mut addresses = Vec::new();
        ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, env.request(new_port_id()))
            .await?;
        assert_eq!(addresses.len(), 1);
        let expected: IpAddr = format!("10.0.0.{expected_octet}").parse().unwrap();
        assert_eq!(addresses[0].address, expected);
        assert!(!addresses[0].deallocated);
    }

    // The subnet is exhausted now.
    let mut addresses = Vec::new();
    let result = ipam
        .allocate_ip_address(&env.ctx, &env.pool, &mut addresses, env.request(new_port_id()))
        .await;
    assert!(matches!(
        result,
        Err(IpamError::IpAddressGenerationFailure { .. })
    ));

    Ok(())
}

#[quark_macros::sqlx_test]
async fn concurrent_allocations_never_collide(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.1.0.0/28", &[]).await;
    let ipam = test_engine(IpamStrategy::Any);

    let allocate = || async {
        let mut addresses = Vec::new();
        ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, env.request(new_port_id()))
            .await
            .map(|_| addresses)
    };

    let (a, b, c, d) = tokio::join!(allocate(), allocate(), allocate(), allocate());
    let all: Vec<IpAddr> = [a?, b?, c?, d?]
        .into_iter()
        .flatten()
        .map(|address| address.address)
        .collect();

    let distinct: BTreeSet<IpAddr> = all.iter().copied().collect();
    assert_eq!(all.len(), 4);
    assert_eq!(distinct.len(), 4, "allocated addresses must be unique");

    Ok(())
}

#[quark_macros::sqlx_test]
async fn explicit_address_is_honored(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.2.0.0/24", &[]).await;
    let ipam = test_engine(IpamStrategy::Any);

    let wanted: IpAddr = "10.2.0.77".parse().unwrap();
    let mut request = env.request(new_port_id());
    request.ip_addresses = vec![wanted];

    let mut addresses = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, request)
        .await?;
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].address, wanted);

    Ok(())
}

#[quark_macros::sqlx_test]
async fn explicit_address_conflict_is_terminal(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.3.0.0/24", &[]).await;
    let ipam = test_engine(IpamStrategy::Any);

    let wanted: IpAddr = "10.3.0.5".parse().unwrap();
    let mut request = env.request(new_port_id());
    request.ip_addresses = vec![wanted];
    let mut addresses = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, request)
        .await?;

    let mut request = env.request(new_port_id());
    request.ip_addresses = vec![wanted];
    let mut addresses = Vec::new();
    let result = ipam
        .allocate_ip_address(&env.ctx, &env.pool, &mut addresses, request)
        .await;
    assert!(matches!(result, Err(IpamError::IpAddressInUse { ip, .. }) if ip == wanted));

    Ok(())
}

#[quark_macros::sqlx_test]
async fn policy_excluded_addresses_are_never_created(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.4.0.0/29", &["10.4.0.0/30"]).await;
    let ipam = test_engine(IpamStrategy::Any);

    // Only .4 through .7 are allocatable; every allocation must avoid the
    // excluded half.
    for _ in 0..4 {
        let mut addresses = Vec::new();
        ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, env.request(new_port_id()))
            .await?;
        let octet = match addresses[0].address {
            IpAddr::V4(v4) => v4.octets()[3],
            _ => panic!("expected a v4 address"),
        };
        assert!(octet >= 4, "allocated {octet} despite policy");
    }

    Ok(())
}
