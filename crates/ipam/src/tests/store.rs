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

//! Store-adapter coverage that doesn't need the full allocation engine.

use db::ip_address::IpAddressFilters;
use db::network::NetworkFilters;
use db::{Context, ObjectColumnFilter, ProviderNetworks, SafePgPool};
use model::ipam_strategy::IpamStrategy;
use model::network::NewNetwork;
use model::port::NewPort;

use crate::tests::common::{TENANT, create_test_env, new_port_id, test_engine};

#[quark_macros::sqlx_test]
async fn subnet_filters_and_pool_cache(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    let subnet = env.add_subnet("10.0.0.0/24", &[]).await;

    let mut txn = db::Transaction::begin(&env.pool).await?;
    let found = db::subnet::find_by(
        txn.as_pgconn(),
        ObjectColumnFilter::One(db::subnet::NetworkIdColumn, &env.network.id),
    )
    .await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, subnet.id);

    let cache = serde_json::json!({"pools": [{"start": "10.0.0.1", "end": "10.0.0.254"}]});
    db::subnet::set_allocation_pool_cache(txn.as_pgconn(), subnet.id, Some(cache.clone())).await?;
    let refreshed = db::subnet::find(txn.as_pgconn(), subnet.id).await?;
    assert_eq!(refreshed.allocation_pool_cache, Some(cache));

    db::subnet::set_allocation_pool_cache(txn.as_pgconn(), subnet.id, None).await?;
    let refreshed = db::subnet::find(txn.as_pgconn(), subnet.id).await?;
    assert!(refreshed.allocation_pool_cache.is_none());
    txn.commit().await?;

    Ok(())
}

#[quark_macros::sqlx_test]
async fn shared_networks_are_visible_across_tenants(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;

    // An operator-owned network, made assignable through the strategy.
    let operator = Context::admin("operator");
    let mut txn = db::Transaction::begin(&env.pool).await?;
    let shared = db::network::create(&operator, txn.as_pgconn(), NewNetwork { name: Some("public") })
        .await?;
    txn.commit().await?;

    let strategy = ProviderNetworks::new([shared.id]);
    let other = Context::new("tenant-b");

    let mut txn = db::Transaction::begin(&env.pool).await?;
    // Unscoped: tenant-b owns nothing, but the shared network shows up
    // when asked for by id.
    let filters = NetworkFilters {
        ids: Some(&[shared.id, env.network.id]),
        shared: None,
    };
    let visible = db::network::find(&other, txn.as_pgconn(), &strategy, &filters).await?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, shared.id);

    // shared=true returns exactly the assignable set.
    let filters = NetworkFilters {
        ids: None,
        shared: Some(true),
    };
    let visible = db::network::find(&other, txn.as_pgconn(), &strategy, &filters).await?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, shared.id);

    // shared=false hides the provider network even from its owner's view.
    let filters = NetworkFilters {
        ids: None,
        shared: Some(false),
    };
    let visible = db::network::find(&env.ctx, txn.as_pgconn(), &strategy, &filters).await?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, env.network.id);

    assert_eq!(db::network::count_all(&env.ctx, txn.as_pgconn()).await?, 1);
    txn.commit().await?;

    Ok(())
}

#[quark_macros::sqlx_test]
async fn address_lookup_by_device_and_port(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.0.0.0/24", &[]).await;
    let ipam = test_engine(IpamStrategy::Any);

    let mut txn = db::Transaction::begin(&env.pool).await?;
    let port = db::port::create(
        &env.ctx,
        txn.as_pgconn(),
        NewPort {
            network_id: env.network.id,
            device_id: "device-x",
            name: Some("eth0"),
        },
    )
    .await?;
    txn.commit().await?;

    let mut addresses = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, env.request(port.id))
        .await?;
    let address = addresses.pop().unwrap();

    let mut txn = db::Transaction::begin(&env.pool).await?;
    db::port::associate_ip(txn.as_pgconn(), &[port.id], address.id, Some(port.id)).await?;

    let by_device = db::ip_address::find_all(
        &env.ctx,
        txn.as_pgconn(),
        &IpAddressFilters {
            device_ids: Some(&["device-x"]),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(by_device.len(), 1);
    assert_eq!(by_device[0].id, address.id);

    let by_port = db::ip_address::find_all(
        &env.ctx,
        txn.as_pgconn(),
        &IpAddressFilters {
            port_id: Some(port.id),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(by_port.len(), 1);

    let device_ids = db::port::device_ids_for_address(txn.as_pgconn(), address.id).await?;
    assert_eq!(device_ids, vec!["device-x".to_string()]);

    let ports = db::port::find_by(
        txn.as_pgconn(),
        ObjectColumnFilter::One(db::port::DeviceIdColumn, &"device-x"),
    )
    .await?;
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].id, port.id);

    let ports = db::port::find_by(
        txn.as_pgconn(),
        ObjectColumnFilter::One(db::port::NameColumn, &"eth0"),
    )
    .await?;
    assert_eq!(ports.len(), 1);
    txn.commit().await?;

    Ok(())
}

#[quark_macros::sqlx_test]
async fn policy_updates_recompute_size(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    let subnet = env.add_subnet("10.0.0.0/29", &["10.0.0.0/32"]).await;
    let policy_id = subnet.ip_policy_id.unwrap();

    let mut txn = db::Transaction::begin(&env.pool).await?;
    let policy = db::ip_policy::find(txn.as_pgconn(), policy_id).await?.unwrap();
    assert_eq!(policy.size, 1);

    let exclude = vec![
        "10.0.0.0/32".parse().unwrap(),
        "10.0.0.6/31".parse().unwrap(),
    ];
    db::ip_policy::update_exclusions(txn.as_pgconn(), policy_id, &exclude).await?;

    let policy = db::ip_policy::find(txn.as_pgconn(), policy_id).await?.unwrap();
    assert_eq!(policy.size, 3);
    let cidrs = db::ip_policy::cidrs_for_policy(txn.as_pgconn(), policy_id).await?;
    assert_eq!(cidrs.len(), 2);
    txn.commit().await?;

    Ok(())
}

#[quark_macros::sqlx_test]
async fn security_group_round_trip(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;

    let mut txn = db::Transaction::begin(&env.pool).await?;
    let group =
        db::security_group::create(&env.ctx, txn.as_pgconn(), "web", Some("http ingress")).await?;
    let rule = db::security_group::create_rule(
        &env.ctx,
        txn.as_pgconn(),
        db::security_group::NewSecurityGroupRule {
            group_id: group.id,
            direction: "ingress".to_string(),
            ethertype: 4,
            protocol: Some(6),
            port_range_min: Some(80),
            port_range_max: Some(80),
        },
    )
    .await?;

    let groups = db::security_group::find_for_tenant(&env.ctx, txn.as_pgconn()).await?;
    assert_eq!(groups.len(), 1);
    let rules = db::security_group::rules_for_group(txn.as_pgconn(), group.id).await?;
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, rule.id);
    assert_eq!(rules[0].tenant_id, TENANT);

    db::security_group::delete(txn.as_pgconn(), group.id).await?;
    let rules = db::security_group::rules_for_group(txn.as_pgconn(), group.id).await?;
    assert!(rules.is_empty());
    txn.commit().await?;

    Ok(())
}

#[quark_macros::sqlx_test]
async fn claim_tokens_are_swept_by_age(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.0.0.0/24", &[]).await;
    let ipam = test_engine(IpamStrategy::Any);

    // Allocation mints claim tokens as a side effect.
    let mut addresses = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, env.request(new_port_id()))
        .await?;

    let mut safe_pool = SafePgPool::from(env.pool.clone());
    let swept = safe_pool
        .with_txn(|txn| {
            Box::pin(async move {
                // Tokens younger than an hour survive; age zero sweeps all.
                let swept_early = db::transactions::delete_older_than(txn, 3600).await?;
                assert_eq!(swept_early, 0);
                db::transactions::delete_older_than(txn, 0).await
            })
        })
        .await??;
    assert!(swept >= 1);

    Ok(())
}
