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
use model::ipam_strategy::IpamStrategy;
use model::port::NewPort;

use crate::notifier::AddressEvent;
use crate::tests::common::{
    RecordingNotifier, create_test_env, engine_with_notifier, new_port_id,
};

#[quark_macros::sqlx_test]
async fn deallocation_publishes_exactly_one_delete_event(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.0.0.0/24", &[]).await;
    let notifier = RecordingNotifier::new();
    let ipam = engine_with_notifier(IpamStrategy::Any, notifier.clone());

    let mut addresses = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut addresses, env.request(new_port_id()))
        .await?;
    let address = addresses.pop().unwrap();

    let released = ipam.deallocate_ip_address(&env.ctx, &env.pool, &address).await?;
    assert!(released.deallocated);
    assert!(released.address_type.is_none());

    let deletes: Vec<_> = notifier
        .events()
        .into_iter()
        .filter(|(event, _)| *event == AddressEvent::Deleted)
        .collect();
    assert_eq!(deletes.len(), 1);
    let (_, payload) = &deletes[0];
    assert_eq!(payload.ip_address, address.address.to_string());
    assert_eq!(payload.ip_block_id, address.subnet_id);
    assert!(payload.deleted_at.is_some());

    Ok(())
}

#[quark_macros::sqlx_test]
async fn port_deallocation_spares_shared_addresses(
    pool: sqlx::PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env(pool).await;
    env.add_subnet("10.0.0.0/24", &[]).await;
    let notifier = RecordingNotifier::new();
    let ipam = engine_with_notifier(IpamStrategy::Any, notifier.clone());

    // Two ports; one address each, plus one address shared between them.
    let mut txn = db::Transaction::begin(&env.pool).await?;
    let port_a = db::port::create(
        &env.ctx,
        txn.as_pgconn(),
        NewPort {
            network_id: env.network.id,
            device_id: "device-a",
            name: None,
        },
    )
    .await?;
    let port_b = db::port::create(
        &env.ctx,
        txn.as_pgconn(),
        NewPort {
            network_id: env.network.id,
            device_id: "device-b",
            name: None,
        },
    )
    .await?;
    txn.commit().await?;

    let mut exclusive = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut exclusive, env.request(port_a.id))
        .await?;
    let exclusive = exclusive.pop().unwrap();

    let mut shared = Vec::new();
    ipam.allocate_ip_address(&env.ctx, &env.pool, &mut shared, env.request(port_b.id))
        .await?;
    let shared = shared.pop().unwrap();

    let mut txn = db::Transaction::begin(&env.pool).await?;
    db::port::associate_ip(txn.as_pgconn(), &[port_a.id], exclusive.id, Some(port_a.id)).await?;
    db::port::associate_ip(txn.as_pgconn(), &[port_a.id, port_b.id], shared.id, None).await?;
    txn.commit().await?;

    let mut port = {
        let mut txn = db::Transaction::begin(&env.pool).await?;
        let port = db::port::find_with_addresses(txn.as_pgconn(), port_a.id)
            .await?
            .unwrap();
        txn.commit().await?;
        port
    };
    assert_eq!(port.ip_addresses.len(), 2);

    let removed = ipam
        .deallocate_ips_by_port(&env.ctx, &env.pool, &mut port, None)
        .await?;
    assert_eq!(removed.len(), 2);
    assert!(port.ip_addresses.is_empty());

    // The exclusive address was released; the shared one is still live
    // because port-b still holds it.
    let mut txn = db::Transaction::begin(&env.pool).await?;
    let exclusive_now = db::ip_address::find_one(
        &env.ctx.elevated(),
        txn.as_pgconn(),
        &db::ip_address::IpAddressFilters {
            ids: Some(&[exclusive.id]),
            ..Default::default()
        },
        false,
    )
    .await?
    .unwrap();
    let shared_now = db::ip_address::find_one(
        &env.ctx.elevated(),
        txn.as_pgconn(),
        &db::ip_address::IpAddressFilters {
            ids: Some(&[shared.id]),
            ..Default::default()
        },
        false,
    )
    .await?
    .unwrap();
    txn.commit().await?;

    assert!(exclusive_now.deallocated);
    assert!(!shared_now.deallocated);

    let deletes = notifier
        .events()
        .into_iter()
        .filter(|(event, _)| *event == AddressEvent::Deleted)
        .count();
    assert_eq!(deletes, 1);

    Ok(())
}
