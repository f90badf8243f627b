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
use std::sync::{Arc, Mutex};

use db::Context;
use db::ip_policy::NewIpPolicy;
use ipnetwork::IpNetwork;
use model::ipam_strategy::IpamStrategy;
use model::network::{Network, NewNetwork};
use model::subnet::{NewSubnet, Subnet};
use quark_uuid::mac::MacAddressRangeId;
use quark_uuid::network::NetworkId;
use quark_uuid::port::PortId;
use sqlx::PgPool;

use crate::config::IpamConfig;
use crate::engine::{IpAllocateRequest, QuarkIpam};
use crate::notifier::{AddressEvent, AddressEventPayload, LogNotifier, Notifier};

pub(crate) const TENANT: &str = "tenant-a";

/// Ids created by the `base_network` fixture.
pub(crate) const FIXTURE_NETWORK_ID: &str = "91609f10-c91d-470d-a260-6293ea0c1200";
pub(crate) const FIXTURE_MAC_RANGE_ID: &str = "91609f10-c91d-470d-a260-6293ea0c1201";

pub(crate) struct TestEnv {
    pub pool: PgPool,
    pub ctx: Context,
    pub network: Network,
}

pub(crate) async fn create_test_env(pool: PgPool) -> TestEnv {
    let ctx = Context::new(TENANT);
    let mut txn = db::Transaction::begin(&pool).await.unwrap();
    let network = db::network::create(&ctx, txn.as_pgconn(), NewNetwork { name: Some("test") })
        .await
        .unwrap();
    txn.commit().await.unwrap();
    TestEnv { pool, ctx, network }
}

impl TestEnv {
    /// Add a subnet to the environment's network, optionally guarded by a
    /// policy excluding the given CIDRs.
    pub(crate) async fn add_subnet(&self, cidr: &str, exclude: &[&str]) -> Subnet {
        let mut txn = db::Transaction::begin(&self.pool).await.unwrap();
        let ip_policy_id = if exclude.is_empty() {
            None
        } else {
            let exclude: Vec<IpNetwork> = exclude.iter().map(|c| c.parse().unwrap()).collect();
            let policy = db::ip_policy::create(
                &self.ctx,
                txn.as_pgconn(),
                NewIpPolicy {
                    name: None,
                    exclude: &exclude,
                },
            )
            .await
            .unwrap();
            Some(policy.id)
        };

        let mut new_subnet = NewSubnet::for_network(self.network.id, cidr.parse().unwrap());
        new_subnet.ip_policy_id = ip_policy_id;
        let subnet = db::subnet::create(&self.ctx, txn.as_pgconn(), new_subnet)
            .await
            .unwrap();
        txn.commit().await.unwrap();
        subnet
    }

    /// Insert a MAC range with explicit bounds. Ranges with non-power-of-2
    /// sizes can't be written as a cidr, so this goes straight to SQL.
    pub(crate) async fn insert_mac_range(
        &self,
        first: i64,
        last: i64,
        do_not_use: bool,
    ) -> MacAddressRangeId {
        let id = MacAddressRangeId::from(uuid::Uuid::new_v4());
        sqlx::query(
            "INSERT INTO quark_mac_address_ranges \
             (id, cidr, first_address, last_address, next_auto_assign_mac, do_not_use) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(format!("{first:x}-{last:x}"))
        .bind(first)
        .bind(last)
        .bind(first)
        .bind(do_not_use)
        .execute(&self.pool)
        .await
        .unwrap();
        id
    }

    pub(crate) fn request(&self, port_id: PortId) -> IpAllocateRequest {
        IpAllocateRequest::new(self.network.id, port_id, 0)
    }

    pub(crate) fn network_id(&self) -> NetworkId {
        self.network.id
    }
}

pub(crate) fn new_port_id() -> PortId {
    PortId::from(uuid::Uuid::new_v4())
}

pub(crate) fn test_engine(strategy: IpamStrategy) -> QuarkIpam {
    QuarkIpam::new(IpamConfig::default(), strategy, Arc::new(LogNotifier))
}

pub(crate) fn engine_with_notifier(
    strategy: IpamStrategy,
    notifier: Arc<dyn Notifier>,
) -> QuarkIpam {
    QuarkIpam::new(IpamConfig::default(), strategy, notifier)
}

/// A notifier that records every event for assertions.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<(AddressEvent, AddressEventPayload)>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<(AddressEvent, AddressEventPayload)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, event: AddressEvent, payload: AddressEventPayload) {
        self.events.lock().unwrap().push((event, payload));
    }
}
