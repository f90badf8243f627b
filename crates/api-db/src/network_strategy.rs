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

use quark_uuid::network::NetworkId;

/// Resolver for provider ("shared") networks: networks owned by the
/// operator but assignable to every tenant. Network lookups consult this to
/// expand an id list into tenant-owned ids plus shared defaults.
pub trait NetworkStrategy: Send + Sync {
    /// Split a caller-supplied id list into (tenant network ids, shared
    /// network ids).
    fn split_network_ids(&self, ids: &[NetworkId]) -> (Vec<NetworkId>, Vec<NetworkId>) {
        let assignable: BTreeSet<NetworkId> = self.assignable_networks().into_iter().collect();
        let (shared, tenant) = ids.iter().copied().partition(|id| assignable.contains(id));
        (tenant, shared)
    }

    /// Every shared network id visible to all tenants.
    fn assignable_networks(&self) -> Vec<NetworkId>;
}

/// The static strategy: shared networks are listed in service
/// configuration.
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct ProviderNetworks {
    #[serde(default)]
    networks: BTreeSet<NetworkId>,
}

impl ProviderNetworks {
    pub fn new(networks: impl IntoIterator<Item = NetworkId>) -> Self {
        Self {
            networks: networks.into_iter().collect(),
        }
    }

    pub fn from_json(config: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(config)
    }
}

impl NetworkStrategy for ProviderNetworks {
    fn assignable_networks(&self) -> Vec<NetworkId> {
        self.networks.iter().copied().collect()
    }
}
