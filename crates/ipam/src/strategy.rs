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
use model::ipam_strategy::IpamStrategy;

use crate::config::IpamConfig;

/// Resolve a strategy by name, falling back to the configured default for
/// unknown names.
pub fn strategy_or_default(name: &str, config: &IpamConfig) -> IpamStrategy {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!(
            requested = name,
            fallback = %config.default_ipam_strategy,
            "IPAM strategy not found, using default"
        );
        config.default_ipam_strategy
    })
}

/// Whether the addresses gathered so far satisfy the strategy.
///
/// `allocate_complete` distinguishes the mid-flight check (after the reuse
/// phase, deciding whether the create phase is still needed) from the final
/// check. BOTH settles for a single version once allocation is complete;
/// BOTH_REQUIRED never settles.
pub fn is_satisfied(
    strategy: IpamStrategy,
    addresses: &[IpAddress],
    allocate_complete: bool,
) -> bool {
    match strategy {
        IpamStrategy::Any => !addresses.is_empty(),
        IpamStrategy::Both => {
            let missing = missing_versions(addresses);
            missing.is_empty() || (missing.len() == 1 && allocate_complete)
        }
        IpamStrategy::BothRequired => missing_versions(addresses).is_empty(),
    }
}

/// IP versions the strategy still needs, given what has been gathered.
pub fn missing_versions(addresses: &[IpAddress]) -> Vec<i32> {
    let mut needed = vec![4, 6];
    for address in addresses {
        needed.retain(|version| *version != address.version);
    }
    needed
}

/// The version constraint of each reuse pass the strategy runs. ANY runs a
/// single unconstrained pass; the dual-stack strategies run one pass per
/// version. The v6 pass always defers to the create path (which has its own
/// reuse-by-find), so in practice only v4 addresses are reclaimed here.
pub(crate) fn reuse_passes(strategy: IpamStrategy) -> &'static [Option<i32>] {
    match strategy {
        IpamStrategy::Any => &[None],
        IpamStrategy::Both | IpamStrategy::BothRequired => &[Some(4), Some(6)],
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use model::ip_address::IpAddress;
    use quark_uuid::ip::IpAddressId;
    use quark_uuid::network::{NetworkId, SubnetId};

    use super::*;

    fn address(version: i32) -> IpAddress {
        IpAddress {
            id: IpAddressId::from(uuid::Uuid::new_v4()),
            address: if version == 4 {
                "10.0.0.1".parse().unwrap()
            } else {
                "2001:db8::1".parse().unwrap()
            },
            version,
            subnet_id: SubnetId::from(uuid::Uuid::new_v4()),
            network_id: NetworkId::from(uuid::Uuid::new_v4()),
            used_by_tenant_id: "tenant".to_string(),
            address_type: None,
            allocated_at: Utc::now(),
            created_at: Utc::now(),
            deallocated: false,
            deallocated_at: None,
            transaction_id: None,
        }
    }

    #[test]
    fn test_any_wants_one_address() {
        assert!(!is_satisfied(IpamStrategy::Any, &[], false));
        assert!(is_satisfied(IpamStrategy::Any, &[address(4)], false));
        assert!(is_satisfied(IpamStrategy::Any, &[address(6)], true));
    }

    #[test]
    fn test_both_settles_once_allocation_is_complete() {
        let v4 = [address(4)];
        let dual = [address(4), address(6)];
        assert!(!is_satisfied(IpamStrategy::Both, &[], false));
        assert!(!is_satisfied(IpamStrategy::Both, &v4, false));
        assert!(is_satisfied(IpamStrategy::Both, &v4, true));
        assert!(is_satisfied(IpamStrategy::Both, &dual, false));
    }

    #[test]
    fn test_both_required_never_settles() {
        let v4 = [address(4)];
        let dual = [address(4), address(6)];
        assert!(!is_satisfied(IpamStrategy::BothRequired, &v4, true));
        assert!(is_satisfied(IpamStrategy::BothRequired, &dual, false));
    }

    #[test]
    fn test_unknown_strategy_falls_back_to_default() {
        let config = IpamConfig {
            default_ipam_strategy: IpamStrategy::Both,
            ..Default::default()
        };
        assert_eq!(strategy_or_default("BOTH_REQUIRED", &config), IpamStrategy::BothRequired);
        assert_eq!(strategy_or_default("NEITHER", &config), IpamStrategy::Both);
    }
}
