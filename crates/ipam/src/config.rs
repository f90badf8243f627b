/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2025 OpenStack Foundation. All rights reserved.
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

/// The `[quark]` section of the service configuration. Every field has a
/// default so an empty section is a valid configuration.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct IpamConfig {
    /// Number of times to retry generating v6 addresses before failure.
    /// Also implicitly controls how many v6 addresses we assign to any
    /// port, as the random values generated will be the same every time.
    pub v6_allocation_attempts: u32,

    /// Number of times to attempt to allocate a new MAC address before
    /// giving up.
    pub mac_address_retry_max: u32,

    /// Number of times to attempt to allocate a new IP address before
    /// giving up.
    pub ip_address_retry_max: u32,

    /// Serialize contending allocations within this process through named
    /// locks. Advisory only; cross-process correctness never depends on it.
    pub ipam_use_synchronization: bool,

    /// The strategy used when a request names an unknown one.
    pub default_ipam_strategy: IpamStrategy,
}

impl Default for IpamConfig {
    fn default() -> Self {
        Self {
            v6_allocation_attempts: 10,
            mac_address_retry_max: 20,
            ip_address_retry_max: 20,
            ipam_use_synchronization: false,
            default_ipam_strategy: IpamStrategy::Any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_section_is_valid() {
        let config: IpamConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.v6_allocation_attempts, 10);
        assert_eq!(config.mac_address_retry_max, 20);
        assert_eq!(config.ip_address_retry_max, 20);
        assert!(!config.ipam_use_synchronization);
        assert_eq!(config.default_ipam_strategy, IpamStrategy::Any);
    }

    #[test]
    fn test_overrides_deserialize() {
        let config: IpamConfig =
            serde_json::from_str(r#"{"ip_address_retry_max": 3, "default_ipam_strategy": "BOTH"}"#)
                .unwrap();
        assert_eq!(config.ip_address_retry_max, 3);
        assert_eq!(config.default_ipam_strategy, IpamStrategy::Both);
    }
}
