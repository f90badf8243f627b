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

//! IPv6 interface-id generation: RFC 2462 (modified EUI-64 from the port
//! MAC) and RFC 3041 style pseudo-random interface ids seeded from the port
//! id. The generator is an infinite iterator; callers bound it themselves.

use ipnetwork::IpNetwork;
use mac_address::MacAddress;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use uuid::Uuid;

use crate::ip::address::ip_to_int;

/// `::0200:0:0:0` — XORed into every generated address to flip the
/// universal/local bit of the interface id (RFC 2462 section 5.5.3 by way of
/// RFC 4291 appendix A).
pub const UL_FLIP_MAGIC: u128 = 0x0200_0000_0000_0000;

/// The modified EUI-64 interface id of a MAC: the two halves of the EUI-48
/// with FF:FE stitched in between.
pub fn eui64(mac: &MacAddress) -> u64 {
    let [a, b, c, d, e, f] = mac.bytes();
    u64::from_be_bytes([a, b, c, 0xFF, 0xFE, d, e, f])
}

/// The RFC 2462 stateless autoconfiguration address for a MAC inside a
/// subnet: network base plus modified EUI-64, with the universal/local bit
/// flipped.
pub fn rfc2462_ip(mac: &MacAddress, cidr: &IpNetwork) -> u128 {
    let mut value = ip_to_int(cidr.network());
    value += eui64(mac) as u128;
    value ^= UL_FLIP_MAGIC;
    value
}

/// A lazy, infinite stream of candidate v6 addresses for one port.
///
/// The first candidate is the RFC 2462 address when a MAC is available (an
/// address created outside a port context has no MAC to derive from). After
/// that the stream is RFC 3041 style: network base plus 64 pseudo-random
/// bits. The RNG is seeded from the port id, so two generators built from
/// the same (mac, port_id, cidr) yield identical sequences — that is the
/// only determinism the allocation engine relies on, and it is what lets a
/// retry re-discover an address it previously created.
pub struct V6AddressGenerator {
    rfc2462: Option<u128>,
    base: u128,
    rng: StdRng,
}

impl V6AddressGenerator {
    pub fn new(mac: Option<&MacAddress>, port_id: Uuid, cidr: &IpNetwork) -> Self {
        let mut seed = [0u8; 32];
        seed[..16].copy_from_slice(port_id.as_bytes());
        seed[16..].copy_from_slice(port_id.as_bytes());
        Self {
            rfc2462: mac.map(|m| rfc2462_ip(m, cidr)),
            base: ip_to_int(cidr.network()),
            rng: StdRng::from_seed(seed),
        }
    }
}

impl Iterator for V6AddressGenerator {
    type Item = u128;

    fn next(&mut self) -> Option<u128> {
        if let Some(first) = self.rfc2462.take() {
            return Some(first);
        }
        let mut value = self.base + self.rng.next_u64() as u128;
        value ^= UL_FLIP_MAGIC;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::ip::address::int_to_v6;

    fn test_cidr() -> IpNetwork {
        IpNetwork::from_str("2001:db8::/64").unwrap()
    }

    fn test_mac() -> MacAddress {
        MacAddress::from_str("52:54:00:12:34:56").unwrap()
    }

    #[test]
    fn test_eui64_inserts_fffe() {
        assert_eq!(eui64(&test_mac()), 0x5254_00FF_FE12_3456);
    }

    #[test]
    fn test_rfc2462_flips_universal_local_bit() {
        let value = rfc2462_ip(&test_mac(), &test_cidr());
        let expected: std::net::Ipv6Addr = "2001:db8::5054:ff:fe12:3456".parse().unwrap();
        assert_eq!(int_to_v6(value), expected);
    }

    #[test]
    fn test_first_candidate_is_slaac_when_mac_present() {
        let mac = test_mac();
        let port_id = Uuid::from_str("91609f10-c91d-470d-a260-6293ea0c1200").unwrap();
        let mut generator = V6AddressGenerator::new(Some(&mac), port_id, &test_cidr());
        assert_eq!(generator.next(), Some(rfc2462_ip(&mac, &test_cidr())));
    }

    #[test]
    fn test_generator_is_deterministic_per_port() {
        let mac = test_mac();
        let port_id = Uuid::new_v4();
        let first: Vec<u128> = V6AddressGenerator::new(Some(&mac), port_id, &test_cidr())
            .take(64)
            .collect();
        let second: Vec<u128> = V6AddressGenerator::new(Some(&mac), port_id, &test_cidr())
            .take(64)
            .collect();
        assert_eq!(first, second);

        let other_port: Vec<u128> = V6AddressGenerator::new(Some(&mac), Uuid::new_v4(), &test_cidr())
            .take(64)
            .collect();
        assert_ne!(first[1..], other_port[1..]);
    }

    #[test]
    fn test_generated_addresses_stay_in_subnet() {
        let cidr = test_cidr();
        for value in V6AddressGenerator::new(None, Uuid::new_v4(), &cidr).take(256) {
            let addr = int_to_v6(value);
            match cidr {
                IpNetwork::V6(net) => assert!(net.contains(addr)),
                _ => unreachable!(),
            }
        }
    }
}
