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
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

// These are part of our public API because of the conversion traits.
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};

//
// Type definitions
//

/// An IP prefix: 0 or more leading address bits with the remainder being
/// "don't-care". This uses the ipnet network types internally but is stricter
/// about what can be stored: all bits after the prefix must be zero, so a
/// prefix can never be confused with an interface address.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum IpPrefix {
    V4(Ipv4Prefix),
    V6(Ipv6Prefix),
}

impl IpPrefix {
    pub fn contains<P: ToPrefix>(&self, other: P) -> bool {
        let other = other.to_prefix();
        use IpPrefix::*;
        match (self, &other) {
            (V4(prefix), V4(other_prefix)) => prefix.contains(other_prefix),
            (V6(prefix), V6(other_prefix)) => prefix.contains(other_prefix),
            _ => false,
        }
    }

    pub fn get_sibling(&self) -> Option<Self> {
        use IpPrefix::*;
        match self {
            V4(ipv4_prefix) => ipv4_prefix.get_sibling().map(V4),
            V6(ipv6_prefix) => ipv6_prefix.get_sibling().map(V6),
        }
    }

    pub fn get_last_subprefix(&self) -> Self {
        use IpPrefix::*;
        match self {
            V4(ipv4_prefix) => V4(ipv4_prefix.get_last_subprefix()),
            V6(ipv6_prefix) => V6(ipv6_prefix.get_last_subprefix()),
        }
    }

    pub fn try_aggregate(&self, other: &Self) -> Option<Self> {
        use IpPrefix::*;
        match (self, other) {
            (V4(p1), V4(p2)) => p1.try_aggregate(p2).map(V4),
            (V6(p1), V6(p2)) => p1.try_aggregate(p2).map(V6),
            _ => None,
        }
    }

    /// Number of addresses this prefix covers. Saturates for a v6 `::/0`.
    pub fn num_addresses(&self) -> u128 {
        match self {
            IpPrefix::V4(p) => 1u128 << (32 - p.prefix.prefix_len()),
            IpPrefix::V6(p) => {
                let host_bits = 128 - p.prefix.prefix_len();
                if host_bits >= 128 {
                    u128::MAX
                } else {
                    1u128 << host_bits
                }
            }
        }
    }
}

/// A representation of an IPv4 prefix. The bits after the end of the length of
/// the prefix are guaranteed to be zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct Ipv4Prefix {
    prefix: Ipv4Net,
}

impl Ipv4Prefix {
    pub fn contains(&self, other: &Self) -> bool {
        self.prefix.contains(&other.prefix)
    }

    pub fn get_sibling(&self) -> Option<Self> {
        let prefix_length = self.prefix.prefix_len();
        match prefix_length {
            0 => None,
            n @ (1..=32) => {
                // We just need to flip the last prefix bit.
                let addr_bits = self.prefix.addr().to_bits();
                let single_bit_flip = 0x1u32 << (32 - n);
                let sibling_addr = Ipv4Addr::from_bits(addr_bits ^ single_bit_flip);
                Some(Self {
                    prefix: Ipv4Net::new_assert(sibling_addr, prefix_length),
                })
            }
            _ => unreachable!(),
        }
    }

    /// Get the final and smallest sub-prefix of this prefix. This is
    /// equivalent to the all-ones address converted to a /32.
    pub fn get_last_subprefix(&self) -> Self {
        Self {
            prefix: Ipv4Net::new_assert(self.prefix.broadcast(), 32),
        }
    }

    pub fn try_aggregate(&self, other: &Self) -> Option<Self> {
        match (self, other, self.prefix.supernet(), other.prefix.supernet()) {
            // If one prefix contains the other, return the containing prefix.
            (p1, p2, _, _) if p1.contains(p2) => Some(*p1),
            (p1, p2, _, _) if p2.contains(p1) => Some(*p2),
            // If both prefixes have the same supernet, we can aggregate them
            // into that supernet.
            (_, _, Some(super1), Some(super2)) if super1 == super2 => Some(Self { prefix: super1 }),
            _ => None,
        }
    }

    pub fn into_inner(self) -> Ipv4Net {
        let Self { prefix } = self;
        prefix
    }
}

/// A representation of an IPv6 prefix. The bits after the end of the length of
/// the prefix are guaranteed to be zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct Ipv6Prefix {
    prefix: Ipv6Net,
}

impl Ipv6Prefix {
    pub fn contains(&self, other: &Self) -> bool {
        self.prefix.contains(&other.prefix)
    }

    pub fn get_sibling(&self) -> Option<Self> {
        let prefix_length = self.prefix.prefix_len();
        match prefix_length {
            0 => None,
            n if n <= 128 => {
                // We just need to flip the last prefix bit.
                let addr_bits = self.prefix.addr().to_bits();
                let single_bit_flip = 0x1u128 << (128 - n);
                let sibling_addr = Ipv6Addr::from_bits(addr_bits ^ single_bit_flip);
                Some(Self {
                    prefix: Ipv6Net::new_assert(sibling_addr, prefix_length),
                })
            }
            _ => unreachable!(),
        }
    }

    /// Get the final and smallest sub-prefix of this prefix. This is
    /// equivalent to the all-ones address converted to a /128.
    pub fn get_last_subprefix(&self) -> Self {
        Self {
            prefix: Ipv6Net::new_assert(self.prefix.broadcast(), 128),
        }
    }

    pub fn try_aggregate(&self, other: &Self) -> Option<Self> {
        match (self, other, self.prefix.supernet(), other.prefix.supernet()) {
            // If one prefix contains the other, return the containing prefix.
            (p1, p2, _, _) if p1.contains(p2) => Some(*p1),
            (p1, p2, _, _) if p2.contains(p1) => Some(*p2),
            // If both prefixes have the same supernet, we can aggregate them
            // into that supernet.
            (_, _, Some(super1), Some(super2)) if super1 == super2 => Some(Self { prefix: super1 }),
            _ => None,
        }
    }

    pub fn into_inner(self) -> Ipv6Net {
        let Self { prefix } = self;
        prefix
    }
}

//
// Errors
//

#[derive(thiserror::Error, Debug)]
pub enum PrefixError {
    #[error("could not parse prefix: {0}")]
    Parse(#[from] ipnet::AddrParseError),

    #[error("prefix {0} has host bits set")]
    HostBitsSet(IpNet),
}

//
// Conversions
//

/// Anything that covers a well-defined piece of address space can be turned
/// into a prefix. Host addresses become a /32 or /128.
pub trait ToPrefix {
    fn to_prefix(&self) -> IpPrefix;
}

impl ToPrefix for IpPrefix {
    fn to_prefix(&self) -> IpPrefix {
        *self
    }
}

impl ToPrefix for Ipv4Addr {
    fn to_prefix(&self) -> IpPrefix {
        IpPrefix::V4(Ipv4Prefix {
            prefix: Ipv4Net::new_assert(*self, 32),
        })
    }
}

impl ToPrefix for Ipv6Addr {
    fn to_prefix(&self) -> IpPrefix {
        IpPrefix::V6(Ipv6Prefix {
            prefix: Ipv6Net::new_assert(*self, 128),
        })
    }
}

impl ToPrefix for IpAddr {
    fn to_prefix(&self) -> IpPrefix {
        match self {
            IpAddr::V4(v4) => v4.to_prefix(),
            IpAddr::V6(v6) => v6.to_prefix(),
        }
    }
}

impl ToPrefix for ipnetwork::IpNetwork {
    // Host bits are dropped here: the prefix covers the network the value
    // describes, whatever interface address it was written with.
    fn to_prefix(&self) -> IpPrefix {
        match self {
            ipnetwork::IpNetwork::V4(net) => IpPrefix::V4(Ipv4Prefix {
                prefix: Ipv4Net::new_assert(net.network(), net.prefix()),
            }),
            ipnetwork::IpNetwork::V6(net) => IpPrefix::V6(Ipv6Prefix {
                prefix: Ipv6Net::new_assert(net.network(), net.prefix()),
            }),
        }
    }
}

impl<T: ToPrefix> ToPrefix for &T {
    fn to_prefix(&self) -> IpPrefix {
        (**self).to_prefix()
    }
}

impl FromStr for IpPrefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let net = IpNet::from_str(s)?;
        if net.addr() != net.network() {
            return Err(PrefixError::HostBitsSet(net));
        }
        Ok(match net {
            IpNet::V4(v4) => IpPrefix::V4(Ipv4Prefix { prefix: v4 }),
            IpNet::V6(v6) => IpPrefix::V6(Ipv6Prefix { prefix: v6 }),
        })
    }
}

impl Display for IpPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpPrefix::V4(p) => p.prefix.fmt(f),
            IpPrefix::V6(p) => p.prefix.fmt(f),
        }
    }
}
