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

//! EUI-48 helpers. MAC addresses are stored as integers in the database;
//! `mac_address::MacAddress` is the presentation form.

use mac_address::MacAddress;

const EUI48_BITS: u32 = 48;
const EUI48_MASK: u64 = (1 << EUI48_BITS) - 1;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MacRangeError {
    #[error("could not parse MAC range cidr: {0}")]
    InvalidCidr(String),

    #[error("MAC range prefix length {0} is out of range")]
    InvalidPrefixLength(u32),
}

/// The integer form of an EUI-48.
pub fn mac_to_int(mac: &MacAddress) -> i64 {
    let [a, b, c, d, e, f] = mac.bytes();
    i64::from_be_bytes([0, 0, a, b, c, d, e, f])
}

/// The EUI-48 for an integer. Only the low 48 bits are meaningful.
pub fn int_to_mac(value: i64) -> MacAddress {
    let bytes = ((value as u64) & EUI48_MASK).to_be_bytes();
    MacAddress::new([bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
}

/// Compute the first and last address of a MAC range cidr.
///
/// Accepts the usual shorthand for OUI-style ranges: `"AA:BB:CC/24"` is the
/// same range as `"AA:BB:CC:00:00:00/24"`. Missing trailing octets are
/// zero-filled before the mask is applied.
pub fn mac_range_bounds(cidr: &str) -> Result<(i64, i64), MacRangeError> {
    let invalid = || MacRangeError::InvalidCidr(cidr.to_string());

    let (base, prefix_len) = match cidr.split_once('/') {
        Some((base, len)) => (base, len.parse::<u32>().map_err(|_| invalid())?),
        None => (cidr, EUI48_BITS),
    };
    if prefix_len > EUI48_BITS {
        return Err(MacRangeError::InvalidPrefixLength(prefix_len));
    }

    let octets: Vec<&str> = base.split([':', '-']).collect();
    if octets.is_empty() || octets.len() > 6 {
        return Err(invalid());
    }
    let mut value: u64 = 0;
    for octet in &octets {
        value = (value << 8) | u64::from(u8::from_str_radix(octet, 16).map_err(|_| invalid())?);
    }
    value <<= 8 * (6 - octets.len() as u32);

    let host_mask = if prefix_len == 0 {
        EUI48_MASK
    } else {
        EUI48_MASK >> prefix_len
    };
    let first = value & !host_mask & EUI48_MASK;
    let last = first | host_mask;
    Ok((first as i64, last as i64))
}
