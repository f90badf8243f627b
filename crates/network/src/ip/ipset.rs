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
use std::collections::BTreeSet;

use crate::ip::prefix::{IpPrefix, ToPrefix};

/// An IpSet is a specialized set-type data structure for IP addresses, which
/// internally is represented as a set of prefixes that cover the included
/// address space.
///
/// Membership tests are a range probe over the ordered prefix set, so they
/// never enumerate the covered addresses. This is what makes it usable for
/// policy exclusion checks against v6-sized CIDRs.
#[derive(Debug, Default)]
pub struct IpSet {
    included_prefixes: BTreeSet<IpPrefix>,
}

impl IpSet {
    /// Create a new set with nothing contained.
    pub fn new_empty() -> Self {
        Self {
            included_prefixes: BTreeSet::new(),
        }
    }

    /// Return whether the specified value is included in the set. The value
    /// can be an IpPrefix, an IpAddr, or anything else that implements
    /// ToPrefix.
    pub fn contains<P: ToPrefix>(&self, value: P) -> bool {
        let prefix = value.to_prefix();
        self.contains_prefix(&prefix)
    }

    fn contains_prefix(&self, prefix: &IpPrefix) -> bool {
        // The stored prefixes are disjoint (add() maintains that), so the
        // nearest predecessor is the only candidate that can contain the
        // probe.
        self.included_prefixes
            .range(..=prefix)
            .next_back()
            .is_some_and(|included| included.contains(prefix))
    }

    /// Add a prefix to the included set. If the set already contains the
    /// address space in the prefix, this is a no-op.
    pub fn add(&mut self, prefix: IpPrefix) {
        if self.contains_prefix(&prefix) {
            return;
        }

        // Remove all smaller subprefixes contained by what we're
        // about to insert.
        while let Some(subprefix) = self
            .included_prefixes
            .range(prefix..=prefix.get_last_subprefix())
            .find_map(|p| prefix.contains(p).then_some(*p))
        {
            self.included_prefixes.remove(&subprefix);
        }

        // Before inserting this prefix, look for its sibling and try to
        // aggregate with it (and then check for a sibling of the new
        // aggregate, and so on recursively).
        let mut prefix = prefix;
        while let Some(sibling) = prefix
            .get_sibling()
            .and_then(|sibling| self.included_prefixes.take(&sibling))
        {
            // We already know these are siblings, and therefore don't expect
            // this .try_aggregate() call to fail.
            if let Some(aggregated) = prefix.try_aggregate(&sibling) {
                prefix = aggregated;
            }
        }
        self.included_prefixes.insert(prefix);
    }

    /// Get the whole included address space as a list of aggregate prefixes.
    pub fn get_prefixes(&self) -> Vec<IpPrefix> {
        self.included_prefixes.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.included_prefixes.is_empty()
    }

    /// Total number of addresses covered by the set, counted over the
    /// aggregated prefixes so overlapping inputs are not double counted.
    pub fn num_addresses(&self) -> u128 {
        self.included_prefixes
            .iter()
            .fold(0u128, |total, prefix| {
                total.saturating_add(prefix.num_addresses())
            })
    }
}

impl<I> From<I> for IpSet
where
    I: IntoIterator<Item: ToPrefix>,
{
    fn from(value: I) -> Self {
        let mut ipset = Self::new_empty();
        let prefixes = value.into_iter();
        prefixes.for_each(|p| ipset.add(p.to_prefix()));
        ipset
    }
}
