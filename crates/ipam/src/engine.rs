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

//! The MAC and IP allocation engine.
//!
//! Every allocation runs reuse-first, create-second. The reuse phase claims
//! a deallocated row with an update-at-most-one-row stamped with a fresh
//! transaction id, then re-finds the row by that id. The create phase picks
//! the most-full viable subnet (or MAC range), takes the next value off its
//! cursor, and inserts; unique-key conflicts and claim misses are control
//! flow, not errors. Cross-process correctness rests entirely on those
//! database primitives — the optional named locks only damp local retry
//! churn.

use std::net::IpAddr;
use std::sync::Arc;

use db::ip_address::{IpAddressFilters, NewIpAddress, ReallocateIpUpdate};
use db::mac_address::MacAddressFilters;
use db::{Context, DatabaseError};
use itertools::Itertools;
use model::ip_address::{AddressType, IpAddress};
use model::ip_policy::exclusion_set;
use model::ipam_strategy::IpamStrategy;
use model::mac_address::MacAddress;
use model::port::Port;
use model::subnet::Subnet;
use quark_network::ip::{IpSet, V6AddressGenerator, int_to_ip, int_to_v6, ip_to_int};
use quark_network::mac::{int_to_mac, mac_to_int};
use quark_uuid::network::{NetworkId, SegmentId, SubnetId};
use quark_uuid::port::PortId;
use sqlx::{PgConnection, PgPool};

use crate::config::IpamConfig;
use crate::locks::NamedLocks;
use crate::log::IpamLog;
use crate::notifier::{AddressEvent, AddressEventPayload, Notifier};
use crate::{IpamError, strategy};

#[derive(Default)]
pub struct MacAllocateRequest {
    pub mac_address: Option<mac_address::MacAddress>,
    pub use_forbidden_mac_range: bool,
}

pub struct IpAllocateRequest {
    pub network_id: NetworkId,
    pub port_id: PortId,
    /// Minimum age, in seconds, a deallocation must reach before the
    /// address can be reclaimed.
    pub reuse_after: i64,
    pub segment_id: Option<SegmentId>,
    pub version: Option<i32>,
    /// Explicitly requested addresses; empty for automatic allocation.
    pub ip_addresses: Vec<IpAddr>,
    /// Caller-pinned subnets; empty to let the subnet selector choose.
    pub subnets: Vec<SubnetId>,
    /// The port's MAC, when known. Seeds the v6 SLAAC candidate.
    pub mac_address: Option<MacAddress>,
    pub address_type: Option<AddressType>,
}

impl IpAllocateRequest {
    pub fn new(network_id: NetworkId, port_id: PortId, reuse_after: i64) -> Self {
        Self {
            network_id,
            port_id,
            reuse_after,
            segment_id: None,
            version: None,
            ip_addresses: Vec::new(),
            subnets: Vec::new(),
            mac_address: None,
            address_type: None,
        }
    }

    fn address_type(&self) -> AddressType {
        self.address_type.unwrap_or(AddressType::Fixed)
    }
}

enum ClaimOutcome<T> {
    /// The claim matched a row and the re-find validated it.
    Claimed(T),
    /// The claim matched no row at all; there is nothing reclaimable.
    NothingToClaim,
    /// The claim matched a row but the re-find discarded it.
    ClaimLost,
}

enum MacCandidate {
    NoRange,
    RangeFull,
    Candidate {
        range_id: quark_uuid::mac::MacAddressRangeId,
        address: i64,
    },
}

pub struct QuarkIpam {
    config: IpamConfig,
    strategy: IpamStrategy,
    locks: NamedLocks,
    notifier: Arc<dyn Notifier>,
}

impl QuarkIpam {
    pub fn new(config: IpamConfig, strategy: IpamStrategy, notifier: Arc<dyn Notifier>) -> Self {
        let locks = NamedLocks::new(config.ipam_use_synchronization);
        Self {
            config,
            strategy,
            locks,
            notifier,
        }
    }

    /// Like [`QuarkIpam::new`], resolving the strategy by name with the
    /// configured fallback for unknown names.
    pub fn with_strategy_name(
        config: IpamConfig,
        strategy_name: &str,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let strategy = strategy::strategy_or_default(strategy_name, &config);
        Self::new(config, strategy, notifier)
    }

    pub fn strategy(&self) -> IpamStrategy {
        self.strategy
    }

    //
    // MAC allocation
    //

    pub async fn allocate_mac_address(
        &self,
        ctx: &Context,
        pool: &PgPool,
        network_id: NetworkId,
        port_id: PortId,
        reuse_after: i64,
        request: MacAllocateRequest,
    ) -> Result<MacAddress, IpamError> {
        let _guard = self.locks.acquire("allocate_mac_address").await;

        let mac_int = request.mac_address.as_ref().map(mac_to_int);
        tracing::info!(
            %network_id,
            %port_id,
            mac_address = ?request.mac_address,
            use_forbidden_mac_range = request.use_forbidden_mac_range,
            "attempting to allocate a new MAC address"
        );

        for retry in 0..self.config.mac_address_retry_max {
            tracing::info!(
                attempt = retry + 1,
                max = self.config.mac_address_retry_max,
                "attempting to reallocate a deallocated MAC (step 1 of 3)"
            );
            match self
                .try_reallocate_mac(ctx, pool, reuse_after, mac_int)
                .await
            {
                Ok(ClaimOutcome::Claimed(mac)) => {
                    let readable = mac.readable();
                    tracing::info!(mac = %readable, "found a suitable deallocated MAC");
                    tracing::info!(%port_id, mac = %readable, "MAC assignment completed");
                    return Ok(mac);
                }
                Ok(ClaimOutcome::NothingToClaim) => break,
                Ok(ClaimOutcome::ClaimLost) => continue,
                Err(error) => {
                    tracing::warn!(%error, "error in mac reallocate");
                    continue;
                }
            }
        }

        tracing::info!("couldn't find a suitable deallocated MAC, attempting to create a new one");

        // This could fail if a large chunk of MACs were chosen explicitly,
        // but under concurrent load enough MAC creates should iterate
        // without any given thread exhausting its retry count.
        for retry in 0..self.config.mac_address_retry_max {
            tracing::info!(
                attempt = retry + 1,
                max = self.config.mac_address_retry_max,
                "attempting to find a range to create a new MAC in (step 2 of 3)"
            );
            let candidate = match self
                .find_mac_candidate(pool, mac_int, request.use_forbidden_mac_range)
                .await
            {
                Ok(MacCandidate::NoRange) => {
                    tracing::info!("no MAC ranges could be found given the criteria");
                    break;
                }
                Ok(MacCandidate::RangeFull) => continue,
                Ok(MacCandidate::Candidate { range_id, address }) => (range_id, address),
                Err(error) => {
                    tracing::warn!(%error, "error in updating mac range");
                    continue;
                }
            };

            // Based on the above, this should only fail if a MAC was
            // explicitly chosen at some point. As such, fall through here
            // and get in line for a new MAC address to try.
            let (range_id, address) = candidate;
            let readable = int_to_mac(address);
            tracing::info!(mac = %readable, "attempting to create new MAC (step 3 of 3)");
            match self.create_mac(ctx, pool, address, range_id).await {
                Ok(mac) => {
                    tracing::info!(%port_id, mac = %readable, "MAC assignment completed");
                    return Ok(mac);
                }
                Err(error) => {
                    tracing::info!(mac = %readable, "failed to create new MAC");
                    tracing::warn!(%error, "error in creating mac, MAC possibly duplicate");
                    continue;
                }
            }
        }

        Err(IpamError::MacAddressGenerationFailure { network_id })
    }

    async fn try_reallocate_mac(
        &self,
        _ctx: &Context,
        pool: &PgPool,
        reuse_after: i64,
        mac_int: Option<i64>,
    ) -> Result<ClaimOutcome<MacAddress>, IpamError> {
        let mut txn = db::Transaction::begin(pool).await?;
        let transaction = db::transactions::create(txn.as_pgconn()).await?;

        let filters = MacAddressFilters {
            address: mac_int,
            deallocated: Some(true),
            reuse_after: Some(reuse_after),
            ..Default::default()
        };
        let claimed = db::mac_address::reallocate(txn.as_pgconn(), transaction.id, &filters).await?;
        if !claimed {
            txn.commit().await?;
            return Ok(ClaimOutcome::NothingToClaim);
        }

        let found = db::mac_address::reallocate_find(txn.as_pgconn(), transaction.id).await?;
        txn.commit().await?;
        Ok(match found {
            Some(mac) => ClaimOutcome::Claimed(mac),
            None => ClaimOutcome::ClaimLost,
        })
    }

    async fn find_mac_candidate(
        &self,
        pool: &PgPool,
        mac_int: Option<i64>,
        use_forbidden_mac_range: bool,
    ) -> Result<MacCandidate, IpamError> {
        let mut txn = db::Transaction::begin(pool).await?;
        let found = db::mac_address_range::find_allocation_counts(
            txn.as_pgconn(),
            mac_int,
            use_forbidden_mac_range,
        )
        .await?;
        let Some((range, allocated_count)) = found else {
            txn.commit().await?;
            return Ok(MacCandidate::NoRange);
        };
        tracing::info!(cidr = %range.cidr, "found a MAC range");

        if range.len() <= allocated_count {
            // Somehow, the range got filled up without us knowing, so set
            // the cursor to -1 so we never try to create new ones in this
            // range.
            db::mac_address_range::update_set_full(txn.as_pgconn(), range.id).await?;
            txn.commit().await?;
            tracing::info!(cidr = %range.cidr, "MAC range is full");
            return Ok(MacCandidate::RangeFull);
        }

        let address = match mac_int {
            Some(mac) => mac,
            None => {
                let next = range.next_auto_assign_mac;
                if next + 1 > range.last_address {
                    db::mac_address_range::update_set_full(txn.as_pgconn(), range.id).await?;
                } else {
                    db::mac_address_range::update_next_auto_assign_mac(txn.as_pgconn(), range.id)
                        .await?;
                }
                next
            }
        };
        txn.commit().await?;
        Ok(MacCandidate::Candidate {
            range_id: range.id,
            address,
        })
    }

    async fn create_mac(
        &self,
        ctx: &Context,
        pool: &PgPool,
        address: i64,
        range_id: quark_uuid::mac::MacAddressRangeId,
    ) -> Result<MacAddress, IpamError> {
        let mut txn = db::Transaction::begin(pool).await?;
        match db::mac_address::create(ctx, txn.as_pgconn(), address, range_id).await {
            Ok(mac) => {
                txn.commit().await?;
                Ok(mac)
            }
            Err(error) => {
                txn.rollback().await.ok();
                Err(error.into())
            }
        }
    }

    pub async fn deallocate_mac_address(
        &self,
        ctx: &Context,
        pool: &PgPool,
        address: i64,
    ) -> Result<(), IpamError> {
        let mut txn = db::Transaction::begin(pool).await?;
        let filters = MacAddressFilters {
            address: Some(address),
            ..Default::default()
        };
        let Some(mac) = db::mac_address::find_one(ctx, txn.as_pgconn(), &filters).await? else {
            return Err(IpamError::MacAddressNotFound(int_to_mac(address)));
        };

        let range = db::mac_address_range::find(txn.as_pgconn(), mac.mac_address_range_id).await?;
        if range.do_not_use {
            db::mac_address::delete(txn.as_pgconn(), mac.address).await?;
        } else {
            db::mac_address::deallocate(txn.as_pgconn(), mac.address).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    //
    // IP reallocation (reuse path)
    //

    /// Try to reclaim deallocated addresses for the request. Runs one pass
    /// per strategy-mandated version constraint; returns whatever could be
    /// reclaimed, possibly nothing.
    pub async fn attempt_to_reallocate_ip(
        &self,
        ctx: &Context,
        pool: &PgPool,
        request: &IpAllocateRequest,
        ip_address: Option<IpAddr>,
        log: &mut IpamLog,
    ) -> Result<Vec<IpAddress>, IpamError> {
        let mut reallocated = Vec::new();
        for version in strategy::reuse_passes(self.strategy) {
            reallocated.extend(
                self.reallocate_ip_pass(ctx, pool, request, *version, ip_address, log)
                    .await?,
            );
        }
        Ok(reallocated)
    }

    async fn reallocate_ip_pass(
        &self,
        ctx: &Context,
        pool: &PgPool,
        request: &IpAllocateRequest,
        version: Option<i32>,
        ip_address: Option<IpAddr>,
        log: &mut IpamLog,
    ) -> Result<Vec<IpAddress>, IpamError> {
        let _guard = self.locks.acquire("reallocate_ip").await;

        tracing::info!(
            network_id = %request.network_id,
            port_id = %request.port_id,
            ?version,
            segment_id = ?request.segment_id,
            subnets = ?request.subnets,
            "attempting to reallocate an IP (step 1 of 3)"
        );

        if version == Some(6) {
            // Defers to the create case. The reason why is we'd have to
            // look up subnets here to correctly generate the v6. If we
            // split them up into reallocate and create, we'd be looking up
            // the same subnets twice, which is a waste of time.
            tracing::info!("identified as v6 case, deferring to IP create path");
            return Ok(Vec::new());
        }
        let versions: Vec<i32> = match version {
            Some(v) => vec![v],
            None => vec![4, 6],
        };

        let subnet_ids: Vec<SubnetId> = if !request.subnets.is_empty() {
            request.subnets.clone()
        } else if let Some(segment_id) = request.segment_id {
            let mut txn = db::Transaction::begin(pool).await?;
            let ids =
                db::subnet::ids_for_segment(txn.as_pgconn(), request.network_id, segment_id)
                    .await?;
            txn.commit().await?;
            if ids.is_empty() {
                tracing::info!(%segment_id, "no subnets matching segment could be found");
                return Err(IpamError::IpAddressGenerationFailure {
                    network_id: request.network_id,
                });
            }
            ids
        } else {
            Vec::new()
        };

        for retry in 0..self.config.ip_address_retry_max {
            let attempt = log.begin("attempt_to_reallocate_ip");
            tracing::info!(
                attempt = retry + 1,
                max = self.config.ip_address_retry_max,
                "reallocate attempt"
            );
            let outcome = self
                .claim_reusable_ip(ctx, pool, request, &versions, ip_address, &subnet_ids)
                .await;
            match outcome {
                Ok(ClaimOutcome::Claimed(address)) => {
                    log.end(attempt);
                    tracing::info!(address = %address.address, "address is reallocated");
                    return Ok(vec![address]);
                }
                Ok(ClaimOutcome::NothingToClaim) => {
                    tracing::info!(
                        "couldn't update any reallocatable addresses given the criteria"
                    );
                    log.fail(attempt);
                    log.end(attempt);
                    break;
                }
                Ok(ClaimOutcome::ClaimLost) => {
                    log.fail(attempt);
                    log.end(attempt);
                    continue;
                }
                Err(error) => {
                    log.fail(attempt);
                    log.end(attempt);
                    tracing::warn!(%error, "error in reallocate ip");
                }
            }
        }
        Ok(Vec::new())
    }

    async fn claim_reusable_ip(
        &self,
        ctx: &Context,
        pool: &PgPool,
        request: &IpAllocateRequest,
        versions: &[i32],
        ip_address: Option<IpAddr>,
        subnet_ids: &[SubnetId],
    ) -> Result<ClaimOutcome<IpAddress>, IpamError> {
        let elevated = ctx.elevated();
        let mut txn = db::Transaction::begin(pool).await?;
        let transaction = db::transactions::create(txn.as_pgconn()).await?;

        let filters = IpAddressFilters {
            network_id: Some(request.network_id),
            reuse_after: Some(request.reuse_after),
            // An explicitly requested address may be claimed regardless of
            // its deallocation flag; the reuse window filter still applies.
            deallocated: if ip_address.is_some() { None } else { Some(true) },
            address: ip_address,
            versions: Some(versions),
            subnet_ids: (!subnet_ids.is_empty()).then_some(subnet_ids),
            ..Default::default()
        };
        let update = ReallocateIpUpdate {
            transaction_id: transaction.id,
            address_type: request.address_type(),
            used_by_tenant_id: &ctx.tenant_id,
        };
        let claimed =
            db::ip_address::reallocate(&elevated, txn.as_pgconn(), &update, &filters).await?;
        if !claimed {
            txn.commit().await?;
            return Ok(ClaimOutcome::NothingToClaim);
        }

        let found =
            db::ip_address::reallocate_find(&elevated, txn.as_pgconn(), transaction.id).await?;
        txn.commit().await?;
        Ok(match found {
            Some(address) => ClaimOutcome::Claimed(address),
            None => ClaimOutcome::ClaimLost,
        })
    }

    //
    // Subnet selection
    //

    /// Pick the most-full viable subnet for the request, advancing its
    /// allocation cursor (or marking it full) on the way out.
    #[allow(clippy::too_many_arguments)]
    pub async fn select_subnet(
        &self,
        _ctx: &Context,
        pool: &PgPool,
        network_id: NetworkId,
        ip_address: Option<IpAddr>,
        segment_id: Option<SegmentId>,
        subnet_ids: Option<&[SubnetId]>,
        ip_version: Option<i32>,
    ) -> Result<Option<Subnet>, IpamError> {
        let _guard = self.locks.acquire("select_subnet").await;

        tracing::info!(
            %network_id,
            ?ip_address,
            ?segment_id,
            ?subnet_ids,
            ?ip_version,
            "selecting subnet(s) (step 2 of 3)"
        );

        let mut txn = db::Transaction::begin(pool).await?;
        let candidates = db::subnet::find_ordered_by_most_full(
            txn.as_pgconn(),
            network_id,
            ip_version,
            segment_id,
            subnet_ids,
        )
        .await?;

        if candidates.is_empty() {
            tracing::info!("no subnets found given the search criteria");
        }

        for (subnet, ips_in_subnet) in candidates {
            tracing::info!(subnet_id = %subnet.id, cidr = %subnet.cidr, "trying subnet");
            if let Some(requested_ip) = ip_address
                && !subnet.contains(requested_ip)
            {
                if subnet_ids.is_some() {
                    tracing::info!(
                        ip = %requested_ip,
                        cidr = %subnet.cidr,
                        "requested IP not in subnet, retrying"
                    );
                    txn.rollback().await.ok();
                    return Err(IpamError::IpAddressNotInSubnet {
                        ip: requested_ip,
                        subnet_id: subnet.id,
                    });
                }
                continue;
            }

            // Policies don't prevent explicit assignment, so we only need
            // to check them when allocating a new IP.
            let policy_size: u128 = match (ip_address, subnet.ip_policy_id) {
                (None, Some(policy_id)) => db::ip_policy::find(txn.as_pgconn(), policy_id)
                    .await?
                    .map(|policy| policy.size.max(0) as u128)
                    .unwrap_or(0),
                _ => 0,
            };

            if subnet.size().saturating_add(1) > ips_in_subnet as u128 + policy_size {
                if ip_address.is_none() && subnet.ip_version == 4 {
                    let Some(cursor) = subnet.next_auto_assign_ip else {
                        txn.commit().await?;
                        return Ok(None);
                    };
                    let cursor_int = ip_to_int(cursor);
                    let updated = if cursor_int < ip_to_int(subnet.first_ip)
                        || cursor_int > ip_to_int(subnet.last_ip)
                    {
                        tracing::info!(subnet_id = %subnet.id, "marking subnet as full");
                        db::subnet::update_set_full(txn.as_pgconn(), subnet.id).await?
                    } else {
                        db::subnet::update_next_auto_assign_ip(txn.as_pgconn(), subnet.id).await?
                    };

                    if updated == 0 {
                        // This means the subnet was marked full while we
                        // were checking out policies. Fall out and go back
                        // to the outer retry loop.
                        txn.commit().await?;
                        return Ok(None);
                    }
                    let refreshed = db::subnet::find(txn.as_pgconn(), subnet.id).await?;
                    tracing::info!(
                        subnet_id = %refreshed.id,
                        cidr = %refreshed.cidr,
                        cursor = ?refreshed.next_auto_assign_ip,
                        "subnet looks viable, returning"
                    );
                    txn.commit().await?;
                    return Ok(Some(refreshed));
                }

                tracing::info!(
                    subnet_id = %subnet.id,
                    cidr = %subnet.cidr,
                    "subnet looks viable, returning"
                );
                txn.commit().await?;
                return Ok(Some(subnet));
            } else {
                tracing::info!(subnet_id = %subnet.id, "marking subnet as full");
                db::subnet::update_set_full(txn.as_pgconn(), subnet.id).await?;
            }
        }

        txn.commit().await?;
        Ok(None)
    }

    //
    // IP creation (create path)
    //

    async fn allocate_from_subnet(
        &self,
        ctx: &Context,
        pool: &PgPool,
        network_id: NetworkId,
        subnet: &Subnet,
        ip_address: Option<IpAddr>,
        address_type: AddressType,
    ) -> Result<IpAddress, IpamError> {
        tracing::info!(
            cidr = %subnet.cidr,
            %network_id,
            ?ip_address,
            "creating a new address in subnet"
        );

        let mut txn = db::Transaction::begin(pool).await?;
        let excluded = load_policy_set(txn.as_pgconn(), subnet).await?;

        let next_ip = match ip_address {
            Some(ip) => ip,
            None => {
                // The subnet selector already advanced the cursor for us,
                // so the candidate sits one behind it; a subnet that was
                // just marked full hands out its last address.
                let value = match subnet.next_auto_assign_ip {
                    Some(cursor) => ip_to_int(cursor) - 1,
                    None => ip_to_int(subnet.last_ip),
                };
                int_to_ip(value)
            }
        };
        tracing::info!(ip = %next_ip, "next IP");

        if ip_address.is_none()
            && let Some(excluded) = &excluded
            && excluded.contains(next_ip)
        {
            txn.rollback().await.ok();
            tracing::info!(ip = %next_ip, "next IP violates policy");
            return Err(IpamError::IpAddressPolicyRetryableFailure {
                ip: next_ip,
                network_id,
            });
        }

        let new_address = NewIpAddress {
            address: next_ip,
            version: subnet.ip_version,
            subnet_id: subnet.id,
            network_id,
            address_type: Some(address_type),
        };
        match db::ip_address::create(ctx, txn.as_pgconn(), new_address).await {
            Ok(address) => {
                txn.commit().await?;
                Ok(address)
            }
            Err(error) => {
                txn.rollback().await.ok();
                tracing::debug!(%error, ip = %next_ip, "insert conflict");
                if ip_address.is_some() {
                    Err(IpamError::IpAddressInUse {
                        ip: next_ip,
                        network_id,
                    })
                } else {
                    Err(IpamError::IpAddressRetryableFailure {
                        ip: next_ip,
                        network_id,
                    })
                }
            }
        }
    }

    /// This attempts to allocate v6 addresses as per RFC 2462 and RFC 3041.
    ///
    /// To accommodate this, we effectively treat all v6 assignment as a
    /// first time allocation utilizing the MAC address of the VIF. Because
    /// we recycle MACs, we will eventually attempt to recreate a previously
    /// generated v6 address. Instead of failing, we've opted to handle
    /// reallocating that address in this method.
    ///
    /// This should provide a performance boost over attempting to check
    /// each and every subnet in the existing reallocate logic, as we'd have
    /// to iterate over each and every subnet returned.
    #[allow(clippy::too_many_arguments)]
    async fn allocate_from_v6_subnet(
        &self,
        ctx: &Context,
        pool: &PgPool,
        network_id: NetworkId,
        subnet: &Subnet,
        port_id: PortId,
        reuse_after: i64,
        ip_address: Option<IpAddr>,
        mac: Option<&MacAddress>,
        address_type: AddressType,
    ) -> Result<IpAddress, IpamError> {
        tracing::info!(
            %network_id,
            cidr = %subnet.cidr,
            %port_id,
            ?ip_address,
            "attempting to allocate a v6 address"
        );

        if let Some(ip) = ip_address {
            tracing::info!(%ip, "IP explicitly requested, deferring to standard allocation");
            return self
                .allocate_from_subnet(ctx, pool, network_id, subnet, ip_address, address_type)
                .await;
        }

        let excluded = {
            let mut txn = db::Transaction::begin(pool).await?;
            let excluded = load_policy_set(txn.as_pgconn(), subnet).await?;
            txn.commit().await?;
            excluded
        };

        let readable_mac = mac.map(|m| m.readable());
        let generator =
            V6AddressGenerator::new(readable_mac.as_ref(), port_id.into(), &subnet.cidr);
        for (tries, value) in generator
            .enumerate()
            .take(self.config.v6_allocation_attempts as usize)
        {
            tracing::info!(
                attempt = tries + 1,
                max = self.config.v6_allocation_attempts,
                "v6 allocation attempt"
            );

            let candidate = IpAddr::V6(int_to_v6(value));
            tracing::info!(ip = %candidate, "generated a new v6 address");

            if let Some(excluded) = &excluded
                && excluded.contains(candidate)
            {
                tracing::info!(ip = %candidate, "address excluded by policy");
                continue;
            }

            // The generator is deterministic per port, so a previously
            // created and since deallocated address will be re-emitted
            // here; claim it in place instead of colliding on insert.
            let subnet_ids = [subnet.id];
            let mut txn = db::Transaction::begin(pool).await?;
            let filters = IpAddressFilters {
                network_id: Some(network_id),
                address: Some(candidate),
                subnet_ids: Some(&subnet_ids),
                deallocated: Some(true),
                reuse_after: Some(reuse_after),
                ..Default::default()
            };
            let existing = db::ip_address::find_one(ctx, txn.as_pgconn(), &filters, true).await?;
            if let Some(existing) = existing {
                tracing::info!(ip = %candidate, "address exists, claiming");
                let claimed =
                    db::ip_address::update_claimed(ctx, txn.as_pgconn(), existing.id, address_type)
                        .await?;
                txn.commit().await?;
                return Ok(claimed);
            }
            txn.commit().await?;

            // This triggers when the IP is allocated to another tenant,
            // either because we missed it due to our filters above, or in
            // an extremely unlikely race between the find and here.
            let mut txn = db::Transaction::begin(pool).await?;
            let new_address = NewIpAddress {
                address: candidate,
                version: subnet.ip_version,
                subnet_id: subnet.id,
                network_id,
                address_type: Some(address_type),
            };
            match db::ip_address::create(ctx, txn.as_pgconn(), new_address).await {
                Ok(address) => {
                    txn.commit().await?;
                    return Ok(address);
                }
                Err(error) if error.is_unique_violation() => {
                    txn.rollback().await.ok();
                    tracing::info!(ip = %candidate, "exists but was already allocated");
                    tracing::debug!(
                        subnet_id = %subnet.id,
                        ip = %candidate,
                        "duplicate entry found when inserting"
                    );
                    continue;
                }
                Err(error) => {
                    txn.rollback().await.ok();
                    return Err(error.into());
                }
            }
        }

        tracing::info!("exceeded v6 allocation attempts, bailing");
        Err(IpamError::IpAddressGenerationFailure { network_id })
    }

    async fn allocate_ips_from_subnets(
        &self,
        ctx: &Context,
        pool: &PgPool,
        new_addresses: &mut Vec<IpAddress>,
        request: &IpAllocateRequest,
        subnets: Vec<Subnet>,
        ip_address: Option<IpAddr>,
    ) -> Result<(), IpamError> {
        tracing::info!(
            network_id = %request.network_id,
            port_id = %request.port_id,
            ?ip_address,
            "allocating IP(s) from chosen subnet(s) (step 3 of 3)"
        );

        for subnet in subnets {
            tracing::info!(subnet_id = %subnet.id, cidr = %subnet.cidr, "attempting to allocate from subnet");
            let address = if subnet.ip_version == 4 {
                self.allocate_from_subnet(
                    ctx,
                    pool,
                    request.network_id,
                    &subnet,
                    ip_address,
                    request.address_type(),
                )
                .await?
            } else {
                self.allocate_from_v6_subnet(
                    ctx,
                    pool,
                    request.network_id,
                    &subnet,
                    request.port_id,
                    request.reuse_after,
                    ip_address,
                    request.mac_address.as_ref(),
                    request.address_type(),
                )
                .await?
            };
            tracing::info!(ip = %address.address, "created IP");
            new_addresses.push(address);
        }
        Ok(())
    }

    async fn choose_available_subnet(
        &self,
        elevated: &Context,
        pool: &PgPool,
        request: &IpAllocateRequest,
        reallocated: &[IpAddress],
        ip_address: Option<IpAddr>,
    ) -> Result<Vec<Subnet>, IpamError> {
        match self.strategy {
            IpamStrategy::Any => {
                let subnet = self
                    .select_subnet(
                        elevated,
                        pool,
                        request.network_id,
                        ip_address,
                        request.segment_id,
                        None,
                        request.version,
                    )
                    .await?;
                match subnet {
                    Some(subnet) => Ok(vec![subnet]),
                    None => Err(IpamError::IpAddressGenerationFailure {
                        network_id: request.network_id,
                    }),
                }
            }
            IpamStrategy::Both | IpamStrategy::BothRequired => {
                let mut chosen = Vec::new();
                for version in strategy::missing_versions(reallocated) {
                    let subnet = self
                        .select_subnet(
                            elevated,
                            pool,
                            request.network_id,
                            ip_address,
                            request.segment_id,
                            None,
                            Some(version),
                        )
                        .await?;
                    if let Some(subnet) = subnet {
                        chosen.push(subnet);
                    }
                }
                if reallocated.is_empty() && chosen.is_empty() {
                    return Err(IpamError::IpAddressGenerationFailure {
                        network_id: request.network_id,
                    });
                }
                if self.strategy == IpamStrategy::BothRequired
                    && reallocated.len() + chosen.len() < 2
                {
                    return Err(IpamError::IpAddressGenerationFailure {
                        network_id: request.network_id,
                    });
                }
                Ok(chosen)
            }
        }
    }

    //
    // Orchestration
    //

    /// Allocate whatever the strategy demands for a port, reuse-first.
    /// Successfully produced addresses are appended to `new_addresses`
    /// (also the accumulator consulted for strategy satisfaction, so
    /// callers can seed it with addresses obtained earlier).
    pub async fn allocate_ip_address(
        &self,
        ctx: &Context,
        pool: &PgPool,
        new_addresses: &mut Vec<IpAddress>,
        request: IpAllocateRequest,
    ) -> Result<(), IpamError> {
        let mut log = IpamLog::new();
        let result = self
            .allocate_ip_address_inner(ctx, pool, new_addresses, &request, &mut log)
            .await;
        log.finish();
        result
    }

    async fn allocate_ip_address_inner(
        &self,
        ctx: &Context,
        pool: &PgPool,
        new_addresses: &mut Vec<IpAddress>,
        request: &IpAllocateRequest,
        log: &mut IpamLog,
    ) -> Result<(), IpamError> {
        let elevated = ctx.elevated();
        tracing::info!(
            strategy = %self.strategy,
            network_id = %request.network_id,
            port_id = %request.port_id,
            ip_addresses = ?request.ip_addresses,
            subnets = ?request.subnets,
            segment_id = ?request.segment_id,
            version = ?request.version,
            "starting a new IP address(es) allocation"
        );

        if request.ip_addresses.is_empty() {
            let reallocated = self
                .attempt_to_reallocate_ip(ctx, pool, request, None, log)
                .await?;
            new_addresses.extend(reallocated);
        } else {
            for ip in &request.ip_addresses {
                let reallocated = self
                    .attempt_to_reallocate_ip(ctx, pool, request, Some(*ip), log)
                    .await?;
                new_addresses.extend(reallocated);
            }
        }

        if strategy::is_satisfied(self.strategy, new_addresses, false) {
            return Ok(());
        }
        tracing::info!(
            strategy = %self.strategy,
            reallocated = new_addresses.len(),
            "reallocated addresses but still need more to satisfy strategy, \
             falling back to creating IPs"
        );

        if !request.ip_addresses.is_empty() || !request.subnets.is_empty() {
            let pairs: Vec<(Option<IpAddr>, Option<SubnetId>)> = request
                .ip_addresses
                .iter()
                .copied()
                .zip_longest(request.subnets.iter().copied())
                .map(|pair| match pair {
                    itertools::EitherOrBoth::Both(ip, subnet) => (Some(ip), Some(subnet)),
                    itertools::EitherOrBoth::Left(ip) => (Some(ip), None),
                    itertools::EitherOrBoth::Right(subnet) => (None, Some(subnet)),
                })
                .collect();
            for (ip, subnet) in pairs {
                self.try_allocate_ip_address(ctx, &elevated, pool, new_addresses, request, ip, subnet, log)
                    .await?;
            }
        } else {
            self.try_allocate_ip_address(ctx, &elevated, pool, new_addresses, request, None, None, log)
                .await?;
        }

        if strategy::is_satisfied(self.strategy, new_addresses, true) {
            self.notify_new_addresses(ctx, pool, new_addresses).await;
            tracing::info!(
                port_id = %request.port_id,
                addresses = ?new_addresses.iter().map(|a| a.address).collect::<Vec<_>>(),
                "IPAM completed"
            );
            return Ok(());
        }
        log.failed();

        Err(IpamError::IpAddressGenerationFailure {
            network_id: request.network_id,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_allocate_ip_address(
        &self,
        ctx: &Context,
        elevated: &Context,
        pool: &PgPool,
        new_addresses: &mut Vec<IpAddress>,
        request: &IpAllocateRequest,
        ip_address: Option<IpAddr>,
        pinned_subnet: Option<SubnetId>,
        log: &mut IpamLog,
    ) -> Result<(), IpamError> {
        for retry in 0..self.config.ip_address_retry_max {
            let attempt = log.begin("_try_allocate_ip_address");
            tracing::info!(
                attempt = retry + 1,
                max = self.config.ip_address_retry_max,
                "allocating new IP"
            );

            let subnets = match pinned_subnet {
                Some(subnet_id) => {
                    let pinned = [subnet_id];
                    self.select_subnet(
                        ctx,
                        pool,
                        request.network_id,
                        ip_address,
                        request.segment_id,
                        Some(&pinned),
                        None,
                    )
                    .await?
                    .into_iter()
                    .collect()
                }
                None => {
                    self.choose_available_subnet(elevated, pool, request, new_addresses, ip_address)
                        .await?
                }
            };
            tracing::info!(
                count = subnets.len(),
                ids = ?subnets.iter().map(|s| s.id).collect::<Vec<_>>(),
                "subnet selection returned viable subnet(s)"
            );

            match self
                .allocate_ips_from_subnets(ctx, pool, new_addresses, request, subnets, ip_address)
                .await
            {
                Ok(()) => {
                    log.end(attempt);
                    break;
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!(%error, "error in allocating IP");
                    log.fail(attempt);
                    log.end(attempt);
                    let remaining = self.config.ip_address_retry_max - retry - 1;
                    if remaining > 0 {
                        tracing::info!(remaining, "retries remain, retrying");
                    } else {
                        tracing::info!("no retries remaining, bailing");
                    }
                    continue;
                }
                Err(error) => {
                    log.fail(attempt);
                    log.end(attempt);
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    //
    // Deallocation
    //

    /// Release one address and publish exactly one delete event for it.
    pub async fn deallocate_ip_address(
        &self,
        _ctx: &Context,
        pool: &PgPool,
        address: &IpAddress,
    ) -> Result<IpAddress, IpamError> {
        let mut txn = db::Transaction::begin(pool).await?;
        let updated = db::ip_address::deallocate(txn.as_pgconn(), address.id).await?;
        let device_ids = db::port::device_ids_for_address(txn.as_pgconn(), address.id).await?;
        txn.commit().await?;

        self.notifier
            .publish(
                AddressEvent::Deleted,
                AddressEventPayload {
                    used_by_tenant_id: updated.used_by_tenant_id.clone(),
                    ip_block_id: updated.subnet_id,
                    ip_address: updated.address.to_string(),
                    device_ids,
                    created_at: updated.created_at,
                    deleted_at: updated.deallocated_at,
                },
            )
            .await;
        Ok(updated)
    }

    /// Release a port's addresses, or just the one given. An address is
    /// only deallocated when this port is the only one it is attached to;
    /// either way it is detached from the in-memory port.
    pub async fn deallocate_ips_by_port(
        &self,
        ctx: &Context,
        pool: &PgPool,
        port: &mut Port,
        ip_address: Option<IpAddr>,
    ) -> Result<Vec<IpAddress>, IpamError> {
        let mut removed = Vec::new();
        for address in port.ip_addresses.clone() {
            if let Some(only) = ip_address
                && ip_to_int(only) != ip_to_int(address.address)
            {
                continue;
            }

            let mut txn = db::Transaction::begin(pool).await?;
            let port_count = db::port::association_count(txn.as_pgconn(), address.id).await?;
            txn.commit().await?;

            // Note: only deallocate the ip if this is the only port mapped
            if port_count == 1 {
                self.deallocate_ip_address(ctx, pool, &address).await?;
            }
            removed.push(address);
        }

        port.ip_addresses
            .retain(|address| !removed.iter().any(|r| r.id == address.id));
        Ok(removed)
    }

    //
    // Notifications
    //

    async fn notify_new_addresses(&self, _ctx: &Context, pool: &PgPool, addresses: &[IpAddress]) {
        for address in addresses {
            let device_ids = match db::Transaction::begin(pool).await {
                Ok(mut txn) => {
                    let ids = db::port::device_ids_for_address(txn.as_pgconn(), address.id)
                        .await
                        .unwrap_or_default();
                    txn.commit().await.ok();
                    ids
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to load device ids for notification");
                    Vec::new()
                }
            };
            self.notifier
                .publish(
                    AddressEvent::Created,
                    AddressEventPayload {
                        used_by_tenant_id: address.used_by_tenant_id.clone(),
                        ip_block_id: address.subnet_id,
                        ip_address: address.address.to_string(),
                        device_ids,
                        created_at: address.created_at,
                        deleted_at: None,
                    },
                )
                .await;
        }
    }
}

/// Load the membership structure for a subnet's policy, if it has one.
async fn load_policy_set(
    txn: &mut PgConnection,
    subnet: &Subnet,
) -> Result<Option<IpSet>, DatabaseError> {
    let cidrs = db::ip_policy::cidrs_for_subnet(txn, subnet).await?;
    Ok(cidrs.map(|cidrs| exclusion_set(&cidrs)))
}
