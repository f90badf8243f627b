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

use crate::typed_uuid;

typed_uuid!(
    /// NetworkId identifies a tenant network. Subnets, ports and addresses
    /// all hang off a network, so this id shows up in nearly every query
    /// the IPAM engine issues.
    NetworkId
);

typed_uuid!(
    /// SubnetId identifies a single subnet (CIDR) inside a network.
    SubnetId
);

typed_uuid!(
    /// SegmentId identifies an operator-defined partition of a network.
    /// A subnet belongs to at most one segment.
    SegmentId
);
