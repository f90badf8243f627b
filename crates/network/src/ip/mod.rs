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

pub mod address;
pub mod ipset;
pub mod prefix;
pub mod v6;

pub use address::{contains_canonical, int_to_ip, int_to_v6, ip_to_int, subnet_bounds, subnet_size};
pub use ipset::IpSet;
pub use prefix::{IpPrefix, ToPrefix};
pub use v6::V6AddressGenerator;
