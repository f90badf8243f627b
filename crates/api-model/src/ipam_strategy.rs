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
use strum_macros::{Display, EnumString};

/// How many addresses, of which IP versions, a single allocation request
/// must produce.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumString,
    serde::Serialize,
    serde::Deserialize,
    Default,
)]
pub enum IpamStrategy {
    /// One address of whatever version a viable subnet offers.
    #[default]
    #[strum(serialize = "ANY")]
    #[serde(rename = "ANY")]
    Any,

    /// Best effort dual-stack: try for a v4 and a v6, settle for one.
    #[strum(serialize = "BOTH")]
    #[serde(rename = "BOTH")]
    Both,

    /// Strict dual-stack: the request fails unless both versions land.
    #[strum(serialize = "BOTH_REQUIRED")]
    #[serde(rename = "BOTH_REQUIRED")]
    BothRequired,
}
