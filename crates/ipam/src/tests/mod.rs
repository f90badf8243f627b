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

//! Database tests for the allocation engine. Each test runs against its own
//! database cloned from a migrated template (see quark-sqlx-testing);
//! `DATABASE_URL` must point at a Postgres instance.

pub(crate) mod common;

mod allocate_ip;
mod deallocate;
mod reallocate_ip;
mod store;
mod v6;

/// Resolves fixture names for `#[quark_macros::sqlx_test(fixtures(...))]`.
/// Fixtures live in `src/tests/fixtures/` and are included once here rather
/// than inlined at every use site.
pub(crate) fn sqlx_fixture_from_str(name: &str) -> sqlx::testing::TestFixture {
    match name {
        "base_network" => sqlx::testing::TestFixture {
            path: "base_network.sql",
            contents: include_str!("fixtures/base_network.sql"),
        },
        other => panic!("unknown fixture {other}"),
    }
}
