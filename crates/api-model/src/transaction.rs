/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 OpenStack Foundation. All rights reserved.
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
use chrono::{DateTime, Utc};
use quark_uuid::transaction::TransactionId;
use sqlx::FromRow;

/// A claim token row. Rows are ephemeral; anything old enough to be
/// unclaimed by a living request is garbage-collected by a periodic sweep.
#[derive(Debug, FromRow, Clone)]
pub struct IpamTransaction {
    pub id: TransactionId,
    pub created_at: DateTime<Utc>,
}
