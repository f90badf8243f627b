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
use model::transaction::IpamTransaction;
use quark_uuid::transaction::TransactionId;
use sqlx::PgConnection;

use super::DatabaseError;

/// Mint a fresh claim token. Every reuse attempt gets its own token so the
/// subsequent re-find can only ever see the row this attempt claimed.
pub async fn create(txn: &mut PgConnection) -> Result<IpamTransaction, DatabaseError> {
    let id = TransactionId::from(uuid::Uuid::new_v4());
    let query = "INSERT INTO quark_transactions (id) VALUES ($1) RETURNING *";
    sqlx::query_as(query)
        .bind(id)
        .fetch_one(txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Drop claim tokens older than the given age. Run by a periodic sweep, not
/// by the allocation paths.
pub async fn delete_older_than(
    txn: &mut PgConnection,
    max_age_seconds: i64,
) -> Result<u64, DatabaseError> {
    let query = "DELETE FROM quark_transactions WHERE created_at < now() - make_interval(secs => $1)";
    sqlx::query(query)
        .bind(max_age_seconds as f64)
        .execute(txn)
        .await
        .map(|result| result.rows_affected())
        .map_err(|e| DatabaseError::query(query, e))
}
