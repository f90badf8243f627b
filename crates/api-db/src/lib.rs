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

use std::ops::{Deref, DerefMut};
use std::panic::Location;

use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

pub mod ip_address;
pub mod ip_policy;
pub mod mac_address;
pub mod mac_address_range;
pub mod migrations;
pub mod network;
pub mod network_strategy;
pub mod port;
mod safe_pg_pool;
pub mod security_group;
pub mod subnet;
pub mod transactions;

pub use network_strategy::{NetworkStrategy, ProviderNetworks};
pub use safe_pg_pool::{SafePgPool, SafeTransaction};

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("query failed: {source} ({query})")]
    Query {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to acquire a database connection: {0}")]
    Acquire(#[source] sqlx::Error),

    #[error("failed to {action} a transaction: {source}")]
    Transaction {
        action: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no {kind} found for {id}")]
    NotFoundError { kind: &'static str, id: String },

    #[error("{0}")]
    Internal(String),
}

impl DatabaseError {
    pub fn query(query: &str, source: sqlx::Error) -> Self {
        DatabaseError::Query {
            query: query.to_string(),
            source,
        }
    }

    pub fn acquire(source: sqlx::Error) -> Self {
        DatabaseError::Acquire(source)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DatabaseError::Internal(message.into())
    }

    /// Whether the underlying error is a unique-constraint violation. The
    /// allocation engine treats these as control flow (lost race, retry with
    /// the next candidate), never as failures to surface.
    pub fn is_unique_violation(&self) -> bool {
        let source = match self {
            DatabaseError::Query { source, .. } => source,
            _ => return false,
        };
        match source {
            sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}

/// The caller identity a request runs under. Non-admin contexts are
/// implicitly scoped to their own tenant: any find that doesn't name a
/// tenant filter gets one injected.
#[derive(Debug, Clone)]
pub struct Context {
    pub tenant_id: String,
    pub is_admin: bool,
}

impl Context {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            is_admin: true,
        }
    }

    /// The same tenant with admin visibility. Internal engine steps that
    /// must see rows across tenants (claims, re-finds) run elevated.
    pub fn elevated(&self) -> Context {
        Context {
            tenant_id: self.tenant_id.clone(),
            is_admin: true,
        }
    }
}

/// A database transaction that remembers where it was opened, so a hung or
/// leaked transaction can be traced back to its call site.
pub struct Transaction<'c> {
    inner: sqlx::Transaction<'c, Postgres>,
    location: &'static Location<'static>,
}

impl<'c> Transaction<'c> {
    #[track_caller]
    pub fn begin(pool: &'c PgPool) -> impl Future<Output = DatabaseResult<Transaction<'static>>> + 'c {
        Self::begin_with_location(pool, Location::caller())
    }

    pub async fn begin_with_location(
        pool: &PgPool,
        location: &'static Location<'static>,
    ) -> DatabaseResult<Transaction<'static>> {
        let inner = pool.begin().await.map_err(|source| {
            tracing::warn!(%location, error = %source, "failed to begin transaction");
            DatabaseError::Transaction {
                action: "begin",
                source,
            }
        })?;
        Ok(Transaction { inner, location })
    }

    /// Begin a subtransaction (savepoint) on an in-progress connection.
    /// Multi-insert operations use this so a failure can't leave half of
    /// them written.
    #[track_caller]
    pub fn begin_inner(
        conn: &mut PgConnection,
    ) -> impl Future<Output = DatabaseResult<Transaction<'_>>> {
        let location = Location::caller();
        async move {
            let inner =
                sqlx::Connection::begin(conn)
                    .await
                    .map_err(|source| DatabaseError::Transaction {
                        action: "begin",
                        source,
                    })?;
            Ok(Transaction { inner, location })
        }
    }

    pub async fn commit(self) -> DatabaseResult<()> {
        let location = self.location;
        self.inner.commit().await.map_err(|source| {
            tracing::warn!(%location, error = %source, "failed to commit transaction");
            DatabaseError::Transaction {
                action: "commit",
                source,
            }
        })
    }

    pub async fn rollback(self) -> DatabaseResult<()> {
        self.inner
            .rollback()
            .await
            .map_err(|source| DatabaseError::Transaction {
                action: "rollback",
                source,
            })
    }

    pub fn as_pgconn(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

impl<'c> Deref for Transaction<'c> {
    type Target = sqlx::Transaction<'c, Postgres>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Transaction<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// A typed handle for one filterable column of one table. Filters built from
/// these can't mix up tables or bind a value of the wrong type.
pub trait ColumnInfo<'a> {
    type TableType;
    type ColumnType: Clone
        + Send
        + Sync
        + sqlx::Type<Postgres>
        + sqlx::postgres::PgHasArrayType
        + for<'q> sqlx::Encode<'q, Postgres>
        + 'a;

    fn column_name(&self) -> &'static str;
}

pub enum ObjectColumnFilter<'a, C: ColumnInfo<'a>> {
    NoFilter,
    One(C, &'a C::ColumnType),
    Many(C, &'a [C::ColumnType]),
}

/// A small wrapper over sqlx's QueryBuilder that appends `WHERE`/`AND`
/// clauses from ObjectColumnFilters and keeps the generated SQL available
/// for error reporting.
pub struct FilterableQueryBuilder<'args> {
    builder: QueryBuilder<'args, Postgres>,
    has_where: bool,
}

impl<'args> FilterableQueryBuilder<'args> {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            builder: QueryBuilder::new(base),
            has_where: false,
        }
    }

    fn push_clause(&mut self) {
        if self.has_where {
            self.builder.push(" AND ");
        } else {
            self.builder.push(" WHERE ");
            self.has_where = true;
        }
    }

    pub fn filter<C: ColumnInfo<'args>>(mut self, filter: &ObjectColumnFilter<'args, C>) -> Self {
        match filter {
            ObjectColumnFilter::NoFilter => {}
            ObjectColumnFilter::One(column, value) => {
                self.push_clause();
                self.builder.push(column.column_name());
                self.builder.push(" = ");
                self.builder.push_bind((*value).clone());
            }
            ObjectColumnFilter::Many(column, values) => {
                self.push_clause();
                self.builder.push(column.column_name());
                self.builder.push(" = ANY(");
                self.builder.push_bind(values.to_vec());
                self.builder.push(")");
            }
        }
        self
    }
}

// Everything else (build_query_as, sql, ...) comes straight from the
// underlying QueryBuilder.
impl<'args> Deref for FilterableQueryBuilder<'args> {
    type Target = QueryBuilder<'args, Postgres>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.builder
    }
}

impl DerefMut for FilterableQueryBuilder<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.builder
    }
}

/// The `deallocated_at` cutoff implied by a reuse_after window: rows
/// deallocated at or before this instant are old enough to reclaim.
pub(crate) fn reuse_cutoff(reuse_after: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() - chrono::Duration::seconds(reuse_after)
}

#[cfg(test)]
mod tests {
    use quark_uuid::network::NetworkId;

    use super::*;

    struct FakeRow;

    #[derive(Clone, Copy)]
    struct IdColumn;
    impl ColumnInfo<'_> for IdColumn {
        type TableType = FakeRow;
        type ColumnType = NetworkId;

        fn column_name(&self) -> &'static str {
            "id"
        }
    }

    #[test]
    fn test_filterable_query_builder_sql() {
        let id = NetworkId::from(uuid::Uuid::new_v4());
        let query = FilterableQueryBuilder::new("SELECT * FROM quark_networks")
            .filter(&ObjectColumnFilter::One(IdColumn, &id));
        assert_eq!(query.sql(), "SELECT * FROM quark_networks WHERE id = $1");

        let ids = vec![id, NetworkId::from(uuid::Uuid::new_v4())];
        let query = FilterableQueryBuilder::new("SELECT * FROM quark_networks")
            .filter(&ObjectColumnFilter::Many(IdColumn, &ids));
        assert_eq!(
            query.sql(),
            "SELECT * FROM quark_networks WHERE id = ANY($1)"
        );

        let query = FilterableQueryBuilder::new("SELECT * FROM quark_networks")
            .filter(&ObjectColumnFilter::<IdColumn>::NoFilter);
        assert_eq!(query.sql(), "SELECT * FROM quark_networks");
    }
}
