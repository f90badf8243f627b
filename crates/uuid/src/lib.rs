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

pub mod ip;
pub mod mac;
pub mod network;
pub mod port;
pub mod security_group;
pub mod transaction;

#[derive(thiserror::Error, Debug)]
pub enum UuidConversionError {
    #[error("{value} is not a valid {ty}")]
    InvalidUuid { ty: &'static str, value: String },
}

/// Declares a strongly typed UUID for one entity, with trait implementations
/// allowing it to be passed around as a UUID, bound to sqlx queries, used as
/// a map key, etc. Every entity id in the data model gets one of these so a
/// SubnetId can never be handed to a query expecting a NetworkId.
macro_rules! typed_uuid {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(
            Debug,
            Clone,
            Copy,
            serde::Serialize,
            serde::Deserialize,
            PartialOrd,
            Ord,
            Eq,
            PartialEq,
            Hash,
            Default,
        )]
        #[cfg_attr(feature = "sqlx", derive(sqlx::FromRow, sqlx::Type))]
        #[cfg_attr(feature = "sqlx", sqlx(type_name = "UUID"))]
        #[repr(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<&$name> for uuid::Uuid {
            fn from(id: &$name) -> Self {
                id.0
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(value: uuid::Uuid) -> Self {
                $name(value)
            }
        }

        impl From<&uuid::Uuid> for $name {
            fn from(value: &uuid::Uuid) -> Self {
                $name(*value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::UuidConversionError;
            fn from_str(input: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(input).map_err(|_| {
                    $crate::UuidConversionError::InvalidUuid {
                        ty: stringify!($name),
                        value: input.to_string(),
                    }
                })?))
            }
        }

        #[cfg(feature = "sqlx")]
        impl sqlx::postgres::PgHasArrayType for $name {
            fn array_type_info() -> sqlx::postgres::PgTypeInfo {
                <sqlx::types::Uuid as sqlx::postgres::PgHasArrayType>::array_type_info()
            }

            fn array_compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <sqlx::types::Uuid as sqlx::postgres::PgHasArrayType>::array_compatible(ty)
            }
        }
    };
}

pub(crate) use typed_uuid;

#[cfg(test)]
mod tests {
    use crate::network::NetworkId;

    #[test]
    fn test_typed_id_serializes_as_plain_uuid() {
        // Make sure a typed id serializes as a simple UUID.
        let id = uuid::Uuid::new_v4();
        let network_id = NetworkId::from(id);

        let uuid_json = serde_json::to_string(&id).unwrap();
        let nid_json = serde_json::to_string(&network_id).unwrap();

        assert_eq!(uuid_json, nid_json);
    }

    #[test]
    fn test_typed_id_round_trips_through_str() {
        let id: NetworkId = uuid::Uuid::new_v4().into();
        let parsed: NetworkId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
