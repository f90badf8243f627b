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

//! Address lifecycle events published to the message bus. Publishing is
//! fire-and-forget: a broker outage costs events, never allocations.

use chrono::{DateTime, Utc};
use quark_uuid::network::SubnetId;
use rumqttc::{AsyncClient, QoS};

/// The channel events are published under.
pub const NOTIFICATION_CHANNEL: &str = "network";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEvent {
    Created,
    Deleted,
}

impl AddressEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AddressEvent::Created => "ip_block.address.create",
            AddressEvent::Deleted => "ip_block.address.delete",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AddressEventPayload {
    pub used_by_tenant_id: String,
    pub ip_block_id: SubnetId,
    pub ip_address: String,
    pub device_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: AddressEvent, payload: AddressEventPayload);
}

/// Publishes events over MQTT on `<channel>/<event_type>` topics. The
/// client's event loop is owned by the service; this only enqueues.
pub struct MqttNotifier {
    client: AsyncClient,
    channel: String,
}

impl MqttNotifier {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            channel: NOTIFICATION_CHANNEL.to_string(),
        }
    }

    pub fn with_channel(client: AsyncClient, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for MqttNotifier {
    async fn publish(&self, event: AddressEvent, payload: AddressEventPayload) {
        let topic = format!("{}/{}", self.channel, event.event_type());
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(%error, topic, "failed to serialize notification payload");
                return;
            }
        };
        if let Err(error) = self
            .client
            .publish(&topic, QoS::AtLeastOnce, false, body)
            .await
        {
            tracing::warn!(%error, topic, "failed to publish notification");
        }
    }
}

/// Logs events instead of publishing them. The default when no broker is
/// configured.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, event: AddressEvent, payload: AddressEventPayload) {
        tracing::info!(
            event = event.event_type(),
            ip_address = %payload.ip_address,
            ip_block_id = %payload.ip_block_id,
            "address event"
        );
    }
}
