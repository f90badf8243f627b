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
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A registry of named, lazily created mutexes that serialize contending
/// allocation phases within one process. Purely advisory: it reduces
/// claim-retry churn under local contention, while cross-process
/// correctness rests on the database claims and unique constraints. The
/// whole registry is disabled unless the operator opts in.
pub(crate) struct NamedLocks {
    enabled: bool,
    locks: DashMap<&'static str, Arc<Mutex<()>>>,
}

impl NamedLocks {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            locks: DashMap::new(),
        }
    }

    /// Take the named lock, or None when synchronization is disabled. The
    /// guard releases on drop.
    pub(crate) async fn acquire(&self, name: &'static str) -> Option<OwnedMutexGuard<()>> {
        if !self.enabled {
            return None;
        }
        let lock = self
            .locks
            .entry(name)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Some(lock.lock_owned().await)
    }
}
