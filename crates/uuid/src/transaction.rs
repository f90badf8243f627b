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

use crate::typed_uuid;

typed_uuid!(
    /// TransactionId is a claim token. An allocation stamps it onto a row
    /// with an update-at-most-one-row claim, then re-finds the row by this
    /// id to learn which concrete row it won.
    TransactionId
);
