/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2025 OpenStack Foundation. All rights reserved.
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
use std::time::{Duration, Instant};

/// Per-request accounting of allocation attempts. Each retryable phase
/// registers its attempts here; when the request finishes, one summary line
/// is emitted with totals, timings and the outcome.
pub struct IpamLog {
    attempts: Vec<Attempt>,
    success: bool,
}

struct Attempt {
    phase: &'static str,
    started: Instant,
    elapsed: Option<Duration>,
    success: bool,
}

/// Index of one attempt within the log.
#[derive(Clone, Copy)]
pub struct AttemptHandle(usize);

impl IpamLog {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
            success: true,
        }
    }

    pub fn begin(&mut self, phase: &'static str) -> AttemptHandle {
        self.attempts.push(Attempt {
            phase,
            started: Instant::now(),
            elapsed: None,
            success: true,
        });
        AttemptHandle(self.attempts.len() - 1)
    }

    pub fn fail(&mut self, handle: AttemptHandle) {
        self.attempts[handle.0].success = false;
    }

    pub fn end(&mut self, handle: AttemptHandle) {
        let attempt = &mut self.attempts[handle.0];
        attempt.elapsed = Some(attempt.started.elapsed());
    }

    /// Mark the whole request failed, independent of individual attempts.
    pub fn failed(&mut self) {
        self.success = false;
    }

    /// Emit the summary line. Attempts that never ended contribute no time.
    pub fn finish(self) {
        let total: Duration = self.attempts.iter().filter_map(|a| a.elapsed).sum();
        let passes = self.attempts.iter().filter(|a| a.success).count();
        let fails = self.attempts.len() - passes;
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        tracing::debug!(
            status,
            time_total = ?total,
            attempts = self.attempts.len(),
            passes,
            fails,
            "ipam request finished"
        );
    }
}

impl Default for IpamLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_accounting() {
        let mut log = IpamLog::new();
        let first = log.begin("attempt_to_reallocate_ip");
        log.end(first);
        let second = log.begin("attempt_to_reallocate_ip");
        log.fail(second);
        log.end(second);

        assert_eq!(log.attempts.len(), 2);
        assert!(log.attempts[0].success);
        assert!(!log.attempts[1].success);
        assert!(log.attempts.iter().all(|a| a.elapsed.is_some()));
        assert!(log.success);

        log.failed();
        assert!(!log.success);
        log.finish();
    }
}
