/*
 * VexFS - Vector Extended File System
 * Copyright 2025 VexFS Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 * Note: Kernel module components are licensed under GPL v2.
 * See LICENSE.kernel for kernel-specific licensing terms.
 */

//! Runtime configuration, mirroring posix.c's `volume_options`/`init()`.

/// Live, per-dispatcher configuration. Threaded through
/// [`crate::dispatch::OperationContext`] explicitly rather than stashed in
/// a global, so the same process can host more than one independently
/// configured instance (§9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocksConfig {
    /// Enforce the mandatory read/write gate against conflicting locks.
    /// Corresponds to the `"mandatory-locks"`/`"mandatory"` volume option.
    pub mandatory_locks: bool,
    /// Emit one `tracing::trace!` per operation entry/exit, matching
    /// `pl_trace_in`/`pl_trace_out`/`pl_trace_block`/`pl_trace_flush`/
    /// `pl_trace_release`.
    pub trace: bool,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            mandatory_locks: false,
            trace: false,
        }
    }
}

impl LocksConfig {
    pub fn new(mandatory_locks: bool, trace: bool) -> Self {
        Self {
            mandatory_locks,
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_permissive_and_quiet() {
        let cfg = LocksConfig::default();
        assert!(!cfg.mandatory_locks);
        assert!(!cfg.trace);
    }
}
