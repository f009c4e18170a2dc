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

//! Reservation-module delegation (`F_RESLK_LCK`/`F_RESLK_LCKW`/`F_RESLK_UNLCK`).
//!
//! posix.c's `pl_lk` consults an external reservation keeper before its
//! own grant algorithm runs for every `SETLK`/`SETLKW`. This crate has no
//! opinion on that module's grant policy (spec.md §9 Open Questions
//! leaves it out of scope) but preserves the call sequence: `verify` is
//! asked first, and only on a favorable answer does `table`'s algorithm
//! get to run.

use crate::error::Result;
use crate::frame::Identity;

/// What the external reservation keeper decides for a pending SETLK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationVerdict {
    Allow,
    Deny,
}

/// Trait boundary for the reservation module. Supplied by the caller;
/// this crate only calls it, never implements real reservation policy.
pub trait ReservationGate {
    fn verify(&self, identity: &Identity, start: i64, end: i64) -> Result<ReservationVerdict>;
}

/// Always-allow implementation for composing the dispatcher standalone
/// and for tests that don't exercise reservations.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAllow;

impl ReservationGate for AlwaysAllow {
    fn verify(&self, _identity: &Identity, _start: i64, _end: i64) -> Result<ReservationVerdict> {
        Ok(ReservationVerdict::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn always_allow_never_denies() {
        let gate = AlwaysAllow;
        let id = Identity::new(Arc::from(b"a".as_slice()), 1, 0, 1);
        assert_eq!(gate.verify(&id, 0, 10).unwrap(), ReservationVerdict::Allow);
    }
}
