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

//! POSIX byte-range lock core for a distributed filesystem stacking layer.
//!
//! A direct-consume library: a surrounding translator/stacking layer owns
//! one [`table::FileLockState`] per inode and calls into [`dispatch`] for
//! every `lk`/`flush`/`release`/`truncate`/`readv`/`writev`/`forget`/
//! `getxattr(clear-locks)` it receives. Everything outside that surface —
//! the RPC frame machinery, inode/fd context registries, `entrylk`/
//! `inodelk` domain locks, statedump formatting, volfile parsing — is a
//! collaborator this crate only reaches through small traits
//! ([`downstream::Downstream`], [`reservation::ReservationGate`]) or
//! opaque handles ([`frame::TransportId`], [`frame::FdId`]).

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::sync::Arc;
#[cfg(feature = "std")]
use std::sync::Arc;

pub mod clrlk;
pub mod config;
pub mod dispatch;
pub mod downstream;
pub mod error;
pub mod fd_inventory;
pub mod frame;
pub mod range;
pub mod registry;
pub mod reservation;
pub mod sync;
pub mod table;
pub mod waiters;

pub use clrlk::{apply as clear_locks_apply, parse as clear_locks_parse, ClrlkDirective, ClrlkKind, ClrlkScope};
pub use config::LocksConfig;
pub use dispatch::{
    clear_locks, flush, forget, getlk_fd_cursor, lk, pump_blocked_locks, pump_blocked_rw, readv, release, rw_gate,
    truncate, writev, LkDisposition, LkReply, OperationContext,
};
pub use downstream::{Downstream, NullDownstream};
pub use error::{LockError, Result};
pub use fd_inventory::{open_cursor, FdLockCursor};
pub use frame::{FdId, FlockReply, Identity, InodeId, LkOutcome, LockKind, Owner, Resumable, TransportId};
pub use range::RangeLock;
pub use registry::LockRegistry;
pub use reservation::{AlwaysAllow, ReservationGate, ReservationVerdict};
pub use table::{DomainLockList, FileLockInner, FileLockState};
pub use waiters::{IoKind, RwWaiter};

/// Convenience bundle of everything a caller typically needs to drive one
/// inode's lock state end to end, analogous to the teacher crate's
/// top-level `FileSystem` composing its domain managers.
pub struct LockingCore<D: Downstream, R: ReservationGate> {
    pub config: LocksConfig,
    pub downstream: D,
    pub reservation: R,
    pub registry: LockRegistry,
}

impl<D: Downstream, R: ReservationGate> LockingCore<D, R> {
    pub fn new(config: LocksConfig, downstream: D, reservation: R) -> Self {
        Self {
            config,
            downstream,
            reservation,
            registry: LockRegistry::new(),
        }
    }

    pub fn context(&self, now: u64) -> OperationContext<'_, D, R> {
        OperationContext::new(self.config, &self.downstream, &self.reservation, now)
    }

    pub fn new_file_state(&self) -> FileLockState {
        FileLockState::new(self.config.mandatory_locks)
    }

    /// The lock state for `inode`, created lazily on first access and kept
    /// alive in `self.registry` until a caller runs `dispatch::forget` and
    /// evicts it (spec.md §3 Lifecycle).
    pub fn state_for(&self, inode: InodeId) -> Arc<FileLockState> {
        self.registry.get_or_create(inode, self.config.mandatory_locks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn locking_core_composes_default_collaborators() {
        let core = LockingCore::new(LocksConfig::default(), NullDownstream, AlwaysAllow);
        let state = core.new_file_state();
        let ctx = core.context(1);
        let identity = Identity::new(Arc::from(b"client".as_slice()), 1, 0, 1);
        let disposition = lk(&ctx, &state, false, LockKind::Write, 0, 9, &identity, false, None).unwrap();
        let LkDisposition::Complete(reply) = disposition else {
            panic!("expected Complete, got {:?}", disposition);
        };
        assert_eq!((reply.flock.start, reply.flock.end), (0, 9));
    }

    #[test]
    fn state_for_is_stable_across_calls_for_the_same_inode() {
        let core = LockingCore::new(LocksConfig::default(), NullDownstream, AlwaysAllow);
        let a = core.state_for(100);
        let identity = Identity::new(Arc::from(b"client".as_slice()), 1, 0, 1);
        a.try_grant(LockKind::Write, 0, 9, &identity, 1).unwrap();

        let b = core.state_for(100);
        assert_eq!(b.snapshot().len(), 1, "same inode must return the same lock state");
    }
}
