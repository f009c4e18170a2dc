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

//! Mandatory-mode read/write gate: `rw_list` and its wake rule.
//!
//! Grounded in posix.c's `__rw_allowable`/`do_blocked_rw`/`pl_readv`/
//! `pl_writev`: a stalled read or write is represented as a stub parked
//! on `rw_list` until no granted lock from a different owner covers the
//! byte range it touches.

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::boxed::Box;

use crate::frame::{FdId, Identity, LkOutcome, LockKind, Owner, Resumable, TransportId};

/// What kind of I/O a parked stub represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Read,
    Write,
}

/// A blocked `readv`/`writev` request, parked on a file's `rw_list`
/// until its byte range is no longer covered by a conflicting lock.
pub struct RwWaiter {
    pub io_kind: IoKind,
    pub start: i64,
    pub end: i64,
    pub owner: Owner,
    pub transport: TransportId,
    pub fd_id: FdId,
    pub frame: Option<Box<dyn Resumable>>,
}

impl RwWaiter {
    pub fn new(io_kind: IoKind, start: i64, end: i64, identity: &Identity, frame: Box<dyn Resumable>) -> Self {
        Self {
            io_kind,
            start,
            end,
            owner: identity.owner.clone(),
            transport: identity.transport,
            fd_id: identity.fd_id,
            frame: Some(frame),
        }
    }

    /// A stub is allowed to proceed once nothing in `granted` with a
    /// different owner covers its range with a conflicting kind: a read
    /// stub is blocked only by a foreign write lock; a write stub is
    /// blocked by any foreign lock (posix.c `__rw_allowable`).
    pub fn is_allowed(&self, granted: &[(i64, i64, Owner, TransportId, LockKind)]) -> bool {
        !granted.iter().any(|(start, end, owner, transport, kind)| {
            let foreign = *owner != self.owner || *transport != self.transport;
            if !foreign {
                return false;
            }
            if !crate::range::overlap(self.start, self.end, *start, *end) {
                return false;
            }
            match self.io_kind {
                IoKind::Write => true,
                IoKind::Read => matches!(kind, LockKind::Write),
            }
        })
    }

    pub fn cancel_outcome(&self) -> LkOutcome {
        LkOutcome::IoCancelled
    }
}

/// Run every allowed waiter's continuation, letting its I/O proceed.
/// Called outside the file mutex, same as
/// [`crate::table::FileLockState::grant_blocked`]'s wake pass (§5).
pub fn resume_allowed(waiters: Vec<RwWaiter>) {
    for mut waiter in waiters {
        if let Some(frame) = waiter.frame.take() {
            frame.resume(LkOutcome::IoProceed);
        }
    }
}

/// Run every cancelled waiter's continuation with EAGAIN. Used by
/// `flush`/`release` when revoking a client's parked I/O (§4.3, §7).
pub fn resume_cancelled(waiters: Vec<RwWaiter>) {
    for mut waiter in waiters {
        if let Some(frame) = waiter.frame.take() {
            frame.resume(LkOutcome::IoCancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn owner(tag: &str) -> Owner {
        Arc::from(tag.as_bytes())
    }

    #[test]
    fn read_stub_blocked_only_by_foreign_write() {
        let id = Identity::new(owner("reader"), 1, 0, 1);
        let stub = RwWaiter {
            io_kind: IoKind::Read,
            start: 0,
            end: 99,
            owner: id.owner.clone(),
            transport: id.transport,
            fd_id: id.fd_id,
            frame: None,
        };
        let granted_read = [(0, 99, owner("writer"), 2, LockKind::Read)];
        assert!(stub.is_allowed(&granted_read));

        let granted_write = [(0, 99, owner("writer"), 2, LockKind::Write)];
        assert!(!stub.is_allowed(&granted_write));
    }

    #[test]
    fn write_stub_blocked_by_any_foreign_lock() {
        let id = Identity::new(owner("writer-a"), 1, 0, 1);
        let stub = RwWaiter {
            io_kind: IoKind::Write,
            start: 0,
            end: 99,
            owner: id.owner.clone(),
            transport: id.transport,
            fd_id: id.fd_id,
            frame: None,
        };
        let granted_read = [(0, 99, owner("reader"), 2, LockKind::Read)];
        assert!(!stub.is_allowed(&granted_read));
    }

    #[test]
    fn same_owner_lock_never_blocks_its_own_io() {
        let id = Identity::new(owner("me"), 1, 0, 1);
        let stub = RwWaiter {
            io_kind: IoKind::Write,
            start: 0,
            end: 99,
            owner: id.owner.clone(),
            transport: id.transport,
            fd_id: id.fd_id,
            frame: None,
        };
        let granted = [(0, 99, owner("me"), 1, LockKind::Write)];
        assert!(stub.is_allowed(&granted));
    }
}
