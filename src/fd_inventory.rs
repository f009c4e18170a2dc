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

//! Per-fd lock inventory for `GETLK_FD` crash-recovery iteration.
//!
//! Grounded in posix.c's `pl_getlk_fd`/`__get_next_fdctx_lock`/
//! `__set_next_lock_fd`: a client recovering from a crash walks every
//! lock held by one fd, one `fcntl(F_GETLK)`-shaped reply at a time. The
//! translator stashes a cursor in the fd context; here the cursor is an
//! explicit snapshot queue the caller holds across calls, guarded by the
//! owning file's mutex rather than one of its own (§4.4).

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::collections::VecDeque;
#[cfg(feature = "std")]
use std::collections::VecDeque;

use crate::error::{LockError, Result};
use crate::frame::{FdId, FlockReply, LockKind};
use crate::table::FileLockState;

/// A live iteration cursor over one fd's granted locks. Built once from a
/// [`FileLockState`] snapshot (posix.c takes the inode mutex once to copy
/// the list, then iterates the copy lock-free) and consumed by repeated
/// [`FdLockCursor::next`] calls.
pub struct FdLockCursor {
    fd_id: FdId,
    remaining: VecDeque<crate::range::RangeLock>,
}

impl FdLockCursor {
    /// Snapshot every granted lock belonging to `fd_id` on `state`.
    /// Mirrors posix.c's `pl_getlk_fd` initial scan: if nothing is held,
    /// callers should still get one terminal `Eol` reply rather than an
    /// error, so a GETLK_FD on an unlocked fd observes the same contract
    /// as one mid-iteration.
    pub fn new(state: &FileLockState, fd_id: FdId) -> Result<Self> {
        let all = state.snapshot();
        let mine: VecDeque<_> = all.into_iter().filter(|r| r.fd_id == fd_id).collect();
        Ok(Self {
            fd_id,
            remaining: mine,
        })
    }

    pub fn fd_id(&self) -> FdId {
        self.fd_id
    }

    /// Pop the next lock in the snapshot, or the `Eol` sentinel once
    /// exhausted. A non-exhaustive match on the `LockKind` embedded in
    /// the reply is a compile error, so callers cannot forget to check
    /// for the terminator (§4.4, §6).
    pub fn next(&mut self) -> FlockReply {
        match self.remaining.pop_front() {
            Some(r) => r.to_reply(),
            None => FlockReply {
                kind: LockKind::Eol,
                start: 0,
                end: 0,
                client_pid: 0,
                owner: crate::frame::Owner::from(&[][..]),
            },
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Materialize a fresh cursor, mapping an empty/missing inode context to
/// [`LockError::NoLock`] the way `pl_getlk_fd` does when it cannot build
/// the snapshot at all (as opposed to building an empty one).
pub fn open_cursor(state: Option<&FileLockState>, fd_id: FdId) -> Result<FdLockCursor> {
    match state {
        Some(state) => FdLockCursor::new(state, fd_id),
        None => Err(LockError::NoLock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Identity, LockKind as LK};
    use std::sync::Arc;

    fn id(owner: &str, fd: u64) -> Identity {
        Identity::new(Arc::from(owner.as_bytes()), 1, 0, fd)
    }

    #[test]
    fn iteration_ends_with_eol() {
        let state = FileLockState::new(false);
        state.try_grant(LK::Write, 0, 99, &id("a", 7), 1).unwrap();
        state.try_grant(LK::Write, 200, 299, &id("a", 7), 2).unwrap();

        let mut cursor = FdLockCursor::new(&state, 7).unwrap();
        let first = cursor.next();
        assert_ne!(first.kind, LK::Eol);
        let second = cursor.next();
        assert_ne!(second.kind, LK::Eol);
        let third = cursor.next();
        assert_eq!(third.kind, LK::Eol);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn fd_with_no_locks_yields_immediate_eol() {
        let state = FileLockState::new(false);
        let mut cursor = FdLockCursor::new(&state, 42).unwrap();
        assert_eq!(cursor.next().kind, LK::Eol);
    }

    #[test]
    fn missing_inode_context_is_no_lock() {
        assert_eq!(open_cursor(None, 1).unwrap_err(), LockError::NoLock);
    }
}
