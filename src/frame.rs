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

//! Owner/transport identity and the suspend/resume capability.
//!
//! The original translator stashes a caller's `call_frame_t` inside a
//! blocked lock record and later `STACK_UNWIND`s it from the wake path
//! (posix.c `pl_lk`/`grant_blocked_locks`/`pl_forget`). Rather than model
//! an RPC frame directly (out of scope per spec.md §1 — "the RPC frame
//! machinery that suspends/resumes a call" is an external collaborator),
//! a pending operation is represented here as a single-shot `Resumable`
//! capability: the core owns it while the request is parked and hands it
//! to the waking thread inside the file mutex, which then calls it after
//! releasing the mutex (§5, §9 "Continuation-passing on suspension").

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(not(feature = "std"))]
use alloc::sync::Arc;
#[cfg(feature = "std")]
use std::boxed::Box;
#[cfg(feature = "std")]
use std::sync::Arc;

/// Opaque owner identifier, client-chosen. Compared by byte equality plus
/// transport equality, never by pid (§9: two processes on the same
/// machine may share owners NFS-style, or differ despite identical pids).
pub type Owner = Arc<[u8]>;

/// Stable numeric surrogate for the originating descriptor. A raw
/// descriptor pointer is never compared directly (§3).
pub type FdId = u64;

/// Opaque handle identifying the connection a request arrived on.
pub type TransportId = u64;

/// Numeric surrogate for the inode a file's lock state is keyed by.
pub type InodeId = u64;

/// What kind of range-lock a record represents, plus the GETLK_FD
/// iteration terminator as a real variant rather than a magic value, so a
/// non-exhaustive match on it is a compile error (§4.4, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Read,
    Write,
    Unlock,
    /// End-of-list sentinel returned by `GETLK_FD` iteration.
    Eol,
}

/// Identity carried by every incoming request: who is asking, over which
/// connection, for which descriptor. Mirrors `frame->root->{trans,pid,
/// lk_owner}` plus the fd the request arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub owner: Owner,
    pub transport: TransportId,
    pub client_pid: u32,
    pub fd_id: FdId,
}

impl Identity {
    pub fn new(owner: Owner, transport: TransportId, client_pid: u32, fd_id: FdId) -> Self {
        Self {
            owner,
            transport,
            client_pid,
            fd_id,
        }
    }

    /// The zero-owner sentinel used by the surrounding runtime to signal
    /// "client gone; free everything on this fd" (§4.5 `flush`, GLOSSARY).
    pub fn is_zero_owner(&self) -> bool {
        self.owner.is_empty()
    }
}

/// What a caller's continuation is told when its parked request completes.
/// Shared by both blocked `SETLKW` records and blocked mandatory-mode I/O
/// stubs, which is why it carries both lock-shaped and I/O-shaped variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LkOutcome {
    /// A blocked `SETLKW` was granted; carries the final, possibly-widened
    /// range.
    Granted(FlockReply),
    /// flush/release revoked a blocked `SETLKW`: reply EAGAIN (§4.3, §7).
    Cancelled,
    /// The inode was forgotten while a `SETLKW` was blocked: reply success
    /// with the original flock but `op_ret = -1`, preserving the
    /// historical "not a lock failure" contract for inode eviction
    /// (§7, §9).
    ForgetCancelled(FlockReply),
    /// A blocked mandatory-mode read/write stub may now proceed.
    IoProceed,
    /// A blocked mandatory-mode read/write stub was revoked by
    /// flush/release/forget and replies EAGAIN.
    IoCancelled,
}

/// A flattened view of a range lock, independent of where it lives in the
/// table — what a `GETLK`/`SETLK` reply or a resumed continuation sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlockReply {
    pub kind: LockKind,
    pub start: i64,
    pub end: i64,
    pub client_pid: u32,
    pub owner: Owner,
}

/// A single-shot capability for resuming a parked request. Implementors
/// are typically thin wrappers around an RPC reply channel; this crate
/// never inspects what's behind one.
pub trait Resumable: Send {
    fn resume(self: Box<Self>, outcome: LkOutcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_owner_is_the_empty_byte_string() {
        let zero = Identity::new(Arc::from(&[][..]), 1, 0, 1);
        assert!(zero.is_zero_owner());

        let named = Identity::new(Arc::from(&b"client-a"[..]), 1, 0, 1);
        assert!(!named.is_zero_owner());
    }
}
