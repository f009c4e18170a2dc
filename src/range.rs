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

//! Byte-range algebra: overlap, conflict, split and merge.
//!
//! Everything here is a pure function over [`RangeLock`] values. Grounded
//! in posix.c's `ranges_overlap`/`same_owner`/`locks_conflict`/
//! `__insert_and_merge` family, reshaped as free functions with no access
//! to a lock table so they're trivially unit-testable in isolation.

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::frame::{FdId, Identity, LockKind, Owner, Resumable, TransportId};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(feature = "std")]
use std::boxed::Box;

/// A single granted or blocked byte-range lock record (spec's `R`).
///
/// `frame` is the continuation to invoke if this record is currently
/// blocked and later gets granted or cancelled; it is `None` for granted
/// records and for non-blocking requests that failed outright.
pub struct RangeLock {
    pub kind: LockKind,
    pub start: i64,
    pub end: i64,
    pub owner: Owner,
    pub client_pid: u32,
    pub transport: TransportId,
    pub fd_id: FdId,
    pub blocked: bool,
    pub granted_at: u64,
    pub blocked_at: Option<u64>,
    pub frame: Option<Box<dyn Resumable>>,
}

impl core::fmt::Debug for RangeLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RangeLock")
            .field("kind", &self.kind)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("owner", &self.owner)
            .field("client_pid", &self.client_pid)
            .field("transport", &self.transport)
            .field("fd_id", &self.fd_id)
            .field("blocked", &self.blocked)
            .field("granted_at", &self.granted_at)
            .field("blocked_at", &self.blocked_at)
            .field("frame", &self.frame.as_ref().map(|_| "<continuation>"))
            .finish()
    }
}

impl RangeLock {
    pub fn new(kind: LockKind, start: i64, end: i64, identity: &Identity, granted_at: u64) -> Self {
        Self {
            kind,
            start,
            end,
            owner: identity.owner.clone(),
            client_pid: identity.client_pid,
            transport: identity.transport,
            fd_id: identity.fd_id,
            blocked: false,
            granted_at,
            blocked_at: None,
            frame: None,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.owner.clone(), self.transport, self.client_pid, self.fd_id)
    }

    pub fn to_reply(&self) -> crate::frame::FlockReply {
        crate::frame::FlockReply {
            kind: self.kind,
            start: self.start,
            end: self.end,
            client_pid: self.client_pid,
            owner: self.owner.clone(),
        }
    }
}

/// True when `[a_start,a_end]` and `[b_start,b_end]` share at least one
/// byte. `i64::MAX` means "to the end of the file" (§3).
pub fn overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    a_start <= b_end && b_start <= a_end
}

/// Same owner means same owner bytes *and* same transport — never pid
/// (§9: NFS-style clients share an owner across many pids; conversely a
/// single process reconnecting gets a new transport and must not coalesce
/// with its former self's stale locks).
pub fn same_owner(a: &RangeLock, b: &RangeLock) -> bool {
    a.owner == b.owner && a.transport == b.transport
}

/// Two records conflict when their ranges overlap, they come from
/// different owners, and at least one of them is a write lock.
pub fn conflicts(a: &RangeLock, b: &RangeLock) -> bool {
    if same_owner(a, b) {
        return false;
    }
    if !overlap(a.start, a.end, b.start, b.end) {
        return false;
    }
    matches!(a.kind, LockKind::Write) || matches!(b.kind, LockKind::Write)
}

/// Subtract `cut` from `whole`, returning the 0, 1 or 2 residual ranges
/// of `whole` that survive. Used when an `UNLCK` or a same-owner
/// conflicting lock splits an existing grant.
pub fn subtract(whole_start: i64, whole_end: i64, cut_start: i64, cut_end: i64) -> Vec<(i64, i64)> {
    if !overlap(whole_start, whole_end, cut_start, cut_end) {
        return alloc_vec_of_one((whole_start, whole_end));
    }
    let mut out = Vec::new();
    if whole_start < cut_start {
        out.push((whole_start, cut_start - 1));
    }
    if whole_end > cut_end {
        out.push((cut_end + 1, whole_end));
    }
    out
}

#[cfg(not(feature = "std"))]
fn alloc_vec_of_one(item: (i64, i64)) -> Vec<(i64, i64)> {
    let mut v = Vec::with_capacity(1);
    v.push(item);
    v
}
#[cfg(feature = "std")]
fn alloc_vec_of_one(item: (i64, i64)) -> Vec<(i64, i64)> {
    std::vec![item]
}

/// Whether two same-owner, same-kind ranges are adjacent or overlapping
/// and therefore eligible to be coalesced into one record (P2).
pub fn mergeable(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    if overlap(a_start, a_end, b_start, b_end) {
        return true;
    }
    // Adjacency: the byte immediately after one range starts the other.
    (a_end != i64::MAX && a_end + 1 == b_start) || (b_end != i64::MAX && b_end + 1 == a_start)
}

/// Merge two mergeable ranges into their union. Caller must have already
/// checked [`mergeable`].
pub fn merge_if_adjacent_or_overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> Option<(i64, i64)> {
    if !mergeable(a_start, a_end, b_start, b_end) {
        return None;
    }
    let start = if a_start < b_start { a_start } else { b_start };
    let end = if a_end == i64::MAX || b_end == i64::MAX {
        i64::MAX
    } else if a_end > b_end {
        a_end
    } else {
        b_end
    };
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_detects_shared_bytes() {
        assert!(overlap(0, 10, 5, 15));
        assert!(overlap(0, 10, 10, 20));
        assert!(!overlap(0, 10, 11, 20));
        assert!(overlap(0, i64::MAX, 1000, 1001));
    }

    #[test]
    fn subtract_splits_middle() {
        let residual = subtract(0, 100, 40, 60);
        assert_eq!(residual, vec![(0, 39), (61, 100)]);
    }

    #[test]
    fn subtract_no_overlap_keeps_whole() {
        let residual = subtract(0, 10, 20, 30);
        assert_eq!(residual, vec![(0, 10)]);
    }

    #[test]
    fn subtract_full_cover_leaves_nothing() {
        let residual = subtract(10, 20, 0, 100);
        assert!(residual.is_empty());
    }

    #[test]
    fn adjacent_ranges_are_mergeable() {
        assert!(mergeable(0, 9, 10, 19));
        assert_eq!(merge_if_adjacent_or_overlap(0, 9, 10, 19), Some((0, 19)));
    }

    #[test]
    fn disjoint_ranges_are_not_mergeable() {
        assert!(!mergeable(0, 9, 11, 19));
        assert_eq!(merge_if_adjacent_or_overlap(0, 9, 11, 19), None);
    }

    #[test]
    fn open_ended_merge_stays_open_ended() {
        assert_eq!(merge_if_adjacent_or_overlap(0, 9, 5, i64::MAX), Some((0, i64::MAX)));
    }
}
