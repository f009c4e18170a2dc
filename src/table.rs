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

//! Per-inode lock table: the granted+blocked list and the grant algorithm.
//!
//! Grounded in posix.c's `pl_inode_t` (`ext_list`, `rw_list`, one
//! `pthread_mutex_t`) and the `__lock_blocked_add`/`__insert_lock`/
//! `__insert_and_merge` family. `FileLockInner` is the `private` state the
//! translator keeps per inode context; `FileLockState` adds the mutex
//! (§5: exactly one per file).

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::boxed::Box;

use derivative::Derivative;

use crate::error::{LockError, Result};
use crate::frame::{FdId, Identity, LkOutcome, LockKind};
use crate::range::{conflicts, merge_if_adjacent_or_overlap, same_owner, subtract, RangeLock};
use crate::sync::{lock, VexfsMutex};
use crate::waiters::RwWaiter;

/// Opaque placeholder for the external inodelk/entrylk domain-lock state
/// (out of scope per spec.md §1); present purely so callers that thread a
/// domain-lock list through the same inode context have somewhere to put
/// it without this crate interpreting it.
#[derive(Debug, Default, Clone)]
pub struct DomainLockList;

/// The mutable state guarded by a file's single mutex (spec's `F`).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FileLockInner {
    pub ext_list: Vec<RangeLock>,
    #[derivative(Debug = "ignore")]
    pub rw_list: Vec<RwWaiter>,
    pub mandatory: bool,
    pub dom_list: DomainLockList,
}

impl FileLockInner {
    pub fn new(mandatory: bool) -> Self {
        Self {
            ext_list: Vec::new(),
            rw_list: Vec::new(),
            mandatory,
            dom_list: DomainLockList,
        }
    }
}

/// Per-file lock state: one mutex serializes every read and mutation of
/// this file's `ext_list`/`rw_list` (§5).
pub struct FileLockState {
    inner: VexfsMutex<FileLockInner>,
}

impl FileLockState {
    pub fn new(mandatory: bool) -> Self {
        Self {
            inner: VexfsMutex::new(FileLockInner::new(mandatory)),
        }
    }

    /// True if the fd referenced by `fd_id` currently holds any granted
    /// record, used for the `l_type` diagnostic rewrite (posix.c
    /// `pl_update_refkeeper`, spec.md §9).
    pub fn fd_holds_any_lock(&self, fd_id: FdId) -> bool {
        let guard = lock(&self.inner);
        guard.ext_list.iter().any(|r| !r.blocked && r.fd_id == fd_id)
    }

    /// Find any granted record conflicting with the requested range,
    /// for `GETLK` (posix.c `pl_getlk`): returns the first conflict found
    /// rather than every one, matching `fcntl(2)`'s single-reply contract.
    pub fn first_conflict(&self, kind: LockKind, start: i64, end: i64, identity: &Identity) -> Option<RangeLock> {
        let guard = lock(&self.inner);
        let probe = RangeLock::new(kind, start, end, identity, 0);
        guard
            .ext_list
            .iter()
            .find(|r| !r.blocked && conflicts(&probe, r))
            .map(|r| RangeLock {
                kind: r.kind,
                start: r.start,
                end: r.end,
                owner: r.owner.clone(),
                client_pid: r.client_pid,
                transport: r.transport,
                fd_id: r.fd_id,
                blocked: r.blocked,
                granted_at: r.granted_at,
                blocked_at: r.blocked_at,
                frame: None,
            })
    }

    /// SETLK / SETLKW grant attempt. On success the range (possibly split
    /// across existing same-owner records) is inserted and merged; on
    /// conflict with `can_block = false` returns `WouldBlock`; with
    /// `can_block = true` the caller is responsible for constructing a
    /// blocked [`RangeLock`] (with its `frame`) and calling
    /// [`FileLockState::enqueue_blocked`] instead.
    pub fn try_grant(&self, kind: LockKind, start: i64, end: i64, identity: &Identity, now: u64) -> Result<bool> {
        if start < 0 || end < start {
            return Err(LockError::Invalid("negative or inverted range".into()));
        }
        let mut guard = lock(&self.inner);

        if matches!(kind, LockKind::Unlock) {
            unlock_range(&mut guard, start, end, identity);
            return Ok(true);
        }

        let probe = RangeLock::new(kind, start, end, identity, now);
        let blocked_by_other = guard.ext_list.iter().any(|r| !r.blocked && conflicts(&probe, r));
        if blocked_by_other {
            return Ok(false);
        }

        // Same-owner overlapping ranges of a different kind are resolved
        // by the new request rather than treated as a conflict (POSIX
        // semantics: a process's own lock never blocks itself; the new
        // range simply supersedes the overlapping part of the old one).
        split_same_owner_overlaps(&mut guard, &probe);
        insert_and_merge(&mut guard.ext_list, probe);
        Ok(true)
    }

    /// Park a blocked SETLKW request. Called with the same range that
    /// just failed [`try_grant`]; the record carries the continuation.
    pub fn enqueue_blocked(&self, mut record: RangeLock) {
        record.blocked = true;
        let mut guard = lock(&self.inner);
        guard.ext_list.push(record);
    }

    /// Wake pass: scan blocked records in FIFO order, grant every one
    /// that no longer conflicts with anything granted, and return their
    /// continuations to invoke *outside* the mutex (§5). Single pass per
    /// call, matching posix.c `grant_blocked_locks`' one-shot scan.
    pub fn grant_blocked(&self) -> Vec<(Box<dyn crate::frame::Resumable>, LkOutcome)> {
        let mut guard = lock(&self.inner);
        let mut woken = Vec::new();
        let mut i = 0;
        while i < guard.ext_list.len() {
            if !guard.ext_list[i].blocked {
                i += 1;
                continue;
            }
            let still_conflicts = {
                let (candidate, rest) = split_at_index(&guard.ext_list, i);
                rest.iter().any(|r| !r.blocked && conflicts(candidate, r))
            };
            if still_conflicts {
                i += 1;
                continue;
            }
            let mut record = guard.ext_list.remove(i);
            record.blocked = false;
            record.blocked_at = None;
            let reply = record.to_reply();
            let frame = record.frame.take();
            split_same_owner_overlaps(&mut guard, &record);
            insert_and_merge(&mut guard.ext_list, record);
            if let Some(frame) = frame {
                woken.push((frame, LkOutcome::Granted(reply)));
            }
            // Restart the scan: granting one record can unblock others
            // that were scanned earlier and skipped.
            i = 0;
        }
        woken
    }

    /// Drop every record (granted or blocked) belonging to `identity`'s
    /// fd. Used by `flush`/`release`; blocked ones are returned so the
    /// caller can resume their continuations with `Cancelled` (§4.3, §7).
    pub fn purge_fd(&self, fd_id: FdId) -> Vec<RangeLock> {
        let mut guard = lock(&self.inner);
        let mut removed = Vec::new();
        let mut i = 0;
        while i < guard.ext_list.len() {
            if guard.ext_list[i].fd_id == fd_id {
                removed.push(guard.ext_list.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Drop every record (granted or blocked) whose `(transport, owner)`
    /// matches. Used by `flush` when the frame carries a real (non-zero)
    /// owner (posix.c `pl_flush`'s `owner_set` branch, §4.5): a flush only
    /// releases the locks taken under that owner, not every lock the fd
    /// happens to also hold under a different owner.
    pub fn purge_owner(&self, transport: crate::frame::TransportId, owner: &crate::frame::Owner) -> Vec<RangeLock> {
        let mut guard = lock(&self.inner);
        let mut removed = Vec::new();
        let mut i = 0;
        while i < guard.ext_list.len() {
            if guard.ext_list[i].transport == transport && &guard.ext_list[i].owner == owner {
                removed.push(guard.ext_list.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Drop every record (granted or blocked) regardless of owner. Used
    /// by `forget` (posix.c `pl_forget`): blocked waiters are resumed with
    /// `ForgetCancelled` rather than `Cancelled` (§7, §9).
    pub fn purge_all(&self) -> Vec<RangeLock> {
        let mut guard = lock(&self.inner);
        guard.ext_list.drain(..).collect()
    }

    /// Remove every record `predicate` matches, leaving every other record
    /// untouched in place rather than drained and reinserted. Used by
    /// `clear-locks` so a record this directive isn't targeting is never
    /// exposed to a concurrent `try_grant` between removal and
    /// reinsertion — the whole filter pass runs under one acquisition of
    /// this file's mutex (§5, §7).
    pub fn purge_matching<F>(&self, mut predicate: F) -> Vec<RangeLock>
    where
        F: FnMut(&RangeLock) -> bool,
    {
        let mut guard = lock(&self.inner);
        let mut removed = Vec::new();
        let mut i = 0;
        while i < guard.ext_list.len() {
            if predicate(&guard.ext_list[i]) {
                removed.push(guard.ext_list.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    pub fn snapshot(&self) -> Vec<RangeLock> {
        let guard = lock(&self.inner);
        guard
            .ext_list
            .iter()
            .filter(|r| !r.blocked)
            .map(|r| RangeLock {
                kind: r.kind,
                start: r.start,
                end: r.end,
                owner: r.owner.clone(),
                client_pid: r.client_pid,
                transport: r.transport,
                fd_id: r.fd_id,
                blocked: r.blocked,
                granted_at: r.granted_at,
                blocked_at: r.blocked_at,
                frame: None,
            })
            .collect()
    }

    pub fn set_mandatory(&self, mandatory: bool) {
        lock(&self.inner).mandatory = mandatory;
    }

    pub fn is_mandatory(&self) -> bool {
        lock(&self.inner).mandatory
    }

    pub fn push_waiter(&self, waiter: RwWaiter) {
        lock(&self.inner).rw_list.push(waiter);
    }

    pub fn drain_allowed_waiters(&self) -> Vec<RwWaiter> {
        let mut guard = lock(&self.inner);
        let ext = guard.ext_list.clone_granted_ranges();
        let mut allowed = Vec::new();
        let mut i = 0;
        while i < guard.rw_list.len() {
            if guard.rw_list[i].is_allowed(&ext) {
                allowed.push(guard.rw_list.remove(i));
            } else {
                i += 1;
            }
        }
        allowed
    }

    pub fn granted_ranges_for_gate(&self) -> Vec<(i64, i64, crate::frame::Owner, crate::frame::TransportId, LockKind)> {
        let guard = lock(&self.inner);
        guard.ext_list.clone_granted_ranges()
    }

    pub fn purge_fd_waiters(&self, fd_id: FdId) -> Vec<RwWaiter> {
        let mut guard = lock(&self.inner);
        let mut removed = Vec::new();
        let mut i = 0;
        while i < guard.rw_list.len() {
            if guard.rw_list[i].fd_id == fd_id {
                removed.push(guard.rw_list.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    pub fn drain_all_waiters(&self) -> Vec<RwWaiter> {
        let mut guard = lock(&self.inner);
        guard.rw_list.drain(..).collect()
    }
}

trait GrantedRangesExt {
    fn clone_granted_ranges(&self) -> Vec<(i64, i64, crate::frame::Owner, crate::frame::TransportId, LockKind)>;
}

impl GrantedRangesExt for Vec<RangeLock> {
    fn clone_granted_ranges(&self) -> Vec<(i64, i64, crate::frame::Owner, crate::frame::TransportId, LockKind)> {
        self.iter()
            .filter(|r| !r.blocked)
            .map(|r| (r.start, r.end, r.owner.clone(), r.transport, r.kind))
            .collect()
    }
}

fn split_at_index(list: &[RangeLock], i: usize) -> (&RangeLock, SplitRest<'_>) {
    (&list[i], SplitRest { list, skip: i })
}

struct SplitRest<'a> {
    list: &'a [RangeLock],
    skip: usize,
}

impl<'a> SplitRest<'a> {
    fn iter(&self) -> impl Iterator<Item = &'a RangeLock> + '_ {
        let skip = self.skip;
        self.list.iter().enumerate().filter(move |(i, _)| *i != skip).map(|(_, r)| r)
    }
}

/// Remove `[start,end]` from every granted record owned by `identity`,
/// splitting records that only partially overlap (posix.c
/// `__delete_lock_from_list` / `subtract_locks`).
fn unlock_range(inner: &mut FileLockInner, start: i64, end: i64, identity: &Identity) {
    let probe_owner = identity.owner.clone();
    let probe_transport = identity.transport;
    let mut replacements: Vec<RangeLock> = Vec::new();
    let mut i = 0;
    while i < inner.ext_list.len() {
        let same = inner.ext_list[i].owner == probe_owner && inner.ext_list[i].transport == probe_transport;
        if !same || inner.ext_list[i].blocked {
            i += 1;
            continue;
        }
        let existing = inner.ext_list.remove(i);
        let residual = subtract(existing.start, existing.end, start, end);
        for (rs, re) in residual {
            replacements.push(RangeLock {
                kind: existing.kind,
                start: rs,
                end: re,
                owner: existing.owner.clone(),
                client_pid: existing.client_pid,
                transport: existing.transport,
                fd_id: existing.fd_id,
                blocked: false,
                granted_at: existing.granted_at,
                blocked_at: None,
                frame: None,
            });
        }
    }
    for r in replacements {
        insert_and_merge(&mut inner.ext_list, r);
    }
}

/// Before inserting `incoming`, carve its range out of any same-owner
/// granted record it overlaps but doesn't share a kind with (a write
/// replacing part of a read range, or vice versa).
fn split_same_owner_overlaps(inner: &mut FileLockInner, incoming: &RangeLock) {
    let mut replacements: Vec<RangeLock> = Vec::new();
    let mut i = 0;
    while i < inner.ext_list.len() {
        let candidate = &inner.ext_list[i];
        if candidate.blocked || !same_owner(candidate, incoming) || candidate.kind == incoming.kind {
            i += 1;
            continue;
        }
        if crate::range::overlap(candidate.start, candidate.end, incoming.start, incoming.end) {
            let existing = inner.ext_list.remove(i);
            let residual = subtract(existing.start, existing.end, incoming.start, incoming.end);
            for (rs, re) in residual {
                replacements.push(RangeLock {
                    kind: existing.kind,
                    start: rs,
                    end: re,
                    owner: existing.owner.clone(),
                    client_pid: existing.client_pid,
                    transport: existing.transport,
                    fd_id: existing.fd_id,
                    blocked: false,
                    granted_at: existing.granted_at,
                    blocked_at: None,
                    frame: None,
                });
            }
        } else {
            i += 1;
        }
    }
    for r in replacements {
        insert_and_merge(&mut inner.ext_list, r);
    }
}

/// Insert `incoming`, coalescing it with any granted, same-owner,
/// same-kind record it overlaps or touches (P2: ranges stay maximally
/// coalesced).
fn insert_and_merge(list: &mut Vec<RangeLock>, mut incoming: RangeLock) {
    let mut i = 0;
    while i < list.len() {
        let mergeable = !list[i].blocked
            && same_owner(&list[i], &incoming)
            && list[i].kind == incoming.kind
            && merge_if_adjacent_or_overlap(list[i].start, list[i].end, incoming.start, incoming.end).is_some();
        if mergeable {
            let existing = list.remove(i);
            let (start, end) = merge_if_adjacent_or_overlap(existing.start, existing.end, incoming.start, incoming.end).unwrap();
            incoming.start = start;
            incoming.end = end;
            incoming.granted_at = incoming.granted_at.min(existing.granted_at);
        } else {
            i += 1;
        }
    }
    list.push(incoming);
}
