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

//! Operation dispatcher: `lk`, `flush`, `release`, `truncate`/`ftruncate`,
//! `readv`/`writev`, `forget`, `getxattr(clear-locks)`.
//!
//! Grounded in posix.c's `pl_lk`/`pl_flush`/`pl_release`/`pl_truncate`/
//! `pl_ftruncate`/`pl_readv`/`pl_writev`/`pl_forget`/`pl_getxattr`. Each
//! method here takes the same per-inode [`crate::table::FileLockState`]
//! the caller is responsible for keeping alive for the inode's lifetime
//! (the inode/fd context registry itself is out of scope, §1).

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(not(feature = "std"))]
use alloc::string::String;
#[cfg(feature = "std")]
use std::boxed::Box;
#[cfg(feature = "std")]
use std::string::String;

use crate::clrlk::{self, ClrlkDirective};
use crate::config::LocksConfig;
use crate::downstream::Downstream;
use crate::error::{LockError, Result};
use crate::fd_inventory::{self, FdLockCursor};
use crate::frame::{FdId, FlockReply, Identity, LkOutcome, LockKind, Resumable};
use crate::reservation::{ReservationGate, ReservationVerdict};
use crate::table::FileLockState;
use crate::waiters::{resume_allowed, resume_cancelled, IoKind, RwWaiter};

/// Reply to an `lk` call: the granted/conflicting flock plus the
/// fd-presence diagnostic rewrite posix.c's `pl_lk` tail performs on
/// `l_type` (RDLCK if the fd still holds any lock afterward, else
/// UNLCK) — preserved verbatim per spec.md §9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LkReply {
    pub flock: FlockReply,
    pub fd_still_locked: bool,
}

/// What the caller of [`lk`] must do with this request, matching the
/// `INIT -> {GRANTED, WOULD_BLOCK, PARKED}` state machine of spec.md §4.5:
/// `WouldBlock` is an immediate `EAGAIN` reply (carried as `Err` so the
/// `?` operator composes with the rest of this module's error handling);
/// `Complete` and `Parked` both come back `Ok` since neither is a failure
/// of the call itself.
#[derive(Debug)]
pub enum LkDisposition {
    /// Reply to the caller now with this flock.
    Complete(LkReply),
    /// No synchronous reply: the request's continuation has been (or, for
    /// a request rejected before parking, already was) handed its outcome
    /// through `Resumable::resume`. The caller must not also send an
    /// `EAGAIN`/success reply of its own for this call.
    Parked,
}

/// Everything an operation needs beyond the file's own lock state:
/// identity of the caller, a monotonic clock, config, and the two
/// external collaborators. Threaded explicitly rather than stored in a
/// global (§5 ambient addition, §9 Design Notes).
pub struct OperationContext<'a, D: Downstream, R: ReservationGate> {
    pub config: LocksConfig,
    pub downstream: &'a D,
    pub reservation: &'a R,
    pub now: u64,
}

impl<'a, D: Downstream, R: ReservationGate> OperationContext<'a, D, R> {
    pub fn new(config: LocksConfig, downstream: &'a D, reservation: &'a R, now: u64) -> Self {
        Self {
            config,
            downstream,
            reservation,
            now,
        }
    }

    fn trace(&self, op: &str) {
        if self.config.trace {
            tracing::trace!(operation = op, "lock core operation");
        }
    }
}

/// `SETLK`/`SETLKW`/`GETLK` dispatch. `can_block` distinguishes
/// `SETLKW`/blocking `fcntl` from the non-blocking variants; a caller
/// passing `frame = None` with `can_block = true` gets `WouldBlock`
/// instead of being silently granted, since there would be nothing to
/// resume it later.
///
/// Returns `Ok(LkDisposition::Parked)` when (and only when) the caller
/// must not reply synchronously — either the request was actually
/// enqueued on the blocked list, or it was refused before parking while
/// still holding a real continuation, which is resumed in place with
/// `LkOutcome::Cancelled` rather than dropped (§4.5).
#[allow(clippy::too_many_arguments)]
pub fn lk<D: Downstream, R: ReservationGate>(
    ctx: &OperationContext<'_, D, R>,
    state: &FileLockState,
    get_lock: bool,
    kind: LockKind,
    start: i64,
    end: i64,
    identity: &Identity,
    can_block: bool,
    frame: Option<Box<dyn Resumable>>,
) -> Result<LkDisposition> {
    ctx.trace("lk");

    if start < 0 || end < start {
        return Err(LockError::Invalid("negative or inverted lock range".into()));
    }

    if get_lock {
        let conflict = state.first_conflict(kind, start, end, identity);
        let flock = match conflict {
            Some(r) => r.to_reply(),
            None => FlockReply {
                kind: LockKind::Unlock,
                start,
                end,
                client_pid: identity.client_pid,
                owner: identity.owner.clone(),
            },
        };
        return Ok(LkDisposition::Complete(LkReply {
            fd_still_locked: state.fd_holds_any_lock(identity.fd_id),
            flock,
        }));
    }

    if let ReservationVerdict::Deny = ctx.reservation.verify(identity, start, end)? {
        if can_block {
            if let Some(frame) = frame {
                frame.resume(LkOutcome::Cancelled);
                return Ok(LkDisposition::Parked);
            }
        }
        return Err(LockError::WouldBlock);
    }

    let granted = state.try_grant(kind, start, end, identity, ctx.now)?;
    if granted {
        let flock = FlockReply {
            kind,
            start,
            end,
            client_pid: identity.client_pid,
            owner: identity.owner.clone(),
        };
        return Ok(LkDisposition::Complete(LkReply {
            fd_still_locked: state.fd_holds_any_lock(identity.fd_id),
            flock,
        }));
    }

    if !can_block {
        return Err(LockError::WouldBlock);
    }
    let frame = frame.ok_or(LockError::WouldBlock)?;
    let mut record = crate::range::RangeLock::new(kind, start, end, identity, ctx.now);
    record.blocked_at = Some(ctx.now);
    record.frame = Some(frame);
    state.enqueue_blocked(record);
    Ok(LkDisposition::Parked)
}

/// Run the wake pass for `state` and resume every newly granted `SETLKW`
/// outside the mutex (§5). Call this after any operation that can clear
/// a conflict (`UNLCK`, `flush`, `release`, `forget`).
pub fn pump_blocked_locks(state: &FileLockState) {
    for (frame, outcome) in state.grant_blocked() {
        frame.resume(outcome);
    }
}

/// Evaluate the mandatory read/write gate for a pending `readv`/`writev`.
/// Returns `Ok(true)` if the I/O may proceed immediately, `Ok(false)` if
/// it was parked on `rw_list` (only valid when `can_block`), or
/// `Err(WouldBlock)` for a non-blocking (`O_NONBLOCK`) caller hitting a
/// conflict (posix.c `pl_readv`/`pl_writev`/`__rw_allowable`).
pub fn rw_gate<D: Downstream, R: ReservationGate>(
    ctx: &OperationContext<'_, D, R>,
    state: &FileLockState,
    io_kind: IoKind,
    start: i64,
    end: i64,
    identity: &Identity,
    can_block: bool,
    frame: Option<Box<dyn Resumable>>,
) -> Result<bool> {
    ctx.trace("rw_gate");
    if !ctx.config.mandatory_locks || !state.is_mandatory() {
        return Ok(true);
    }
    let granted = state.granted_ranges_for_gate();
    let probe = RwWaiter::new(io_kind, start, end, identity, Box::new(NullFrame));
    if probe.is_allowed(&granted) {
        return Ok(true);
    }
    if !can_block {
        return Err(LockError::WouldBlock);
    }
    let frame = frame.ok_or(LockError::WouldBlock)?;
    state.push_waiter(RwWaiter::new(io_kind, start, end, identity, frame));
    Ok(false)
}

/// A frame that is never actually resumed, used only to probe
/// [`RwWaiter::is_allowed`] without a real continuation in hand.
struct NullFrame;
impl Resumable for NullFrame {
    fn resume(self: Box<Self>, _outcome: LkOutcome) {}
}

/// Run the wake pass for blocked mandatory-mode I/O on `state`, resuming
/// every stub whose range is no longer covered by a foreign lock.
pub fn pump_blocked_rw(state: &FileLockState) {
    let allowed = state.drain_allowed_waiters();
    resume_allowed(allowed);
}

/// `readv`/`writev`: gate, then forward to the storage layer.
pub fn readv<D: Downstream, R: ReservationGate>(
    ctx: &OperationContext<'_, D, R>,
    state: &FileLockState,
    identity: &Identity,
    start: i64,
    len: u64,
    can_block: bool,
    frame: Option<Box<dyn Resumable>>,
) -> Result<Option<()>> {
    ctx.trace("readv");
    let end = end_of(start, len);
    if rw_gate(ctx, state, IoKind::Read, start, end, identity, can_block, frame)? {
        ctx.downstream.readv(identity.fd_id, start, len)?;
        Ok(Some(()))
    } else {
        Ok(None)
    }
}

pub fn writev<D: Downstream, R: ReservationGate>(
    ctx: &OperationContext<'_, D, R>,
    state: &FileLockState,
    identity: &Identity,
    start: i64,
    len: u64,
    can_block: bool,
    frame: Option<Box<dyn Resumable>>,
) -> Result<Option<()>> {
    ctx.trace("writev");
    let end = end_of(start, len);
    if rw_gate(ctx, state, IoKind::Write, start, end, identity, can_block, frame)? {
        ctx.downstream.writev(identity.fd_id, start, len)?;
        Ok(Some(()))
    } else {
        Ok(None)
    }
}

fn end_of(start: i64, len: u64) -> i64 {
    if len == 0 {
        return start;
    }
    start.saturating_add(len as i64 - 1)
}

/// `truncate`/`ftruncate`: the original reads the current size first
/// (`stat`/`fstat`) and stalls only if the truncation would touch a
/// range covered by a foreign lock (posix.c `pl_truncate`). A truncate
/// to a smaller size locks `[new_size, old_size)`; a truncate to a
/// larger size locks `[old_size, new_size)`; equal sizes never stall.
pub fn truncate<D: Downstream, R: ReservationGate>(
    ctx: &OperationContext<'_, D, R>,
    state: &FileLockState,
    identity: &Identity,
    new_size: u64,
) -> Result<()> {
    ctx.trace("truncate");
    let old_size = ctx.downstream.file_size(identity.fd_id)?;
    if old_size != new_size {
        let (start, end) = if new_size < old_size {
            (new_size as i64, old_size as i64 - 1)
        } else {
            (old_size as i64, new_size as i64 - 1)
        };
        let allowed = rw_gate(ctx, state, IoKind::Write, start, end, identity, false, None);
        if let Err(e) = allowed {
            return Err(e);
        }
    }
    ctx.downstream.truncate(identity.fd_id, new_size)
}

/// `flush`: release locks for the flushing owner (posix.c `pl_flush`). A
/// zero owner means "the client is gone, free everything on this fd";
/// any other owner only releases the locks `(transport, owner)` took —
/// a dup'd fd shared by a different owner keeps its own locks (§4.5).
/// Blocked `SETLKW`s and blocked I/O on the fd are cancelled either way —
/// the original explicitly wakes both queues on flush regardless of
/// owner (§9 Open Question, resolved in favor of always waking both).
pub fn flush<D: Downstream, R: ReservationGate>(ctx: &OperationContext<'_, D, R>, state: &FileLockState, identity: &Identity) -> Result<()> {
    ctx.trace("flush");
    let removed = if identity.is_zero_owner() {
        state.purge_fd(identity.fd_id)
    } else {
        state.purge_owner(identity.transport, &identity.owner)
    };
    for record in removed {
        if record.blocked {
            if let Some(frame) = record.frame {
                frame.resume(LkOutcome::Cancelled);
            }
        }
    }
    let cancelled = state.purge_fd_waiters(identity.fd_id);
    resume_cancelled(cancelled);
    pump_blocked_locks(state);
    pump_blocked_rw(state);
    ctx.downstream.flush(identity.fd_id)
}

/// `release`: same cleanup as `flush`, for when the fd itself is closed
/// rather than merely flushed (posix.c `pl_release`) — always fd-scoped
/// regardless of owner, since the descriptor itself is going away.
pub fn release<D: Downstream, R: ReservationGate>(ctx: &OperationContext<'_, D, R>, state: &FileLockState, fd_id: FdId) -> Result<()> {
    ctx.trace("release");
    let removed = state.purge_fd(fd_id);
    for record in removed {
        if record.blocked {
            if let Some(frame) = record.frame {
                frame.resume(LkOutcome::Cancelled);
            }
        }
    }
    let cancelled = state.purge_fd_waiters(fd_id);
    resume_cancelled(cancelled);
    pump_blocked_locks(state);
    pump_blocked_rw(state);
    ctx.downstream.flush(fd_id)
}

/// `forget`: the inode is being evicted from cache. Every record, granted
/// or blocked, is dropped; blocked waiters are resumed with success and
/// `op_ret = -1` rather than `EAGAIN` — the original's contract that
/// forgetting an inode is not itself a lock failure (posix.c `pl_forget`,
/// §7, §9).
pub fn forget(state: &FileLockState) {
    let removed = state.purge_all();
    for record in removed {
        if record.blocked {
            let reply = record.to_reply();
            if let Some(frame) = record.frame {
                frame.resume(LkOutcome::ForgetCancelled(reply));
            }
        }
    }
    let waiters = state.drain_all_waiters();
    for mut waiter in waiters {
        if let Some(frame) = waiter.frame.take() {
            frame.resume(LkOutcome::IoCancelled);
        }
    }
}

/// `getxattr(key = "clear-locks")`: parse the directive, clear matching
/// locks and report the summary string (posix.c `pl_getxattr`).
pub fn clear_locks(state: &FileLockState, directive: &str) -> Result<String> {
    let parsed: ClrlkDirective = clrlk::parse(directive)?;
    let summary = clrlk::apply(state, &parsed);
    pump_blocked_locks(state);
    pump_blocked_rw(state);
    Ok(summary)
}

/// `GETLK_FD`: open (or continue) a crash-recovery iteration cursor over
/// one fd's granted locks.
pub fn getlk_fd_cursor(state: &FileLockState, fd_id: FdId) -> Result<FdLockCursor> {
    fd_inventory::open_cursor(Some(state), fd_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::NullDownstream;
    use crate::reservation::AlwaysAllow;
    use std::sync::{Arc, Mutex};

    fn id(owner: &str, fd: u64) -> Identity {
        Identity::new(Arc::from(owner.as_bytes()), 1, 0, fd)
    }

    struct RecordingFrame {
        out: Arc<Mutex<Vec<LkOutcome>>>,
    }
    impl Resumable for RecordingFrame {
        fn resume(self: Box<Self>, outcome: LkOutcome) {
            self.out.lock().unwrap().push(outcome);
        }
    }

    #[test]
    fn setlk_then_conflicting_setlkw_blocks_then_wakes_on_unlock() {
        let downstream = NullDownstream;
        let reservation = AlwaysAllow;
        let cfg = LocksConfig::default();
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(false);

        let a = id("a", 1);
        let b = id("b", 2);

        let disposition = lk(&ctx, &state, false, LockKind::Write, 0, 99, &a, false, None).unwrap();
        match disposition {
            LkDisposition::Complete(reply) => assert_eq!(reply.flock.kind, LockKind::Write),
            other => panic!("expected Complete, got {:?}", other),
        }

        let results = Arc::new(Mutex::new(Vec::new()));
        let frame = Box::new(RecordingFrame { out: results.clone() });
        let blocked = lk(&ctx, &state, false, LockKind::Write, 50, 149, &b, true, Some(frame));
        assert!(matches!(blocked.unwrap(), LkDisposition::Parked));
        assert!(results.lock().unwrap().is_empty());

        // Unlock a's range and pump the wake pass; b's request should be granted.
        lk(&ctx, &state, false, LockKind::Unlock, 0, 99, &a, false, None).unwrap();
        pump_blocked_locks(&state);
        let outcomes = results.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            LkOutcome::Granted(reply) => assert_eq!((reply.start, reply.end), (50, 149)),
            other => panic!("expected Granted, got {:?}", other),
        }
    }

    #[test]
    fn non_blocking_conflict_returns_would_block_immediately() {
        let downstream = NullDownstream;
        let reservation = AlwaysAllow;
        let cfg = LocksConfig::default();
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(false);

        lk(&ctx, &state, false, LockKind::Write, 0, 99, &id("a", 1), false, None).unwrap();
        let err = lk(&ctx, &state, false, LockKind::Write, 0, 99, &id("b", 2), false, None).unwrap_err();
        assert_eq!(err, LockError::WouldBlock);
    }

    #[test]
    fn mandatory_read_blocks_behind_foreign_write_then_proceeds() {
        let downstream = NullDownstream;
        let reservation = AlwaysAllow;
        let cfg = LocksConfig::new(true, false);
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(true);

        let writer = id("writer", 1);
        let reader = id("reader", 2);
        lk(&ctx, &state, false, LockKind::Write, 0, 99, &writer, false, None).unwrap();

        let results = Arc::new(Mutex::new(Vec::new()));
        let frame = Box::new(RecordingFrame { out: results.clone() });
        let proceeded = readv(&ctx, &state, &reader, 0, 100, true, Some(frame)).unwrap();
        assert!(proceeded.is_none());

        lk(&ctx, &state, false, LockKind::Unlock, 0, 99, &writer, false, None).unwrap();
        pump_blocked_rw(&state);
        let outcomes = results.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0], LkOutcome::IoProceed);
    }

    #[test]
    fn flush_cancels_blocked_setlkw_with_eagain() {
        let downstream = NullDownstream;
        let reservation = AlwaysAllow;
        let cfg = LocksConfig::default();
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(false);

        lk(&ctx, &state, false, LockKind::Write, 0, 99, &id("a", 1), false, None).unwrap();
        let results = Arc::new(Mutex::new(Vec::new()));
        let frame = Box::new(RecordingFrame { out: results.clone() });
        let _ = lk(&ctx, &state, false, LockKind::Write, 0, 99, &id("b", 2), true, Some(frame));

        flush(&ctx, &state, &id("b", 2)).unwrap();
        let outcomes = results.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0], LkOutcome::Cancelled);
    }

    struct DenyAll;
    impl ReservationGate for DenyAll {
        fn verify(&self, _identity: &Identity, _start: i64, _end: i64) -> Result<ReservationVerdict> {
            Ok(ReservationVerdict::Deny)
        }
    }

    #[test]
    fn reservation_deny_resumes_a_blockable_requests_frame_instead_of_dropping_it() {
        let downstream = NullDownstream;
        let reservation = DenyAll;
        let cfg = LocksConfig::default();
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(false);

        let results = Arc::new(Mutex::new(Vec::new()));
        let frame = Box::new(RecordingFrame { out: results.clone() });
        let disposition = lk(&ctx, &state, false, LockKind::Write, 0, 99, &id("a", 1), true, Some(frame)).unwrap();
        assert!(matches!(disposition, LkDisposition::Parked));

        let outcomes = results.lock().unwrap();
        assert_eq!(outcomes.len(), 1, "the SETLKW's frame must be resumed, not dropped");
        assert_eq!(outcomes[0], LkOutcome::Cancelled);
    }

    #[test]
    fn reservation_deny_on_a_non_blocking_request_replies_would_block_immediately() {
        let downstream = NullDownstream;
        let reservation = DenyAll;
        let cfg = LocksConfig::default();
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(false);

        let err = lk(&ctx, &state, false, LockKind::Write, 0, 99, &id("a", 1), false, None).unwrap_err();
        assert_eq!(err, LockError::WouldBlock);
    }

    #[test]
    fn forget_resumes_blocked_waiter_as_success_with_op_ret_negative() {
        let downstream = NullDownstream;
        let reservation = AlwaysAllow;
        let cfg = LocksConfig::default();
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(false);

        lk(&ctx, &state, false, LockKind::Write, 0, 99, &id("a", 1), false, None).unwrap();
        let results = Arc::new(Mutex::new(Vec::new()));
        let frame = Box::new(RecordingFrame { out: results.clone() });
        let _ = lk(&ctx, &state, false, LockKind::Write, 0, 99, &id("b", 2), true, Some(frame));

        forget(&state);
        let outcomes = results.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], LkOutcome::ForgetCancelled(_)));
    }
}
