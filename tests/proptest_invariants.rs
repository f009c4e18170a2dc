//! Property-based checks for P1 (no two conflicting grants coexist) and
//! P2 (per-owner ranges stay maximally coalesced) across randomized
//! SETLK/UNLCK sequences, the same kind of invariant sweep the teacher
//! crate's `proptest` dev-dependency is used for elsewhere in the stack.

use std::sync::Arc;

use fslocks::{lk, AlwaysAllow, FileLockState, Identity, LockKind, LocksConfig, NullDownstream, OperationContext};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Lock { owner: u8, write: bool, start: i64, len: i64 },
    Unlock { owner: u8, start: i64, len: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3, any::<bool>(), 0i64..64, 1i64..32)
            .prop_map(|(owner, write, start, len)| Op::Lock { owner, write, start, len }),
        (0u8..3, 0i64..64, 1i64..32).prop_map(|(owner, start, len)| Op::Unlock { owner, start, len }),
    ]
}

fn identity(owner: u8) -> Identity {
    Identity::new(Arc::from([owner].as_slice()), owner as u64, 0, owner as u64)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn no_two_conflicting_grants_ever_coexist(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let downstream = NullDownstream;
        let reservation = AlwaysAllow;
        let cfg = LocksConfig::default();
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(false);

        for op in ops.into_iter() {
            match op {
                Op::Lock { owner, write, start, len } => {
                    let end = start + len - 1;
                    let kind = if write { LockKind::Write } else { LockKind::Read };
                    let _ = lk(&ctx, &state, false, kind, start, end, &identity(owner), false, None);
                }
                Op::Unlock { owner, start, len } => {
                    let end = start + len - 1;
                    let _ = lk(&ctx, &state, false, LockKind::Unlock, start, end, &identity(owner), false, None);
                }
            }

            let snapshot = state_snapshot(&state);
            for a in 0..snapshot.len() {
                for b in (a + 1)..snapshot.len() {
                    let (a_owner, a_start, a_end, a_write) = snapshot[a];
                    let (b_owner, b_start, b_end, b_write) = snapshot[b];
                    if a_owner == b_owner {
                        continue;
                    }
                    let overlap = a_start <= b_end && b_start <= a_end;
                    let conflicting_kind = a_write || b_write;
                    prop_assert!(!(overlap && conflicting_kind),
                        "conflicting grants coexisted: ({a_owner},{a_start},{a_end},{a_write}) vs ({b_owner},{b_start},{b_end},{b_write})");
                }
            }
        }
    }

    #[test]
    fn per_owner_same_kind_ranges_never_sit_adjacent_uncoalesced(
        ops in proptest::collection::vec(op_strategy(), 1..40)
    ) {
        let downstream = NullDownstream;
        let reservation = AlwaysAllow;
        let cfg = LocksConfig::default();
        let ctx = OperationContext::new(cfg, &downstream, &reservation, 1);
        let state = FileLockState::new(false);

        for op in ops.into_iter() {
            match op {
                Op::Lock { owner, write, start, len } => {
                    let end = start + len - 1;
                    let kind = if write { LockKind::Write } else { LockKind::Read };
                    let _ = lk(&ctx, &state, false, kind, start, end, &identity(owner), false, None);
                }
                Op::Unlock { owner, start, len } => {
                    let end = start + len - 1;
                    let _ = lk(&ctx, &state, false, LockKind::Unlock, start, end, &identity(owner), false, None);
                }
            }
        }

        let snapshot = state_snapshot(&state);
        for a in 0..snapshot.len() {
            for b in (a + 1)..snapshot.len() {
                let (a_owner, a_start, a_end, a_write) = snapshot[a];
                let (b_owner, b_start, b_end, b_write) = snapshot[b];
                if a_owner != b_owner || a_write != b_write {
                    continue;
                }
                let touching = a_start <= b_end + 1 && b_start <= a_end + 1;
                prop_assert!(!touching,
                    "same-owner same-kind ranges left uncoalesced: ({a_start},{a_end}) and ({b_start},{b_end})");
            }
        }
    }
}

fn state_snapshot(state: &FileLockState) -> Vec<(u8, i64, i64, bool)> {
    state
        .snapshot()
        .into_iter()
        .map(|r| (r.owner[0], r.start, r.end, r.kind == LockKind::Write))
        .collect()
}
