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

//! `clear-locks` virtual getxattr: an administrative escape hatch for
//! wiping stuck locks off a file without restarting a client.
//!
//! Directive grammar: `"<scope>:<kind>[:<start>,<end>]"`, e.g.
//! `"posix:blocked"` or `"posix:granted:0,99"`. `entry`/`inode` scopes
//! address a separate domain-lock subsystem this crate doesn't implement,
//! and are parsed (so malformed input and out-of-scope input stay
//! distinguishable) but rejected with `Invalid`.

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::format;
#[cfg(not(feature = "std"))]
use alloc::string::String;
#[cfg(feature = "std")]
use std::format;
#[cfg(feature = "std")]
use std::string::String;

use crate::error::{LockError, Result};
use crate::table::FileLockState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClrlkScope {
    Posix,
    Entry,
    Inode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClrlkKind {
    Blocked,
    Granted,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClrlkDirective {
    pub scope: ClrlkScope,
    pub kind: ClrlkKind,
    pub range: Option<(i64, i64)>,
}

/// Parse a `clear-locks` getxattr key's directive suffix.
pub fn parse(directive: &str) -> Result<ClrlkDirective> {
    let mut parts = directive.split(':');
    let scope = match parts.next() {
        Some("posix") => ClrlkScope::Posix,
        Some("entry") => ClrlkScope::Entry,
        Some("inode") => ClrlkScope::Inode,
        _ => return Err(LockError::Invalid(format!("unknown clrlk scope in {:?}", directive))),
    };
    let kind = match parts.next() {
        Some("blocked") => ClrlkKind::Blocked,
        Some("granted") => ClrlkKind::Granted,
        Some("all") => ClrlkKind::All,
        _ => return Err(LockError::Invalid(format!("unknown clrlk kind in {:?}", directive))),
    };
    let range = match parts.next() {
        None => None,
        Some(r) => Some(parse_range(r)?),
    };
    if matches!(scope, ClrlkScope::Entry | ClrlkScope::Inode) {
        return Err(LockError::Invalid("entry/inode clear-locks scope is not handled by this core".into()));
    }
    Ok(ClrlkDirective { scope, kind, range })
}

fn parse_range(s: &str) -> Result<(i64, i64)> {
    let mut pieces = s.split(',');
    let start = pieces
        .next()
        .and_then(|p| p.parse::<i64>().ok())
        .ok_or_else(|| LockError::Invalid(format!("bad clrlk range in {:?}", s)))?;
    let end = pieces
        .next()
        .and_then(|p| p.parse::<i64>().ok())
        .ok_or_else(|| LockError::Invalid(format!("bad clrlk range in {:?}", s)))?;
    Ok((start, end))
}

/// Apply a parsed directive to `state`, clearing the matching records and
/// returning a `"posix: <kind> blocked locks=N granted locks=M"` summary
/// string describing what was cleared.
pub fn apply(state: &FileLockState, directive: &ClrlkDirective) -> String {
    let (mut blocked_cleared, mut granted_cleared) = (0u32, 0u32);

    let matched = state.purge_matching(|record| {
        let in_range = match directive.range {
            None => true,
            Some((rs, re)) => crate::range::overlap(record.start, record.end, rs, re),
        };
        let matches_kind = match directive.kind {
            ClrlkKind::Blocked => record.blocked,
            ClrlkKind::Granted => !record.blocked,
            ClrlkKind::All => true,
        };
        in_range && matches_kind
    });

    for record in matched {
        if record.blocked {
            blocked_cleared += 1;
            if let Some(frame) = record.frame {
                frame.resume(crate::frame::LkOutcome::Cancelled);
            }
        } else {
            granted_cleared += 1;
        }
    }

    format!(
        "posix: {} blocked locks={} granted locks={}",
        kind_label(directive.kind),
        blocked_cleared,
        granted_cleared
    )
}

fn kind_label(kind: ClrlkKind) -> &'static str {
    match kind {
        ClrlkKind::Blocked => "blocked",
        ClrlkKind::Granted => "granted",
        ClrlkKind::All => "all",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Identity, LockKind};
    use std::sync::Arc;

    fn id(owner: &str) -> Identity {
        Identity::new(Arc::from(owner.as_bytes()), 1, 0, 1)
    }

    #[test]
    fn parses_posix_blocked_with_range() {
        let d = parse("posix:blocked:10,20").unwrap();
        assert_eq!(d.scope, ClrlkScope::Posix);
        assert_eq!(d.kind, ClrlkKind::Blocked);
        assert_eq!(d.range, Some((10, 20)));
    }

    #[test]
    fn rejects_unknown_scope() {
        assert!(parse("bogus:all").is_err());
    }

    #[test]
    fn rejects_entry_scope() {
        assert!(parse("entry:all").is_err());
    }

    #[test]
    fn clearing_granted_reports_a_summary_and_empties_the_table() {
        let state = FileLockState::new(false);
        state.try_grant(LockKind::Write, 0, 99, &id("a"), 1).unwrap();
        let directive = parse("posix:granted").unwrap();
        let summary = apply(&state, &directive);
        assert_eq!(summary, "posix: granted blocked locks=0 granted locks=1");
        assert!(state.snapshot().is_empty());
    }
}
