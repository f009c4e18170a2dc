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

//! Error types for the locking core.
//!
//! Mirrors the manual, no_std-safe error enum used across VexFS's shared
//! and fs_core domains rather than a `thiserror` derive, since this crate
//! must build under the `kernel` feature as well as `std`.

use core::fmt;

#[cfg(not(feature = "std"))]
use alloc::string::String;
#[cfg(feature = "std")]
use std::string::String;

pub type Result<T> = core::result::Result<T, LockError>;

/// Errors the locking core can return, matching the errno taxonomy a
/// caller on the other side of the stacking translator expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Malformed range (negative start/length) or unknown `clrlk` scope.
    Invalid(String),
    /// Non-blocking conflict, cancelled waiter, or `O_NONBLOCK` gate hit.
    WouldBlock,
    /// Allocation failure. No partial state is retained when this is returned.
    NoMemory,
    /// Inode context missing during `flush`.
    BadFd,
    /// `GETLK_FD` failed to materialize a snapshot.
    NoLock,
}

impl LockError {
    /// Negative errno value, as the translator would hand back to its caller.
    pub fn to_errno(&self) -> i32 {
        match self {
            LockError::Invalid(_) => -22, // EINVAL
            LockError::WouldBlock => -11, // EAGAIN
            LockError::NoMemory => -12,   // ENOMEM
            LockError::BadFd => -77,      // EBADFD
            LockError::NoLock => -37,     // ENOLCK
        }
    }
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::Invalid(msg) => write!(f, "invalid argument: {}", msg),
            LockError::WouldBlock => write!(f, "operation would block"),
            LockError::NoMemory => write!(f, "out of memory"),
            LockError::BadFd => write!(f, "inode context missing for descriptor"),
            LockError::NoLock => write!(f, "no lock snapshot available"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LockError {}
