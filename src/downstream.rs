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

//! Contract for the storage layer the dispatcher sits in front of.
//!
//! The translator this crate's dispatcher is modeled on forwards most
//! calls straight through to the layer below it; only `truncate` (needs
//! the old size) and `flush` (needs to run after lock release) are
//! touched by locking logic, so every other method here defaults to a
//! no-op a caller can leave unimplemented.

use crate::error::Result;
use crate::frame::FdId;

/// What `dispatch` needs from the layer beneath it. Named methods mirror
/// spec.md §6's consumed-operation list.
pub trait Downstream {
    /// Current file size, needed by `truncate`/`ftruncate` to decide
    /// whether the mandatory gate must stall (posix.c `pl_truncate`
    /// reads `iatt.ia_size` via `stat`/`fstat` first).
    fn file_size(&self, fd_id: FdId) -> Result<u64> {
        let _ = fd_id;
        Ok(0)
    }

    fn truncate(&self, fd_id: FdId, new_size: u64) -> Result<()> {
        let _ = (fd_id, new_size);
        Ok(())
    }

    fn readv(&self, fd_id: FdId, start: i64, len: u64) -> Result<()> {
        let _ = (fd_id, start, len);
        Ok(())
    }

    fn writev(&self, fd_id: FdId, start: i64, len: u64) -> Result<()> {
        let _ = (fd_id, start, len);
        Ok(())
    }

    fn open(&self, fd_id: FdId) -> Result<()> {
        let _ = fd_id;
        Ok(())
    }

    fn create(&self, fd_id: FdId) -> Result<()> {
        let _ = fd_id;
        Ok(())
    }

    fn opendir(&self, fd_id: FdId) -> Result<()> {
        let _ = fd_id;
        Ok(())
    }

    fn lookup(&self, fd_id: FdId) -> Result<()> {
        let _ = fd_id;
        Ok(())
    }

    fn readdirp(&self, fd_id: FdId) -> Result<()> {
        let _ = fd_id;
        Ok(())
    }

    /// Forwarded unchanged once the lock-release half of `flush` has run.
    fn flush(&self, fd_id: FdId) -> Result<()> {
        let _ = fd_id;
        Ok(())
    }
}

/// A `Downstream` that does nothing, for composing the dispatcher
/// standalone and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDownstream;

impl Downstream for NullDownstream {}
