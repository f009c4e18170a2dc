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

//! Per-inode lock-state registry: the `inode_ctx` the surrounding
//! translator keeps one of per inode, holding this core's `FileLockState`.
//!
//! `F` (spec's per-file lock state) is "created lazily on first access
//! keyed by inode identity; destroyed on inode forget" (spec.md §3
//! Lifecycle). This module is that keyed table. It is deliberately thin:
//! the lookup itself needs its own short-lived mutex (distinct from each
//! `FileLockState`'s own per-file mutex, §5), but nothing here touches
//! `ext_list`/`rw_list` directly.

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::sync::Arc;
#[cfg(feature = "std")]
use std::sync::Arc;

use core::hash::{BuildHasherDefault, Hasher};
use hashbrown::HashMap;

use crate::frame::InodeId;
use crate::sync::{lock, VexfsMutex};
use crate::table::FileLockState;

/// FNV-1a over the inode id's bytes. `hashbrown` is pulled in with
/// `default-features = false` (no `ahash`/libstd `RandomState`) so the
/// crate stays usable under the `kernel` feature; a fixed, allocation-free
/// hasher stands in for it, which is fine for an `InodeId`-keyed map that
/// never needs to resist adversarial input.
#[derive(Default)]
pub struct InodeIdHasher(u64);

impl Hasher for InodeIdHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut hash = if self.0 == 0 { 0xcbf2_9ce4_8422_2325 } else { self.0 };
        for &b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
        }
        self.0 = hash;
    }
}

type InodeIdHashBuilder = BuildHasherDefault<InodeIdHasher>;

/// Keyed table of `InodeId -> FileLockState`, the registry a stacking
/// translator consults before calling into `dispatch` for a given inode.
/// Grounded in posix.c's `pl_inode_get` (lazy `inode_ctx` creation under
/// `inode->lock`) and `shared/types.rs`'s `hashbrown`-backed maps.
pub struct LockRegistry {
    inner: VexfsMutex<HashMap<InodeId, Arc<FileLockState>, InodeIdHashBuilder>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            inner: VexfsMutex::new(HashMap::with_hasher(InodeIdHashBuilder::default())),
        }
    }

    /// Look up the lock state for `inode`, creating one with
    /// `mandatory_locks` as its default gate setting if this is the first
    /// time the inode has ever been locked (posix.c `pl_inode_get`).
    pub fn get_or_create(&self, inode: InodeId, mandatory_locks: bool) -> Arc<FileLockState> {
        let mut guard = lock(&self.inner);
        if let Some(existing) = guard.get(&inode) {
            return existing.clone();
        }
        let created = Arc::new(FileLockState::new(mandatory_locks));
        guard.insert(inode, created.clone());
        created
    }

    /// Look up without creating; `None` means the inode has never been
    /// locked.
    pub fn get(&self, inode: InodeId) -> Option<Arc<FileLockState>> {
        lock(&self.inner).get(&inode).cloned()
    }

    /// Remove and return the entry for `inode`. The caller is responsible
    /// for running `dispatch::forget` on the returned state before
    /// dropping the last reference (spec.md §3 Lifecycle, §4.5 `forget`).
    pub fn remove(&self, inode: InodeId) -> Option<Arc<FileLockState>> {
        lock(&self.inner).remove(&inode)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_access_creates_lazily_and_is_stable_on_reuse() {
        let registry = LockRegistry::new();
        assert!(registry.get(42).is_none());

        let first = registry.get_or_create(42, false);
        let second = registry.get_or_create(42, true); // mandatory flag ignored on re-fetch
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_inodes_get_distinct_states() {
        let registry = LockRegistry::new();
        let a = registry.get_or_create(1, false);
        let b = registry.get_or_create(2, false);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn forget_removes_the_entry() {
        let registry = LockRegistry::new();
        registry.get_or_create(7, false);
        assert!(registry.remove(7).is_some());
        assert!(registry.get(7).is_none());
        assert!(registry.is_empty());
    }
}
