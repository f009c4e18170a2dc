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

//! Kernel-compatible synchronization primitives.
//!
//! One mutex guards each file's lock state (§5: "exactly one mutex per
//! file serializes all reads and writes of that file's lock state"). In
//! userspace that's `std::sync::Mutex`; in the `kernel` feature there is no
//! libstd, so a spinlock built on `core::sync::atomic` stands in for it.
//! Both are exposed under the single `VexfsMutex` alias so the rest of the
//! crate never branches on which environment it's in.

#[cfg(feature = "kernel")]
use core::cell::UnsafeCell;
#[cfg(feature = "kernel")]
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "kernel")]
pub struct KernelMutex<T> {
    data: UnsafeCell<T>,
    locked: AtomicBool,
}

#[cfg(feature = "kernel")]
unsafe impl<T: Send> Send for KernelMutex<T> {}
#[cfg(feature = "kernel")]
unsafe impl<T: Send> Sync for KernelMutex<T> {}

#[cfg(feature = "kernel")]
impl<T> KernelMutex<T> {
    pub const fn new(data: T) -> Self {
        Self {
            data: UnsafeCell::new(data),
            locked: AtomicBool::new(false),
        }
    }

    /// Spin until acquired. The core never holds this across a suspension
    /// point (§5), so the critical sections are always short.
    pub fn lock(&self) -> KernelMutexGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        KernelMutexGuard { mutex: self }
    }
}

#[cfg(feature = "kernel")]
pub struct KernelMutexGuard<'a, T> {
    mutex: &'a KernelMutex<T>,
}

#[cfg(feature = "kernel")]
impl<'a, T> core::ops::Deref for KernelMutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

#[cfg(feature = "kernel")]
impl<'a, T> core::ops::DerefMut for KernelMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

#[cfg(feature = "kernel")]
impl<'a, T> Drop for KernelMutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
    }
}

#[cfg(not(feature = "kernel"))]
pub type VexfsMutex<T> = std::sync::Mutex<T>;
#[cfg(feature = "kernel")]
pub type VexfsMutex<T> = KernelMutex<T>;

/// Lock a [`VexfsMutex`] the same way regardless of environment: the std
/// mutex can be poisoned, the kernel one cannot. A poisoned lock means a
/// prior panic happened mid-mutation, which this core's invariants (§3)
/// promise never to leave partially applied; recovering the guard is safe.
#[cfg(not(feature = "kernel"))]
pub fn lock<T>(m: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(feature = "kernel")]
pub fn lock<T>(m: &KernelMutex<T>) -> KernelMutexGuard<'_, T> {
    m.lock()
}
