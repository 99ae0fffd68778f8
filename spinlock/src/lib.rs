//! Implements a simple spin-lock based mutex.
//!
//! The kernel is single-CPU for now, so the lock mainly documents which
//! structures are shared; it becomes real mutual exclusion once more CPUs
//! come online.

#![cfg_attr(not(test), no_std)]

use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct Mutex<T> {
    guarded_value: UnsafeCell<T>,
    locked: AtomicBool,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Mutex<T> {
        Mutex {
            guarded_value: UnsafeCell::new(value),
            locked: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> MutexGuard<T> {
        loop {
            if let Some(success) = self.try_lock() {
                return success;
            }
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<T>> {
        if self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    pub fn with_lock<F, R>(&self, callback: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.lock();
        callback(&mut *guard)
    }

    /// Access the value without locking. The exclusive borrow guarantees that
    /// no guard can exist at the same time.
    pub fn get_mut(&mut self) -> &mut T {
        self.guarded_value.get_mut()
    }
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> Deref for MutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.guarded_value.get() }
    }
}

impl<'a, T> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.guarded_value.get() }
    }
}

impl<'a, T> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::Mutex;

    #[test]
    fn test_mutex() {
        let mutex = Mutex::new(0_u32);

        // can always lock in the beginning
        {
            let guard = mutex.try_lock();
            assert!(guard.is_some(), "Unlocked mutex must be lockable");
        }

        // Mutex guard should release it due to the ending scope above
        {
            let guard = mutex.try_lock();
            assert!(guard.is_some(), "Mutex should have been unlocked by guard");

            let guard2 = mutex.try_lock();
            assert!(guard2.is_none(), "Mutex acquired twice");
        }
    }

    #[test]
    fn test_with_lock() {
        let mutex = Mutex::new(41_u32);
        mutex.with_lock(|value| *value += 1);
        assert_eq!(*mutex.lock(), 42);
    }

    #[test]
    fn test_get_mut() {
        let mut mutex = Mutex::new(1_u32);
        *mutex.get_mut() = 2;
        assert_eq!(*mutex.lock(), 2);
    }
}
