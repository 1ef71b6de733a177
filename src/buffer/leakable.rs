//! An owning handle that does not free on drop

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Signals ownership of a heap value without managing it.
///
/// Dropping a `LeakableBox` leaks the value. The holder must either call
/// [`release`](LeakableBox::release) or hand the value over to automatic
/// management with [`into_box`](LeakableBox::into_box); raw-pointer
/// owners use [`into_raw`](LeakableBox::into_raw) and
/// [`from_raw`](LeakableBox::from_raw).
#[must_use = "dropping a LeakableBox leaks its value; call release() or into_box()"]
pub struct LeakableBox<T> {
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

unsafe impl<T: Send> Send for LeakableBox<T> {}
unsafe impl<T: Sync> Sync for LeakableBox<T> {}

impl<T> LeakableBox<T> {
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    pub fn from_box(boxed: Box<T>) -> Self {
        Self {
            ptr: NonNull::from(Box::leak(boxed)),
            _owns: PhantomData,
        }
    }

    /// Destroy the value now
    pub fn release(self) {
        drop(self.into_box());
    }

    /// Give the value to a `Box`, which frees it on drop
    pub fn into_box(self) -> Box<T> {
        unsafe { Box::from_raw(self.ptr.as_ptr()) }
    }

    pub fn into_raw(self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// # Safety
    ///
    /// `ptr` must come from [`LeakableBox::into_raw`] (or `Box::into_raw`)
    /// and must not be owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            ptr: NonNull::new_unchecked(ptr),
            _owns: PhantomData,
        }
    }
}

impl<T> Deref for LeakableBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for LeakableBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: fmt::Debug> fmt::Debug for LeakableBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LeakableBox").field(&**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_does_not_release() {
        let drops = Arc::new(AtomicUsize::new(0));
        let handle = LeakableBox::new(Counted(drops.clone()));
        let raw = handle.into_raw();
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        // Reclaim so the test itself does not leak
        unsafe { LeakableBox::from_raw(raw) }.release();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_runs_destructor_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        LeakableBox::new(Counted(drops.clone())).release();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_box_hands_over() {
        let drops = Arc::new(AtomicUsize::new(0));
        let boxed = LeakableBox::new(Counted(drops.clone())).into_box();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(boxed);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deref_mut() {
        let mut handle = LeakableBox::new(vec![1, 2]);
        handle.push(3);
        assert_eq!(*handle, vec![1, 2, 3]);
        handle.release();
    }
}
