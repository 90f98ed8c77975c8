//! WeakIntrusivePtr: nullable observer handle that never keeps the
//! pointee alive, only its counters.

use crate::intrusive_ptr::IntrusivePtr;
use crate::ref_counted::{RefCounted, Upcast};
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ptr::{self, NonNull};
use log::trace;

/// Upgrade failure: the pointee was already finalized (or the handle is empty).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Expired;

impl fmt::Display for Expired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pointee has expired")
    }
}

impl std::error::Error for Expired {}

/// Non-owning handle. Each non-null `WeakIntrusivePtr` holds exactly one
/// weak unit on its pointee and returns it on drop.
pub struct WeakIntrusivePtr<T: RefCounted + ?Sized> {
    ptr: Option<NonNull<T>>,
    _observes: PhantomData<T>,
}

unsafe impl<T: RefCounted + ?Sized + Send + Sync> Send for WeakIntrusivePtr<T> {}
unsafe impl<T: RefCounted + ?Sized + Send + Sync> Sync for WeakIntrusivePtr<T> {}

impl<T: RefCounted + ?Sized> WeakIntrusivePtr<T> {
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _observes: PhantomData,
        }
    }

    /// Wrap a raw pointee address, acquiring a weak unit when `add_weak`
    /// is set and adopting one the caller owns otherwise.
    ///
    /// # Safety
    /// A non-null `ptr` must have live storage on which the caller owns a
    /// strong or weak unit. With `add_weak == false` that unit must be a
    /// weak one, and it is handed over.
    pub unsafe fn from_raw(ptr: Option<NonNull<T>>, add_weak: bool) -> Self {
        if let (Some(p), true) = (ptr, add_weak) {
            unsafe { T::add_weak_ref(p) };
        }
        Self {
            ptr,
            _observes: PhantomData,
        }
    }

    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
            _observes: PhantomData,
        }
    }

    /// Clear without releasing; the caller inherits the weak unit.
    pub fn detach(&mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    pub fn into_raw(self) -> Option<NonNull<T>> {
        ManuallyDrop::new(self).ptr
    }

    pub fn reset(&mut self) {
        if let Some(old) = self.ptr.take() {
            unsafe { T::release_weak(old) };
        }
    }

    /// Install `ptr`, then release the previously held weak unit.
    ///
    /// # Safety
    /// Same contract as [`WeakIntrusivePtr::from_raw`].
    pub unsafe fn reset_to(&mut self, ptr: Option<NonNull<T>>, add_weak: bool) {
        let new = unsafe { Self::from_raw(ptr, add_weak) };
        drop(mem::replace(self, new));
    }

    /// Raw address. The object behind it may already be finalized.
    #[inline]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        self.ptr.is_some()
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
    }

    pub fn ptr_eq<U: RefCounted + ?Sized>(&self, other: &WeakIntrusivePtr<U>) -> bool {
        self.addr() == other.addr()
    }

    /// Strong handle to the pointee, or an empty one if it is gone.
    ///
    /// The strong unit comes from the pointee's `upgrade_weak`; the
    /// returned handle adopts it instead of acquiring a second one.
    pub fn lock(&self) -> IntrusivePtr<T> {
        match self.ptr {
            Some(p) if unsafe { T::upgrade_weak(p) } => unsafe {
                IntrusivePtr::from_raw(Some(p), false)
            },
            _ => IntrusivePtr::null(),
        }
    }

    /// [`WeakIntrusivePtr::lock`] as an `Option`.
    pub fn upgrade(&self) -> Option<IntrusivePtr<T>> {
        let strong = self.lock();
        if strong.is_null() {
            None
        } else {
            Some(strong)
        }
    }

    /// [`WeakIntrusivePtr::lock`] as a `Result`.
    pub fn try_lock(&self) -> Result<IntrusivePtr<T>, Expired> {
        self.upgrade().ok_or_else(|| {
            trace!("upgrade refused for {:?}", self);
            Expired
        })
    }

    /// Upgrade to a bare pointer.
    ///
    /// Prefer [`WeakIntrusivePtr::lock`]. This exists for call sites that
    /// manage the strong unit by hand.
    ///
    /// # Safety
    /// On `Some`, the caller owns one strong unit and must return it
    /// exactly once, e.g. through `IntrusivePtr::from_raw(p, false)` or
    /// `RefCounted::release`. Losing it leaks the pointee.
    pub unsafe fn get_locked(&self) -> Option<NonNull<T>> {
        self.lock().into_raw()
    }

    /// Weak handle to the same object viewed as `U`; acquires a weak unit.
    pub fn up_cast<U>(&self) -> WeakIntrusivePtr<U>
    where
        T: Upcast<U>,
        U: RefCounted + ?Sized,
    {
        unsafe { WeakIntrusivePtr::from_raw(self.ptr.map(<T as Upcast<U>>::upcast), true) }
    }

    /// Like [`WeakIntrusivePtr::up_cast`] but transfers this handle's unit.
    pub fn into_up_cast<U>(self) -> WeakIntrusivePtr<U>
    where
        T: Upcast<U>,
        U: RefCounted + ?Sized,
    {
        let ptr = self.into_raw().map(<T as Upcast<U>>::upcast);
        unsafe { WeakIntrusivePtr::from_raw(ptr, false) }
    }

    #[inline]
    fn addr(&self) -> *const () {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const ())
    }
}

impl<T: RefCounted + ?Sized> Drop for WeakIntrusivePtr<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: RefCounted + ?Sized> Clone for WeakIntrusivePtr<T> {
    fn clone(&self) -> Self {
        unsafe { Self::from_raw(self.ptr, true) }
    }

    fn clone_from(&mut self, source: &Self) {
        unsafe { self.reset_to(source.ptr, true) }
    }
}

impl<T: RefCounted + ?Sized> Default for WeakIntrusivePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: RefCounted + ?Sized> From<&IntrusivePtr<T>> for WeakIntrusivePtr<T> {
    fn from(strong: &IntrusivePtr<T>) -> Self {
        strong.downgrade()
    }
}

impl<T, U> PartialEq<WeakIntrusivePtr<U>> for WeakIntrusivePtr<T>
where
    T: RefCounted + ?Sized,
    U: RefCounted + ?Sized,
{
    fn eq(&self, other: &WeakIntrusivePtr<U>) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: RefCounted + ?Sized> Eq for WeakIntrusivePtr<T> {}

impl<T: RefCounted + ?Sized> Hash for WeakIntrusivePtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: RefCounted + ?Sized> fmt::Debug for WeakIntrusivePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(p) => write!(f, "WeakIntrusivePtr({:p})", p),
            None => f.write_str("WeakIntrusivePtr(null)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Expired, WeakIntrusivePtr};
    use crate::intrusive_ptr::IntrusivePtr;
    use crate::rc_box::RcBox;

    #[test]
    fn lock_adopts_the_upgraded_unit() {
        let s = RcBox::new_local(3);
        let w = s.downgrade();
        let l = w.lock();
        assert_eq!(s.strong_count(), 2);
        drop(l);
        assert_eq!(s.strong_count(), 1);
    }

    #[test]
    fn empty_weak_locks_to_empty() {
        let w = WeakIntrusivePtr::<RcBox<i32>>::null();
        assert!(w.lock().is_null());
        assert!(w.upgrade().is_none());
        assert_eq!(w.try_lock().unwrap_err(), Expired);
    }

    #[test]
    fn get_locked_hands_out_one_unit() {
        let s = RcBox::new_local(3);
        let w = s.downgrade();
        let raw = unsafe { w.get_locked() }.expect("alive");
        assert_eq!(s.strong_count(), 2);
        let owned = unsafe { IntrusivePtr::from_raw(Some(raw), false) };
        drop(owned);
        assert_eq!(s.strong_count(), 1);
        drop(s);
        assert!(unsafe { w.get_locked() }.is_none());
    }

    #[test]
    fn self_reset_keeps_weak_unit() {
        let s = RcBox::new_local(0);
        let mut w = s.downgrade();
        let same = w.get();
        unsafe { w.reset_to(same, true) };
        assert_eq!(w.weak_count(), 1);
        assert!(w.lock().is_some());
    }

    #[test]
    fn expired_displays() {
        assert_eq!(Expired.to_string(), "pointee has expired");
    }
}
