//! IntrusivePtr: nullable strong handle over a `RefCounted` pointee.

use crate::ref_counted::{Downcast, RefCounted, Upcast};
use crate::weak_intrusive_ptr::WeakIntrusivePtr;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ops::Deref;
use core::ptr::{self, NonNull};

/// Owning handle. Each non-null `IntrusivePtr` holds exactly one strong
/// unit on its pointee and returns it on drop.
///
/// The handle derefs to its pointee, but its own methods (`get`, `take`,
/// `detach`, `reset`, `swap`, `as_ref`, `is_null`, `is_some`) come first
/// in method lookup. Reach a pointee method of the same name through an
/// explicit deref:
///
/// ```
/// use intrusive_rc::RcBox;
///
/// let p = RcBox::new(vec![10, 20]);
/// assert!(p.get().is_some());
/// assert_eq!((**p).get(1), Some(&20));
/// ```
pub struct IntrusivePtr<T: RefCounted + ?Sized> {
    ptr: Option<NonNull<T>>,
    _owns: PhantomData<T>,
}

unsafe impl<T: RefCounted + ?Sized + Send + Sync> Send for IntrusivePtr<T> {}
unsafe impl<T: RefCounted + ?Sized + Send + Sync> Sync for IntrusivePtr<T> {}

impl<T: RefCounted + ?Sized> IntrusivePtr<T> {
    /// The empty handle.
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _owns: PhantomData,
        }
    }

    /// Wrap a raw pointee address.
    ///
    /// With `add_ref`, a new strong unit is acquired. Without it, the
    /// handle adopts a unit the caller already owns (for instance one
    /// returned by `detach` or `WeakIntrusivePtr::get_locked`).
    ///
    /// # Safety
    /// A non-null `ptr` must point to a live pointee. With `add_ref ==
    /// false` the caller must own one strong unit and hands it over.
    pub unsafe fn from_raw(ptr: Option<NonNull<T>>, add_ref: bool) -> Self {
        if let (Some(p), true) = (ptr, add_ref) {
            unsafe { T::add_ref(p) };
        }
        Self {
            ptr,
            _owns: PhantomData,
        }
    }

    /// Move the held unit out, leaving this handle empty. No count changes.
    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
            _owns: PhantomData,
        }
    }

    /// Clear the handle without releasing; the caller now owns the unit.
    pub fn detach(&mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    /// Consume the handle without releasing; the caller now owns the unit.
    pub fn into_raw(self) -> Option<NonNull<T>> {
        ManuallyDrop::new(self).ptr
    }

    /// Release the held unit, if any, and become empty.
    pub fn reset(&mut self) {
        if let Some(old) = self.ptr.take() {
            unsafe { T::release(old) };
        }
    }

    /// Point at `ptr` instead, releasing the old unit only after the new
    /// one is installed. Resetting to the held address with `add_ref`
    /// therefore never finalizes the pointee.
    ///
    /// # Safety
    /// Same contract as [`IntrusivePtr::from_raw`].
    pub unsafe fn reset_to(&mut self, ptr: Option<NonNull<T>>, add_ref: bool) {
        let new = unsafe { Self::from_raw(ptr, add_ref) };
        drop(mem::replace(self, new));
    }

    #[inline]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    /// Borrow the pointee, or `None` when empty.
    #[inline]
    pub fn as_ref(&self) -> Option<&T> {
        // A held strong unit keeps the pointee alive for the borrow.
        self.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        self.ptr.is_some()
    }

    /// Exchange pointees with `other`. No count changes.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
    }

    /// Identity comparison, across pointee types.
    pub fn ptr_eq<U: RefCounted + ?Sized>(&self, other: &IntrusivePtr<U>) -> bool {
        self.addr() == other.addr()
    }

    /// A weak handle to the same pointee (empty if this one is empty).
    pub fn downgrade(&self) -> WeakIntrusivePtr<T> {
        unsafe { WeakIntrusivePtr::from_raw(self.ptr, true) }
    }

    /// New handle to the same object viewed as `U`; acquires a unit.
    pub fn up_cast<U>(&self) -> IntrusivePtr<U>
    where
        T: Upcast<U>,
        U: RefCounted + ?Sized,
    {
        unsafe { IntrusivePtr::from_raw(self.ptr.map(<T as Upcast<U>>::upcast), true) }
    }

    /// Like [`IntrusivePtr::up_cast`] but transfers this handle's unit.
    pub fn into_up_cast<U>(self) -> IntrusivePtr<U>
    where
        T: Upcast<U>,
        U: RefCounted + ?Sized,
    {
        let ptr = self.into_raw().map(<T as Upcast<U>>::upcast);
        unsafe { IntrusivePtr::from_raw(ptr, false) }
    }

    /// New handle to the same object as `U` if it really is one;
    /// acquires a unit on success, empty otherwise.
    pub fn down_cast<U>(&self) -> IntrusivePtr<U>
    where
        T: Downcast<U>,
        U: RefCounted + ?Sized,
    {
        let Some(p) = self.ptr else {
            return IntrusivePtr::null();
        };
        match unsafe { <T as Downcast<U>>::downcast(p) } {
            Some(target) => unsafe { IntrusivePtr::from_raw(Some(target), true) },
            None => IntrusivePtr::null(),
        }
    }

    /// Like [`IntrusivePtr::down_cast`] but transfers this handle's unit.
    /// Hands the original back when the check fails.
    pub fn into_down_cast<U>(self) -> Result<IntrusivePtr<U>, Self>
    where
        T: Downcast<U>,
        U: RefCounted + ?Sized,
    {
        let Some(p) = self.ptr else {
            return Ok(IntrusivePtr::null());
        };
        match unsafe { <T as Downcast<U>>::downcast(p) } {
            Some(target) => {
                mem::forget(self);
                Ok(unsafe { IntrusivePtr::from_raw(Some(target), false) })
            }
            None => Err(self),
        }
    }

    #[inline]
    fn addr(&self) -> *const () {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const ())
    }
}

impl<T: RefCounted + ?Sized> Drop for IntrusivePtr<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: RefCounted + ?Sized> Clone for IntrusivePtr<T> {
    fn clone(&self) -> Self {
        unsafe { Self::from_raw(self.ptr, true) }
    }

    fn clone_from(&mut self, source: &Self) {
        unsafe { self.reset_to(source.ptr, true) }
    }
}

impl<T: RefCounted + ?Sized> Default for IntrusivePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: RefCounted + ?Sized> Deref for IntrusivePtr<T> {
    type Target = T;

    /// Panics on an empty handle; use [`IntrusivePtr::as_ref`] to check.
    fn deref(&self) -> &T {
        match self.as_ref() {
            Some(v) => v,
            None => panic!("dereferenced an empty IntrusivePtr"),
        }
    }
}

impl<T, U> PartialEq<IntrusivePtr<U>> for IntrusivePtr<T>
where
    T: RefCounted + ?Sized,
    U: RefCounted + ?Sized,
{
    fn eq(&self, other: &IntrusivePtr<U>) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: RefCounted + ?Sized> Eq for IntrusivePtr<T> {}

impl<T: RefCounted + ?Sized> PartialEq<NonNull<T>> for IntrusivePtr<T> {
    fn eq(&self, other: &NonNull<T>) -> bool {
        self.addr() == other.as_ptr() as *const ()
    }
}

/// `None` is the null sentinel.
impl<T: RefCounted + ?Sized> PartialEq<Option<NonNull<T>>> for IntrusivePtr<T> {
    fn eq(&self, other: &Option<NonNull<T>>) -> bool {
        self.addr() == other.map_or(ptr::null(), |p| p.as_ptr() as *const ())
    }
}

impl<T, U> PartialOrd<IntrusivePtr<U>> for IntrusivePtr<T>
where
    T: RefCounted + ?Sized,
    U: RefCounted + ?Sized,
{
    fn partial_cmp(&self, other: &IntrusivePtr<U>) -> Option<Ordering> {
        Some(self.addr().cmp(&other.addr()))
    }
}

impl<T: RefCounted + ?Sized> Ord for IntrusivePtr<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: RefCounted + ?Sized> Hash for IntrusivePtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: RefCounted + ?Sized> fmt::Debug for IntrusivePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(p) => write!(f, "IntrusivePtr({:p})", p),
            None => f.write_str("IntrusivePtr(null)"),
        }
    }
}

impl<T: RefCounted + ?Sized> fmt::Pointer for IntrusivePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::IntrusivePtr;
    use crate::rc_box::RcBox;

    #[test]
    fn clone_and_drop_track_strong_count() {
        let a = RcBox::new_local(5);
        assert_eq!(a.strong_count(), 1);
        let b = a.clone();
        assert_eq!(a.strong_count(), 2);
        assert!(a == b);
        drop(b);
        assert_eq!(a.strong_count(), 1);
    }

    #[test]
    fn take_is_count_neutral() {
        let mut a = RcBox::new_local(5);
        let keep = a.clone();
        let b = a.take();
        assert!(a.is_null());
        assert_eq!(keep.strong_count(), 2);
        assert!(b == keep);
    }

    #[test]
    fn detach_then_adopt_round_trip() {
        let mut a = RcBox::new_local(String::from("x"));
        let keep = a.clone();
        let raw = a.detach();
        assert!(a.is_null());
        assert_eq!(keep.strong_count(), 2);
        let back = unsafe { IntrusivePtr::from_raw(raw, false) };
        assert_eq!(keep.strong_count(), 2);
        assert_eq!(back.as_str(), "x");
    }

    #[test]
    fn self_reset_keeps_unique_pointee_alive() {
        let mut a = RcBox::new_local(vec![1, 2, 3]);
        let w = a.downgrade();
        let same = a.get();
        unsafe { a.reset_to(same, true) };
        assert_eq!(a.strong_count(), 1);
        assert_eq!(w.strong_count(), 1);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn clone_from_self_alias() {
        let mut a = RcBox::new_local(1u8);
        let alias = a.clone();
        drop(alias);
        let src = a.clone();
        a.clone_from(&src);
        assert_eq!(a.strong_count(), 2);
    }

    #[test]
    fn empty_deref_panics() {
        let p = IntrusivePtr::<RcBox<u32>>::null();
        assert!(p.as_ref().is_none());
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _v: u32 = **p;
        }));
        assert!(res.is_err(), "expected deref of empty handle to panic");
    }

    #[test]
    fn shadowed_pointee_methods_via_explicit_deref() {
        let mut p = RcBox::new_local(vec![1, 2, 3]);
        assert_eq!((**p).get(0), Some(&1));
        assert_eq!(p.first(), Some(&1));
        let q = p.take();
        assert!(p.is_null());
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn debug_formatting() {
        let p = IntrusivePtr::<RcBox<u32>>::null();
        assert_eq!(format!("{:?}", p), "IntrusivePtr(null)");
        let q = RcBox::new(1u32);
        assert!(format!("{:?}", q).starts_with("IntrusivePtr(0x"));
    }
}
