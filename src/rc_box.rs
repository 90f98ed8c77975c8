//! RcBox: a heap-allocated pointee carrying its own counters.

use crate::counts::{AtomicCounts, Counts, LocalCounts};
use crate::intrusive_ptr::IntrusivePtr;
use crate::ref_counted::{Downcast, RefCounted, Upcast};
use crate::weak_intrusive_ptr::WeakIntrusivePtr;
use core::alloc::Layout;
use core::any::Any;
use core::ops::Deref;
use core::ptr::{self, NonNull};
use log::trace;

/// Counters and value in one allocation.
///
/// An `RcBox` is only ever reached through `IntrusivePtr` and
/// `WeakIntrusivePtr`. The value is dropped in place when the last strong
/// handle goes away; the allocation is freed when the last weak handle
/// goes away.
#[repr(C)]
pub struct RcBox<T: ?Sized, C: Counts = AtomicCounts> {
    counts: C,
    // Recorded at allocation so reclamation never has to touch `value`.
    layout: Layout,
    value: T,
}

impl<T> RcBox<T> {
    /// Allocate a thread-safe pointee and return its first strong handle.
    pub fn new(value: T) -> IntrusivePtr<Self> {
        Self::with_counts(value)
    }
}

impl<T> RcBox<T, LocalCounts> {
    /// Allocate a single-threaded pointee and return its first strong handle.
    pub fn new_local(value: T) -> IntrusivePtr<Self> {
        Self::with_counts(value)
    }
}

impl<T, C: Counts> RcBox<T, C> {
    pub fn with_counts(value: T) -> IntrusivePtr<Self> {
        let raw = Box::into_raw(Box::new(RcBox {
            counts: C::new(),
            layout: Layout::new::<Self>(),
            value,
        }));
        // Counters start at strong = 1; the handle adopts that unit.
        unsafe { IntrusivePtr::from_raw(Some(NonNull::new_unchecked(raw)), false) }
    }
}

impl<T: ?Sized, C: Counts> RcBox<T, C> {
    #[inline]
    pub(crate) fn counts<'a>(this: NonNull<Self>) -> &'a C {
        // Counters stay allocated until the raw weak count reaches zero.
        unsafe { &*ptr::addr_of!((*this.as_ptr()).counts) }
    }

    /// Number of strong handles currently referring to this pointee.
    pub fn strong_count(&self) -> usize {
        self.counts.strong()
    }

    /// True when exactly one strong handle refers to this pointee.
    pub fn is_unique(&self) -> bool {
        self.counts.strong() == 1
    }

    /// Number of weak handles currently referring to this pointee.
    pub fn weak_count(&self) -> usize {
        // A live `&self` implies strong > 0, so the implicit unit is held.
        self.counts.weak() - 1
    }

    /// Raw counters, including the implicit weak unit.
    #[cfg(feature = "bench_internal")]
    pub fn raw_counts(&self) -> &C {
        &self.counts
    }
}

impl<T: ?Sized, C: Counts> Deref for RcBox<T, C> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

unsafe impl<T: ?Sized, C: Counts> RefCounted for RcBox<T, C> {
    #[inline]
    unsafe fn add_ref(this: NonNull<Self>) {
        Self::counts(this).inc_strong();
    }

    unsafe fn release(this: NonNull<Self>) {
        if !Self::counts(this).dec_strong() {
            return;
        }
        trace!("finalizing pointee at {:p}", this);
        unsafe {
            ptr::drop_in_place(ptr::addr_of_mut!((*this.as_ptr()).value));
            // Hand back the weak unit held on behalf of all strong handles.
            Self::release_weak(this);
        }
    }

    #[inline]
    unsafe fn add_weak_ref(this: NonNull<Self>) {
        Self::counts(this).inc_weak();
    }

    unsafe fn release_weak(this: NonNull<Self>) {
        if !Self::counts(this).dec_weak() {
            return;
        }
        trace!("reclaiming storage at {:p}", this);
        unsafe {
            let layout = ptr::addr_of!((*this.as_ptr()).layout).read();
            // `C` may own resources of its own; `value` is already gone.
            ptr::drop_in_place(ptr::addr_of_mut!((*this.as_ptr()).counts));
            std::alloc::dealloc(this.as_ptr().cast::<u8>(), layout);
        }
    }

    #[inline]
    unsafe fn upgrade_weak(this: NonNull<Self>) -> bool {
        Self::counts(this).try_inc_strong()
    }
}

impl<T: ?Sized, C: Counts> WeakIntrusivePtr<RcBox<T, C>> {
    /// Strong count of the observed pointee, 0 if empty or finalized.
    pub fn strong_count(&self) -> usize {
        match self.get() {
            Some(p) => RcBox::counts(p).strong(),
            None => 0,
        }
    }

    /// Number of weak handles referring to the observed pointee, 0 if empty.
    pub fn weak_count(&self) -> usize {
        let Some(p) = self.get() else {
            return 0;
        };
        let counts = RcBox::counts(p);
        let weak = counts.weak();
        if counts.strong() > 0 {
            weak - 1
        } else {
            weak
        }
    }
}

/// Payload-level upcast: view `Self` as the related type `U`.
///
/// Implement this for your value type to obtain
/// `RcBox<Self, C>: Upcast<RcBox<U, C>>`. A plain unsizing coercion is
/// the usual body:
///
/// ```
/// use core::ptr::NonNull;
/// use intrusive_rc::{RcBox, UpcastTo};
///
/// trait Shape { fn area(&self) -> f64; }
/// struct Square(f64);
/// impl Shape for Square { fn area(&self) -> f64 { self.0 * self.0 } }
///
/// unsafe impl UpcastTo<dyn Shape> for Square {
///     fn upcast_ptr(this: NonNull<Self>) -> NonNull<dyn Shape> { this }
/// }
///
/// let sq = RcBox::new(Square(2.0));
/// let shape = sq.up_cast::<RcBox<dyn Shape>>();
/// assert_eq!(shape.area(), 4.0);
/// assert!(shape == sq);
/// ```
///
/// # Safety
///
/// `upcast_ptr` must return the same address without dereferencing it.
pub unsafe trait UpcastTo<U: ?Sized> {
    fn upcast_ptr(this: NonNull<Self>) -> NonNull<U>;
}

/// Payload-level checked downcast.
///
/// # Safety
///
/// On `Some`, the returned pointer must be the address of `this` and the
/// referenced value must really be a `U`.
pub unsafe trait DowncastTo<U: ?Sized> {
    fn downcast_ptr(this: &Self) -> Option<NonNull<U>>;
}

unsafe impl<T: Any> UpcastTo<dyn Any> for T {
    fn upcast_ptr(this: NonNull<Self>) -> NonNull<dyn Any> {
        this
    }
}

unsafe impl<T: Any + Send> UpcastTo<dyn Any + Send> for T {
    fn upcast_ptr(this: NonNull<Self>) -> NonNull<dyn Any + Send> {
        this
    }
}

unsafe impl<T: Any + Send + Sync> UpcastTo<dyn Any + Send + Sync> for T {
    fn upcast_ptr(this: NonNull<Self>) -> NonNull<dyn Any + Send + Sync> {
        this
    }
}

unsafe impl<U: Any> DowncastTo<U> for dyn Any {
    fn downcast_ptr(this: &Self) -> Option<NonNull<U>> {
        this.downcast_ref::<U>().map(NonNull::from)
    }
}

unsafe impl<U: Any> DowncastTo<U> for dyn Any + Send {
    fn downcast_ptr(this: &Self) -> Option<NonNull<U>> {
        this.downcast_ref::<U>().map(NonNull::from)
    }
}

unsafe impl<U: Any> DowncastTo<U> for dyn Any + Send + Sync {
    fn downcast_ptr(this: &Self) -> Option<NonNull<U>> {
        this.downcast_ref::<U>().map(NonNull::from)
    }
}

/// Re-point `this` at the same allocation viewed with `value`'s type.
///
/// `value` must be the address of `this`'s value field; only its metadata
/// is new.
unsafe fn rebase<T: ?Sized, U: ?Sized, C: Counts>(
    this: NonNull<RcBox<T, C>>,
    value: NonNull<U>,
) -> NonNull<RcBox<U, C>> {
    unsafe {
        let base = this.as_ptr().cast::<u8>();
        let field = ptr::addr_of_mut!((*this.as_ptr()).value).cast::<u8>();
        let offset = field.offset_from(base) as usize;
        debug_assert_eq!(value.as_ptr().cast::<u8>(), field);
        // `byte_sub` keeps `U`'s metadata and only moves the address.
        NonNull::new_unchecked(value.as_ptr().byte_sub(offset) as *mut RcBox<U, C>)
    }
}

unsafe impl<T, U, C> Upcast<RcBox<U, C>> for RcBox<T, C>
where
    T: ?Sized + UpcastTo<U>,
    U: ?Sized,
    C: Counts,
{
    fn upcast(this: NonNull<Self>) -> NonNull<RcBox<U, C>> {
        unsafe {
            let field = NonNull::new_unchecked(ptr::addr_of_mut!((*this.as_ptr()).value));
            rebase(this, T::upcast_ptr(field))
        }
    }
}

unsafe impl<T, U, C> Downcast<RcBox<U, C>> for RcBox<T, C>
where
    T: ?Sized + DowncastTo<U>,
    U: ?Sized,
    C: Counts,
{
    unsafe fn downcast(this: NonNull<Self>) -> Option<NonNull<RcBox<U, C>>> {
        unsafe {
            let target = T::downcast_ptr(&(*this.as_ptr()).value)?;
            Some(rebase(this, target))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RcBox;
    use std::cell::Cell;
    use std::rc::Rc;

    struct DropFlag(Rc<Cell<u32>>);
    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn value_dropped_once_at_last_strong() {
        let drops = Rc::new(Cell::new(0));
        let a = RcBox::new_local(DropFlag(drops.clone()));
        let b = a.clone();
        assert_eq!(a.strong_count(), 2);
        drop(a);
        assert_eq!(drops.get(), 0);
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn weak_keeps_counters_readable_after_finalize() {
        let drops = Rc::new(Cell::new(0));
        let s = RcBox::new_local(DropFlag(drops.clone()));
        let w = s.downgrade();
        assert_eq!(w.weak_count(), 1);
        assert_eq!(s.weak_count(), 1);
        drop(s);
        assert_eq!(drops.get(), 1);
        assert_eq!(w.strong_count(), 0);
        assert_eq!(w.weak_count(), 1);
        assert!(w.lock().is_null());
    }

    #[test]
    fn is_unique_tracks_strong_handles() {
        let a = RcBox::new_local(1u8);
        assert!(a.is_unique());
        let w = a.downgrade();
        assert!(a.is_unique(), "weak handles do not count");
        let b = w.lock();
        assert!(!a.is_unique());
        drop(b);
        assert!(a.is_unique());
    }

    #[test]
    fn empty_weak_reports_zero_counts() {
        let w = crate::WeakIntrusivePtr::<RcBox<u8>>::null();
        assert_eq!(w.strong_count(), 0);
        assert_eq!(w.weak_count(), 0);
    }

    #[test]
    fn unsized_value_through_any() {
        let s = RcBox::new(7u32);
        let any = s.up_cast::<RcBox<dyn core::any::Any + Send + Sync>>();
        assert_eq!(s.strong_count(), 2);
        let back = any.down_cast::<RcBox<u32>>();
        assert_eq!(**back, 7);
        assert!(any.down_cast::<RcBox<u64>>().is_null());
        assert_eq!(s.strong_count(), 3);
    }
}
