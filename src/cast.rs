//! Free-function casts and helpers, named after their `std::shared_ptr`
//! counterparts.

use crate::intrusive_ptr::IntrusivePtr;
use crate::ref_counted::{Downcast, RefCounted, Upcast};
use core::ptr::NonNull;

/// Same as [`IntrusivePtr::up_cast`].
pub fn static_pointer_cast<U, T>(p: &IntrusivePtr<T>) -> IntrusivePtr<U>
where
    T: Upcast<U> + ?Sized,
    U: RefCounted + ?Sized,
{
    p.up_cast()
}

/// Same as [`IntrusivePtr::down_cast`].
pub fn dynamic_pointer_cast<U, T>(p: &IntrusivePtr<T>) -> IntrusivePtr<U>
where
    T: Downcast<U> + ?Sized,
    U: RefCounted + ?Sized,
{
    p.down_cast()
}

/// Pointees are only ever shared immutably, so there is no qualifier to
/// strip: the handle is passed through with its unit, unchecked.
pub fn const_pointer_cast<T: RefCounted + ?Sized>(p: IntrusivePtr<T>) -> IntrusivePtr<T> {
    p
}

pub fn swap<T: RefCounted + ?Sized>(a: &mut IntrusivePtr<T>, b: &mut IntrusivePtr<T>) {
    a.swap(b);
}

pub fn get_pointer<T: RefCounted + ?Sized>(p: &IntrusivePtr<T>) -> Option<NonNull<T>> {
    p.get()
}
