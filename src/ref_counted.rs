//! The capability a pointee provides so handles can count references to it.

use core::ptr::NonNull;

/// A type that stores its own strong and weak reference counts.
///
/// Handles never look at the counters directly; they only call these five
/// primitives. Every primitive takes a raw pointer because the weak ones
/// may run after the object has been finalized, when no reference to
/// `Self` may exist anymore.
///
/// # Safety
///
/// Implementors must uphold the following for every `this` obtained from
/// a live allocation of `Self`:
/// - `add_ref` and `release` adjust the strong count by exactly one.
///   `release` finalizes the object exactly once, when the count reaches
///   zero, and the object stays dereferenceable while the count is
///   non-zero.
/// - `add_weak_ref` and `release_weak` adjust the weak count by exactly
///   one. The counters stay readable until no strong or weak units remain.
/// - `upgrade_weak` increments the strong count if and only if it is
///   non-zero, as one atomic step with respect to concurrent `release`
///   calls, and reports whether it did.
/// - If the type is shared across threads (`Sync`), all five are
///   thread-safe.
pub unsafe trait RefCounted {
    /// Acquire one strong unit.
    ///
    /// # Safety
    /// `this` must be alive with a non-zero strong count.
    unsafe fn add_ref(this: NonNull<Self>);

    /// Return one strong unit, finalizing the object if it was the last.
    ///
    /// # Safety
    /// The caller must own the strong unit being returned.
    unsafe fn release(this: NonNull<Self>);

    /// Acquire one weak unit.
    ///
    /// # Safety
    /// The caller must own a strong or weak unit on `this`.
    unsafe fn add_weak_ref(this: NonNull<Self>);

    /// Return one weak unit, reclaiming storage if nothing else refers to it.
    ///
    /// # Safety
    /// The caller must own the weak unit being returned.
    unsafe fn release_weak(this: NonNull<Self>);

    /// Try to acquire a strong unit from a possibly finalized object.
    ///
    /// # Safety
    /// The caller must own a weak unit on `this`.
    unsafe fn upgrade_weak(this: NonNull<Self>) -> bool;
}

/// Static conversion to a related pointee type that shares the counters.
///
/// # Safety
///
/// `upcast` must return a pointer to the same object, whose `RefCounted`
/// primitives operate on the same counters as `Self`'s. It must not
/// dereference `this`, since it is also applied to weak pointers whose
/// object may already be finalized.
pub unsafe trait Upcast<U: RefCounted + ?Sized>: RefCounted {
    fn upcast(this: NonNull<Self>) -> NonNull<U>;
}

/// Checked conversion to a related pointee type that shares the counters.
///
/// # Safety
///
/// On `Some`, the returned pointer must refer to the same object viewed
/// as `U`, with `U`'s primitives operating on the same counters.
pub unsafe trait Downcast<U: RefCounted + ?Sized>: RefCounted {
    /// # Safety
    /// `this` must be alive with a non-zero strong count.
    unsafe fn downcast(this: NonNull<Self>) -> Option<NonNull<U>>;
}
