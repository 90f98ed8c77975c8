//! Counter storage for intrusive pointees.
//!
//! A `Counts` value holds a strong and a weak count side by side. It starts
//! at strong = 1 and raw weak = 1: the extra weak unit is held collectively
//! by all strong references and is returned once the strong count reaches
//! zero, so storage outlives the value for as long as any weak reference
//! may still look at the counters.

use core::cell::Cell;
use core::marker::PhantomData;
use core::sync::atomic::{self, AtomicUsize, Ordering};

/// Counts above this abort the process, matching `Arc`.
const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Strong/weak counter pair embedded in a pointee.
///
/// `RcBox` finalizes and frees its allocation purely on what these methods
/// report, so implementing the trait is `unsafe`:
///
/// ```compile_fail,E0200
/// use intrusive_rc::{AtomicCounts, Counts};
///
/// struct Wrapped(AtomicCounts);
///
/// impl Counts for Wrapped {
///     fn new() -> Self { Wrapped(AtomicCounts::new()) }
///     fn inc_strong(&self) { self.0.inc_strong() }
///     fn dec_strong(&self) -> bool { self.0.dec_strong() }
///     fn try_inc_strong(&self) -> bool { self.0.inc_strong(); true }
///     fn inc_weak(&self) { self.0.inc_weak() }
///     fn dec_weak(&self) -> bool { self.0.dec_weak() }
///     fn strong(&self) -> usize { self.0.strong() }
///     fn weak(&self) -> usize { self.0.weak() }
/// }
/// ```
///
/// # Safety
/// - `new` starts at strong = 1 and raw weak = 1.
/// - `dec_strong` and `dec_weak` return true exactly once, on the call
///   that takes the count to zero, and never decrement past zero.
/// - `try_inc_strong` never increments a zero strong count, and the
///   check and the increment are one indivisible step with respect to
///   every other method.
/// - `strong` and `weak` report the current counts.
/// - The type is `Sync` only if all of the above hold under concurrent
///   calls from several threads.
pub unsafe trait Counts {
    /// Fresh counters: one strong unit, plus the implicit weak unit.
    fn new() -> Self;

    /// Acquire one strong unit. The strong count must already be non-zero.
    fn inc_strong(&self);

    /// Return one strong unit. Returns true if the strong count is now zero.
    fn dec_strong(&self) -> bool;

    /// Acquire one strong unit only if the strong count is non-zero.
    fn try_inc_strong(&self) -> bool;

    /// Acquire one weak unit.
    fn inc_weak(&self);

    /// Return one weak unit. Returns true if the raw weak count is now zero.
    fn dec_weak(&self) -> bool;

    /// Current strong count.
    fn strong(&self) -> usize;

    /// Current raw weak count, including the implicit unit.
    fn weak(&self) -> usize;
}

/// Thread-safe counters.
#[derive(Debug)]
pub struct AtomicCounts {
    strong: AtomicUsize,
    weak: AtomicUsize,
}

unsafe impl Counts for AtomicCounts {
    fn new() -> Self {
        Self {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
        }
    }

    #[inline]
    fn inc_strong(&self) {
        // New references can only be made from existing ones, so no
        // ordering is needed on the increment.
        let old = self.strong.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    #[inline]
    fn dec_strong(&self) -> bool {
        if self.strong.fetch_sub(1, Ordering::Release) != 1 {
            return false;
        }
        // Synchronize with every prior release before the value is dropped.
        atomic::fence(Ordering::Acquire);
        true
    }

    #[inline]
    fn try_inc_strong(&self) -> bool {
        let mut n = self.strong.load(Ordering::Relaxed);
        loop {
            if n == 0 {
                return false;
            }
            if n > MAX_REFCOUNT {
                std::process::abort();
            }
            match self
                .strong
                .compare_exchange_weak(n, n + 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(old) => n = old,
            }
        }
    }

    #[inline]
    fn inc_weak(&self) {
        let old = self.weak.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    #[inline]
    fn dec_weak(&self) -> bool {
        if self.weak.fetch_sub(1, Ordering::Release) != 1 {
            return false;
        }
        atomic::fence(Ordering::Acquire);
        true
    }

    #[inline]
    fn strong(&self) -> usize {
        self.strong.load(Ordering::Acquire)
    }

    #[inline]
    fn weak(&self) -> usize {
        self.weak.load(Ordering::Acquire)
    }
}

/// Single-threaded counters. `!Send + !Sync`.
#[derive(Debug)]
pub struct LocalCounts {
    strong: Cell<usize>,
    weak: Cell<usize>,
    _nosend: PhantomData<*mut ()>,
}

impl LocalCounts {
    #[inline]
    fn bump(c: &Cell<usize>) {
        let n = c.get().wrapping_add(1);
        c.set(n);
        if n == 0 || n > MAX_REFCOUNT {
            // Follow Rc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
    }
}

// `!Sync`, so every call is on one thread.
unsafe impl Counts for LocalCounts {
    fn new() -> Self {
        Self {
            strong: Cell::new(1),
            weak: Cell::new(1),
            _nosend: PhantomData,
        }
    }

    #[inline]
    fn inc_strong(&self) {
        debug_assert!(self.strong.get() > 0, "inc_strong on a finalized pointee");
        Self::bump(&self.strong);
    }

    #[inline]
    fn dec_strong(&self) -> bool {
        let c = self.strong.get();
        assert!(c > 0, "LocalCounts strong underflow");
        self.strong.set(c - 1);
        c == 1
    }

    #[inline]
    fn try_inc_strong(&self) -> bool {
        if self.strong.get() == 0 {
            return false;
        }
        Self::bump(&self.strong);
        true
    }

    #[inline]
    fn inc_weak(&self) {
        Self::bump(&self.weak);
    }

    #[inline]
    fn dec_weak(&self) -> bool {
        let c = self.weak.get();
        assert!(c > 0, "LocalCounts weak underflow");
        self.weak.set(c - 1);
        c == 1
    }

    #[inline]
    fn strong(&self) -> usize {
        self.strong.get()
    }

    #[inline]
    fn weak(&self) -> usize {
        self.weak.get()
    }
}
