// Shared fixtures for the integration tests.
//
// `Tracked` is a hand-written intrusive pointee: it embeds its own
// counters and records finalization and reclamation in a shared `Probe`,
// so tests can observe exactly when each happens.
#![allow(dead_code)]

use intrusive_rc::{AtomicCounts, Counts, DowncastTo, IntrusivePtr, RefCounted, UpcastTo};
use std::any::Any;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default, Debug)]
pub struct Probe {
    finalized: AtomicUsize,
    reclaimed: AtomicUsize,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
    pub fn finalized(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }
    pub fn reclaimed(&self) -> usize {
        self.reclaimed.load(Ordering::SeqCst)
    }
}

pub struct Tracked {
    counts: AtomicCounts,
    label: ManuallyDrop<String>,
    probe: Arc<Probe>,
}

impl Tracked {
    pub fn create(label: &str, probe: &Arc<Probe>) -> IntrusivePtr<Tracked> {
        let raw = Box::into_raw(Box::new(Tracked {
            counts: AtomicCounts::new(),
            label: ManuallyDrop::new(label.to_string()),
            probe: Arc::clone(probe),
        }));
        unsafe { IntrusivePtr::from_raw(NonNull::new(raw), false) }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Strong count read through a raw pointer; valid while storage lives.
    pub fn strong_of(p: NonNull<Self>) -> usize {
        unsafe { (*p.as_ptr()).counts.strong() }
    }

    /// Weak handles only, without the unit held on behalf of strong ones.
    pub fn weak_of(p: NonNull<Self>) -> usize {
        let counts = unsafe { &(*p.as_ptr()).counts };
        let strong = counts.strong();
        counts.weak() - usize::from(strong > 0)
    }
}

unsafe impl RefCounted for Tracked {
    unsafe fn add_ref(this: NonNull<Self>) {
        unsafe { (*this.as_ptr()).counts.inc_strong() }
    }

    unsafe fn release(this: NonNull<Self>) {
        unsafe {
            if (*this.as_ptr()).counts.dec_strong() {
                ManuallyDrop::drop(&mut (*this.as_ptr()).label);
                (&(*this.as_ptr()).probe).finalized.fetch_add(1, Ordering::SeqCst);
                Self::release_weak(this);
            }
        }
    }

    unsafe fn add_weak_ref(this: NonNull<Self>) {
        unsafe { (*this.as_ptr()).counts.inc_weak() }
    }

    unsafe fn release_weak(this: NonNull<Self>) {
        unsafe {
            if (*this.as_ptr()).counts.dec_weak() {
                (&(*this.as_ptr()).probe).reclaimed.fetch_add(1, Ordering::SeqCst);
                drop(Box::from_raw(this.as_ptr()));
            }
        }
    }

    unsafe fn upgrade_weak(this: NonNull<Self>) -> bool {
        unsafe { (*this.as_ptr()).counts.try_inc_strong() }
    }
}

// A small shape hierarchy for cast tests, stored in `RcBox`.

pub trait Shape: Any + Send + Sync {
    fn area(&self) -> f64;
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, PartialEq)]
pub struct Circle(pub f64);

#[derive(Debug, PartialEq)]
pub struct Square(pub f64);

impl Shape for Circle {
    fn area(&self) -> f64 {
        3.0 * self.0 * self.0
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Shape for Square {
    fn area(&self) -> f64 {
        self.0 * self.0
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

unsafe impl UpcastTo<dyn Shape> for Circle {
    fn upcast_ptr(this: NonNull<Self>) -> NonNull<dyn Shape> {
        this
    }
}

unsafe impl UpcastTo<dyn Shape> for Square {
    fn upcast_ptr(this: NonNull<Self>) -> NonNull<dyn Shape> {
        this
    }
}

unsafe impl DowncastTo<Circle> for dyn Shape {
    fn downcast_ptr(this: &Self) -> Option<NonNull<Circle>> {
        this.as_any().downcast_ref::<Circle>().map(NonNull::from)
    }
}

unsafe impl DowncastTo<Square> for dyn Shape {
    fn downcast_ptr(this: &Self) -> Option<NonNull<Square>> {
        this.as_any().downcast_ref::<Square>().map(NonNull::from)
    }
}
