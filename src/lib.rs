//! intrusive-rc: strong and weak reference-counted pointers whose counts
//! live inside the pointee instead of in a separate control block.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a small ownership core whose every operation (clone, move,
//!   reset, cast, upgrade) keeps the counters exactly in step with the
//!   handles that exist.
//! - Layers:
//!   - RefCounted: the capability a pointee provides. Five primitives
//!     (`add_ref`, `release`, `add_weak_ref`, `release_weak`,
//!     `upgrade_weak`) over raw pointers; handles never see counters.
//!   - IntrusivePtr<T> / WeakIntrusivePtr<T>: nullable handles generic
//!     over any `RefCounted` pointee. Each non-null handle owns exactly
//!     one unit of the matching count and returns it on drop.
//!   - Counts / RcBox<T, C>: a ready-made pointee. `RcBox` puts a
//!     counter pair next to the value in one heap allocation.
//!
//! Constraints
//! - Finalization happens exactly once, when the strong count reaches
//!   zero. Storage lives until the weak count also reaches zero.
//! - A weak handle never resurrects a finalized pointee: `upgrade_weak`
//!   is a single compare-and-increment that refuses zero.
//! - `WeakIntrusivePtr::lock` adopts the unit produced by the upgrade; it
//!   never increments a second time.
//! - Resets install the new pointer before releasing the old one, so
//!   self-assignment cannot finalize.
//! - No internal locking. Distinct handles to one pointee may be used
//!   from different threads when the pointee's counters are atomic
//!   (`AtomicCounts`); `LocalCounts` pointees are `!Sync`.
//!
//! Failure model
//! - Dereferencing an empty `IntrusivePtr` panics; `as_ref` is the
//!   checked accessor.
//! - Upgrading an expired pointee yields an empty handle (`lock`),
//!   `None` (`upgrade`), or `Err(Expired)` (`try_lock`).
//! - Reference-count overflow aborts the process, matching `Rc`/`Arc`.
//!
//! Casts
//! - `up_cast`/`down_cast` borrow the source and acquire a new unit;
//!   `into_up_cast`/`into_down_cast` consume it and transfer its unit.
//! - `RcBox` supports casts through the payload traits `UpcastTo` and
//!   `DowncastTo`, with `dyn Any` conversions provided.
//!
//! Logging
//! - Finalization, reclamation and refused upgrades are reported through
//!   the `log` facade at `trace` level. The crate never installs a logger.

pub mod cast;
pub mod counts;
mod intrusive_ptr;
mod intrusive_ptr_proptest;
mod rc_box;
pub mod ref_counted;
mod weak_intrusive_ptr;

// Public surface
pub use counts::{AtomicCounts, Counts, LocalCounts};
pub use intrusive_ptr::IntrusivePtr;
pub use rc_box::{DowncastTo, RcBox, UpcastTo};
pub use ref_counted::{Downcast, RefCounted, Upcast};
pub use weak_intrusive_ptr::{Expired, WeakIntrusivePtr};
