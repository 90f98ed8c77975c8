#![cfg(test)]

// Model-based property tests kept inside the crate so they can look at
// raw counters without feature gates.
//
// Model: a pool of strong and weak handle slots over one pointee.
// Invariants after every step:
// - strong_count == number of non-empty strong slots (while alive);
// - weak_count == number of non-empty weak slots;
// - once finalized, no lock() ever succeeds again.

use crate::counts::Counts;
use crate::intrusive_ptr::IntrusivePtr;
use crate::rc_box::RcBox;
use crate::weak_intrusive_ptr::WeakIntrusivePtr;
use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

struct Payload(Rc<Cell<u32>>);
impl Drop for Payload {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

type P = RcBox<Payload, crate::counts::LocalCounts>;

#[derive(Clone, Debug)]
enum Op {
    Clone(usize, usize),
    Take(usize, usize),
    Drop(usize),
    SelfReset(usize),
    DetachAdopt(usize),
    Downgrade(usize, usize),
    CloneWeak(usize, usize),
    DropWeak(usize),
    Lock(usize, usize),
    Swap(usize, usize),
}

const SLOTS: usize = 4;

fn arb_op() -> impl Strategy<Value = Op> {
    let i = 0..SLOTS;
    prop_oneof![
        (i.clone(), i.clone()).prop_map(|(a, b)| Op::Clone(a, b)),
        (i.clone(), i.clone()).prop_map(|(a, b)| Op::Take(a, b)),
        i.clone().prop_map(Op::Drop),
        i.clone().prop_map(Op::SelfReset),
        i.clone().prop_map(Op::DetachAdopt),
        (i.clone(), i.clone()).prop_map(|(a, b)| Op::Downgrade(a, b)),
        (i.clone(), i.clone()).prop_map(|(a, b)| Op::CloneWeak(a, b)),
        i.clone().prop_map(Op::DropWeak),
        (i.clone(), i.clone()).prop_map(|(a, b)| Op::Lock(a, b)),
        (i.clone(), i).prop_map(|(a, b)| Op::Swap(a, b)),
    ]
}

fn raw(w: &WeakIntrusivePtr<P>) -> Option<(usize, usize)> {
    // Storage is alive while any weak handle holds it.
    w.get().map(|p| (w.strong_count(), RcBox::counts(p).weak()))
}

proptest! {
    #[test]
    fn prop_counts_match_live_handles(ops in proptest::collection::vec(arb_op(), 1..120)) {
        let drops = Rc::new(Cell::new(0));
        let mut strong: Vec<IntrusivePtr<P>> = (0..SLOTS).map(|_| IntrusivePtr::null()).collect();
        let mut weak: Vec<WeakIntrusivePtr<P>> = (0..SLOTS).map(|_| WeakIntrusivePtr::null()).collect();
        strong[0] = RcBox::with_counts(Payload(drops.clone()));
        // A probe weak handle outside the slots keeps storage observable.
        let probe = strong[0].downgrade();

        for op in ops {
            match op {
                Op::Clone(a, b) => strong[b] = strong[a].clone(),
                Op::Take(a, b) => {
                    let t = strong[a].take();
                    strong[b] = t;
                }
                Op::Drop(a) => strong[a].reset(),
                Op::SelfReset(a) => {
                    let before = drops.get();
                    let same = strong[a].get();
                    unsafe { strong[a].reset_to(same, true) };
                    prop_assert_eq!(drops.get(), before);
                }
                Op::DetachAdopt(a) => {
                    let p = strong[a].detach();
                    strong[a] = unsafe { IntrusivePtr::from_raw(p, false) };
                }
                Op::Downgrade(a, b) => weak[b] = strong[a].downgrade(),
                Op::CloneWeak(a, b) => weak[b] = weak[a].clone(),
                Op::DropWeak(a) => weak[a].reset(),
                Op::Lock(a, b) => {
                    let finalized = drops.get() == 1;
                    let l = weak[a].lock();
                    if finalized {
                        prop_assert!(l.is_null());
                    }
                    strong[b] = l;
                }
                Op::Swap(a, b) => {
                    if a != b {
                        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                        let (x, y) = strong.split_at_mut(hi);
                        x[lo].swap(&mut y[0]);
                    }
                }
            }

            let live_strong = strong.iter().filter(|s| s.is_some()).count();
            let live_weak = weak.iter().filter(|w| w.is_some()).count() + 1;
            let (s, w) = raw(&probe).expect("probe holds storage");
            prop_assert_eq!(s, live_strong);
            prop_assert_eq!(drops.get(), u32::from(live_strong == 0));
            // The implicit weak unit is held exactly while strong > 0.
            prop_assert_eq!(w, live_weak + usize::from(live_strong > 0));
            prop_assert_eq!(probe.weak_count(), live_weak);
            if live_strong == 0 {
                prop_assert!(probe.lock().is_null());
            }
        }
    }
}
