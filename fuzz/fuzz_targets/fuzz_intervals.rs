//! Fuzz target for interval set merging.
//!
//! Merged unions must come out sorted and disjoint, and an intersection
//! must lie inside every input.

#![no_main]

use arbitrary::Arbitrary;
use bp_math::IntervalSet;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    pairs: Vec<(f64, f64)>,
}

fuzz_target!(|input: Input| {
    let pairs: Vec<(f64, f64)> = input
        .pairs
        .into_iter()
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .collect();
    let set = IntervalSet::from_pairs(&pairs);

    let union = set.union_merge();
    for pair in union.intervals().windows(2) {
        assert!(pair[0].right < pair[1].left);
    }

    let common = set.intersection_merge();
    for c in common.intervals() {
        for i in set.intervals() {
            assert!(i.left <= c.left && c.right <= i.right);
        }
    }
});
