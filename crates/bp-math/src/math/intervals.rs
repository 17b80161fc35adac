//! Closed-interval set algebra.
//!
//! Interval sets describe both the effective support of a density and the
//! domain handed to the integrator. After [`IntervalSet::union_merge`] the
//! intervals are sorted ascending and pairwise disjoint.

use serde::{Deserialize, Serialize};

/// Closed interval `[left, right]` with `left <= right`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub left: f64,
    pub right: f64,
}

impl Interval {
    /// Builds an interval, swapping the endpoints if they arrive reversed.
    pub fn new(left: f64, right: f64) -> Self {
        if left <= right {
            Interval { left, right }
        } else {
            Interval {
                left: right,
                right: left,
            }
        }
    }

    pub fn point(x: f64) -> Self {
        Interval { left: x, right: x }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.left + self.right)
    }

    pub fn contains(&self, x: f64) -> bool {
        self.left <= x && x <= self.right
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }
}

/// Ordered list of closed intervals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new(intervals: Vec<Interval>) -> Self {
        IntervalSet { intervals }
    }

    pub fn empty() -> Self {
        IntervalSet::default()
    }

    pub fn single(left: f64, right: f64) -> Self {
        IntervalSet::new(vec![Interval::new(left, right)])
    }

    /// Builds a set from `(left, right)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        IntervalSet::new(pairs.iter().map(|&(l, r)| Interval::new(l, r)).collect())
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn into_intervals(self) -> Vec<Interval> {
        self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn push(&mut self, interval: Interval) {
        self.intervals.push(interval);
    }

    /// Total length, counting overlaps more than once.
    pub fn total_width(&self) -> f64 {
        self.intervals.iter().map(Interval::width).sum()
    }

    /// Smallest single interval covering every member.
    pub fn hull(&self) -> Option<Interval> {
        let left = self.intervals.iter().map(|i| i.left).reduce(f64::min)?;
        let right = self.intervals.iter().map(|i| i.right).reduce(f64::max)?;
        Some(Interval { left, right })
    }

    pub fn contains(&self, x: f64) -> bool {
        self.intervals.iter().any(|i| i.contains(x))
    }

    pub fn to_pairs(&self) -> Vec<(f64, f64)> {
        self.intervals.iter().map(|i| (i.left, i.right)).collect()
    }

    fn sorted(&self) -> Vec<Interval> {
        let mut sorted = self.intervals.clone();
        sorted.sort_by(|a, b| a.left.total_cmp(&b.left));
        sorted
    }

    /// Merges overlapping intervals into a sorted, disjoint set.
    ///
    /// Intervals that touch at an endpoint are joined.
    pub fn union_merge(&self) -> IntervalSet {
        let mut merged: Vec<Interval> = Vec::with_capacity(self.intervals.len());
        for interval in self.sorted() {
            match merged.last_mut() {
                Some(running) if interval.left <= running.right => {
                    running.right = running.right.max(interval.right);
                }
                _ => merged.push(interval),
            }
        }
        IntervalSet { intervals: merged }
    }

    /// Narrows to the interval common to every member.
    ///
    /// Returns an empty set when the members share no point; callers treat
    /// that as a legitimate zero-probability signal.
    pub fn intersection_merge(&self) -> IntervalSet {
        let mut members = self.intervals.iter();
        let Some(first) = members.next() else {
            return IntervalSet::empty();
        };
        let mut common = *first;
        for interval in members {
            common.left = common.left.max(interval.left);
            common.right = common.right.min(interval.right);
            if common.left > common.right {
                return IntervalSet::empty();
            }
        }
        IntervalSet::new(vec![common])
    }

    /// Union of two sets, merged.
    pub fn union(&self, other: &IntervalSet) -> IntervalSet {
        let mut all = self.intervals.clone();
        all.extend_from_slice(&other.intervals);
        IntervalSet::new(all).union_merge()
    }

    /// Pointwise intersection of two merged sets.
    pub fn intersect(&self, other: &IntervalSet) -> IntervalSet {
        let a = self.union_merge();
        let b = other.union_merge();
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            let x = a.intervals[i];
            let y = b.intervals[j];
            let left = x.left.max(y.left);
            let right = x.right.min(y.right);
            if left <= right {
                out.push(Interval { left, right });
            }
            if x.right < y.right {
                i += 1;
            } else {
                j += 1;
            }
        }
        IntervalSet::new(out)
    }
}

impl From<Interval> for IntervalSet {
    fn from(interval: Interval) -> Self {
        IntervalSet::new(vec![interval])
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        IntervalSet::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
