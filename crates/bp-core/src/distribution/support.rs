//! Numerical support search for densities without a closed form.

use bp_common::{Error, Result};
use bp_math::{Interval, IntervalSet};

/// Evenly spaced points spanning `interval`, endpoints included.
pub(crate) fn grid(interval: &Interval, points: usize) -> Vec<f64> {
    let points = points.max(2);
    let step = interval.width() / (points - 1) as f64;
    (0..points)
        .map(|i| {
            if i == points - 1 {
                interval.right
            } else {
                interval.left + step * i as f64
            }
        })
        .collect()
}

/// Narrowest probe window over `domain` that holds at least `1 - epsilon`
/// of the trapezoid mass of `density`.
///
/// The window is widened by one probe cell on each side and clipped to
/// `domain`.
pub(crate) fn search_effective_support<F: Fn(f64) -> f64>(
    density: F,
    domain: &IntervalSet,
    epsilon: f64,
    probes: usize,
) -> Result<IntervalSet> {
    let hull = domain
        .union_merge()
        .hull()
        .ok_or_else(|| Error::SupportUndefined("empty domain".to_string()))?;
    if !hull.is_finite() {
        return Err(Error::SupportUndefined(format!(
            "domain [{}, {}] is unbounded",
            hull.left, hull.right
        )));
    }
    if hull.width() == 0.0 {
        return Ok(IntervalSet::from(hull));
    }

    let xs = grid(&hull, probes);
    let values: Vec<f64> = xs
        .iter()
        .map(|&x| if domain.contains(x) { density(x).max(0.0) } else { 0.0 })
        .collect();
    let cells: Vec<f64> = xs
        .windows(2)
        .zip(values.windows(2))
        .map(|(x, v)| 0.5 * (v[0] + v[1]) * (x[1] - x[0]))
        .collect();
    let total: f64 = cells.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(Error::SupportUndefined(format!(
            "density vanishes on every probe over [{}, {}]",
            hull.left, hull.right
        )));
    }

    // Two-pointer scan for the shortest run of cells reaching the target.
    let target = (1.0 - epsilon) * total;
    let (mut best_lo, mut best_hi) = (0, cells.len() - 1);
    let mut lo = 0;
    let mut mass = 0.0;
    for hi in 0..cells.len() {
        mass += cells[hi];
        while lo < hi && mass - cells[lo] >= target {
            mass -= cells[lo];
            lo += 1;
        }
        if mass >= target && hi - lo < best_hi - best_lo {
            best_lo = lo;
            best_hi = hi;
        }
    }

    let left = xs[best_lo.saturating_sub(1)];
    let right = xs[(best_hi + 2).min(xs.len() - 1)];
    Ok(domain.intersect(&IntervalSet::single(left, right)))
}

/// Shrinks every interval of `domain` to the span where `density` is
/// nonzero, scanning at `steps` cells per interval. Intervals with no
/// nonzero probe are dropped.
pub(crate) fn trim_support<F: Fn(f64) -> f64>(
    density: F,
    domain: &IntervalSet,
    steps: usize,
) -> IntervalSet {
    let mut trimmed = IntervalSet::empty();
    for interval in domain.iter() {
        if interval.width() == 0.0 {
            if density(interval.left) > 0.0 {
                trimmed.push(*interval);
            }
            continue;
        }
        let xs = grid(interval, steps + 1);
        let nonzero: Vec<usize> = xs
            .iter()
            .enumerate()
            .filter_map(|(i, &x)| (density(x) > 0.0).then_some(i))
            .collect();
        let (Some(&first), Some(&last)) = (nonzero.first(), nonzero.last()) else {
            continue;
        };
        let left = xs[first.saturating_sub(1)];
        let right = xs[(last + 1).min(xs.len() - 1)];
        trimmed.push(Interval::new(left, right));
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use bp_math::normal_pdf;

    #[test]
    fn window_search_brackets_a_normal() {
        let domain = IntervalSet::single(-20.0, 20.0);
        let support =
            search_effective_support(|x| normal_pdf(x, 1.0, 1.0), &domain, 1e-3, 400).unwrap();
        let hull = support.hull().unwrap();
        // 1e-3 two-sided is about ±3.29 sigma; allow a cell of slack.
        assert!(hull.left > -3.0 && hull.left < -2.0);
        assert!(hull.right > 4.0 && hull.right < 5.0);
    }

    #[test]
    fn window_search_rejects_zero_density() {
        let domain = IntervalSet::single(0.0, 1.0);
        assert!(matches!(
            search_effective_support(|_| 0.0, &domain, 1e-3, 50),
            Err(Error::SupportUndefined(_))
        ));
    }

    #[test]
    fn trimming_drops_empty_intervals() {
        let domain = IntervalSet::from_pairs(&[(-10.0, 10.0), (20.0, 30.0)]);
        let density = |x: f64| if (0.0..=2.0).contains(&x) { 1.0 } else { 0.0 };
        let trimmed = trim_support(density, &domain, 100);
        assert_eq!(trimmed.len(), 1);
        let only = trimmed.intervals()[0];
        assert!(only.left >= -0.2 - 1e-9 && only.left <= 1e-9);
        assert!(only.right >= 2.0 - 1e-9 && only.right <= 2.2 + 1e-9);
    }
}
