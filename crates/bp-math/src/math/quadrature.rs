//! Adaptive quadrature with epsilon-algorithm extrapolation.
//!
//! # Background
//!
//! Expectations of products of densities are rarely available in closed
//! form, so the fitting engine evaluates them numerically. Target densities
//! built from many factors can have sharp, narrow peaks; plain adaptive
//! bisection handles those poorly, so the integrator follows the QAGS
//! scheme: 21-point Gauss-Kronrod rules on a globally adaptive subdivision,
//! accelerated by Wynn's epsilon algorithm when the error is dominated by a
//! single small region.
//!
//! # Algorithm
//!
//! 1. Apply the 21-point Kronrod rule to `[a, b]`; accept when the error
//!    estimate already meets `max(epsabs, epsrel * |I|)`.
//! 2. Otherwise repeatedly bisect the subinterval with the largest error.
//! 3. Once the large subintervals are resolved, push the running total into
//!    an extrapolation table and accept the extrapolated value if its error
//!    beats the tolerance.
//! 4. Report a typed failure for roundoff, subdivision exhaustion, bad
//!    integrand behaviour, or divergence.

use bp_common::{Error, Result};

const EPSILON: f64 = f64::EPSILON;
const TINY: f64 = f64::MIN_POSITIVE;
const HUGE: f64 = f64::MAX;

/// Gauss weights of the 10-point rule.
#[allow(clippy::excessive_precision)]
const WG: [f64; 5] = [
    0.066671344308688137593568809893332,
    0.149451349150580593145776339657697,
    0.219086362515982043995534934228163,
    0.269266719309996355091226921569469,
    0.295524224714752870173892994651338,
];

/// Kronrod abscissae; odd indices are the Gauss nodes.
#[allow(clippy::excessive_precision)]
const XGK: [f64; 11] = [
    0.995657163025808080735527280689003,
    0.973906528517171720077964012084452,
    0.930157491355708226001207180059508,
    0.865063366688984510732096688423493,
    0.780817726586416897063717578345042,
    0.679409568299024406234327365114874,
    0.562757134668604683339000099272694,
    0.433395394129247190799265943165784,
    0.294392862701460198131126603103866,
    0.148874338981631210884826001129720,
    0.000000000000000000000000000000000,
];

#[allow(clippy::excessive_precision)]
const WGK: [f64; 11] = [
    0.011694638867371874278064396062192,
    0.032558162307964727478818972459390,
    0.054755896574351996031381300244580,
    0.075039674810919952767043140916190,
    0.093125454583697605535065465083366,
    0.109387158802297641899210590325805,
    0.123491976262065851077958109831074,
    0.134709217311473325928054001771707,
    0.142775938577060080797094273138717,
    0.147739104901338491374841515972068,
    0.149445554002916905664936468389821,
];

/// Size of the epsilon table; the algorithm never uses more than 50 entries.
const TABLE_SIZE: usize = 52;
const TABLE_LIMIT: usize = 50;

/// Tolerances and subdivision budget for one integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureOptions {
    pub epsabs: f64,
    pub epsrel: f64,
    /// Maximum number of subintervals.
    pub limit: usize,
}

impl Default for QuadratureOptions {
    fn default() -> Self {
        QuadratureOptions {
            epsabs: 1e-3,
            epsrel: 1e-3,
            limit: 30,
        }
    }
}

impl QuadratureOptions {
    /// Same absolute and relative tolerance.
    pub fn with_tolerance(tolerance: f64, limit: usize) -> Self {
        QuadratureOptions {
            epsabs: tolerance,
            epsrel: tolerance,
            limit,
        }
    }

    /// Both tolerances multiplied by `factor`.
    pub fn widened(&self, factor: f64) -> Self {
        QuadratureOptions {
            epsabs: self.epsabs * factor,
            epsrel: self.epsrel * factor,
            limit: self.limit,
        }
    }
}

/// Outcome of a converged integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrature {
    pub value: f64,
    pub abserr: f64,
    pub evaluations: usize,
    pub subintervals: usize,
}

/// Why QAGS gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadratureFailure {
    SubdivisionLimit,
    Roundoff,
    BadIntegrand,
    NoConvergence,
    Divergent,
}

impl QuadratureFailure {
    fn describe(self) -> &'static str {
        match self {
            QuadratureFailure::SubdivisionLimit => "maximum number of subdivisions reached",
            QuadratureFailure::Roundoff => "roundoff error prevents the requested tolerance",
            QuadratureFailure::BadIntegrand => "extremely bad integrand behaviour",
            QuadratureFailure::NoConvergence => "extrapolation table does not converge",
            QuadratureFailure::Divergent => "integral is divergent or slowly convergent",
        }
    }
}

/// One application of the 21-point Gauss-Kronrod rule.
#[derive(Debug, Clone, Copy)]
struct Rule {
    result: f64,
    abserr: f64,
    resabs: f64,
    resasc: f64,
}

fn rescale_error(err: f64, resabs: f64, resasc: f64) -> f64 {
    let mut err = err.abs();
    if resasc != 0.0 && err != 0.0 {
        let scale = (200.0 * err / resasc).powf(1.5);
        err = if scale < 1.0 { resasc * scale } else { resasc };
    }
    if resabs > TINY / (50.0 * EPSILON) {
        let min_err = 50.0 * EPSILON * resabs;
        if min_err > err {
            err = min_err;
        }
    }
    err
}

fn qk21<F: FnMut(f64) -> f64>(f: &mut F, a: f64, b: f64) -> Rule {
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);
    let abs_half = half.abs();
    let fc = f(center);

    let mut fv1 = [0.0; 10];
    let mut fv2 = [0.0; 10];
    let mut resg = 0.0;
    let mut resk = fc * WGK[10];
    let mut resabs = fc.abs() * WGK[10];

    for j in 0..5 {
        let jtw = 2 * j + 1;
        let abscissa = half * XGK[jtw];
        let f1 = f(center - abscissa);
        let f2 = f(center + abscissa);
        fv1[jtw] = f1;
        fv2[jtw] = f2;
        resg += WG[j] * (f1 + f2);
        resk += WGK[jtw] * (f1 + f2);
        resabs += WGK[jtw] * (f1.abs() + f2.abs());
    }

    for j in 0..5 {
        let jtwm1 = 2 * j;
        let abscissa = half * XGK[jtwm1];
        let f1 = f(center - abscissa);
        let f2 = f(center + abscissa);
        fv1[jtwm1] = f1;
        fv2[jtwm1] = f2;
        resk += WGK[jtwm1] * (f1 + f2);
        resabs += WGK[jtwm1] * (f1.abs() + f2.abs());
    }

    let mean = resk * 0.5;
    let mut resasc = WGK[10] * (fc - mean).abs();
    for j in 0..10 {
        resasc += WGK[j] * ((fv1[j] - mean).abs() + (fv2[j] - mean).abs());
    }

    let result = resk * half;
    let resabs = resabs * abs_half;
    let resasc = resasc * abs_half;
    let abserr = rescale_error((resk - resg) * half, resabs, resasc);

    Rule {
        result,
        abserr,
        resabs,
        resasc,
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    a: f64,
    b: f64,
    result: f64,
    error: f64,
    level: usize,
}

/// Subintervals ordered by decreasing error estimate.
struct Workspace {
    segments: Vec<Segment>,
    order: Vec<usize>,
    nrmax: usize,
    current: usize,
    maximum_level: usize,
    limit: usize,
}

impl Workspace {
    fn new(first: Segment, limit: usize) -> Self {
        Workspace {
            segments: vec![first],
            order: vec![0],
            nrmax: 0,
            current: 0,
            maximum_level: 0,
            limit,
        }
    }

    fn retrieve(&self) -> Segment {
        self.segments[self.current]
    }

    fn split(&mut self, left: Segment, right: Segment) {
        let i = self.current;
        let (keep, push) = if right.error > left.error {
            (right, left)
        } else {
            (left, right)
        };
        self.segments[i] = keep;
        self.segments.push(push);
        self.maximum_level = self.maximum_level.max(keep.level);
        self.sort(i);
    }

    /// Re-sorts the order list after segment `bisected` was replaced.
    fn sort(&mut self, bisected: usize) {
        let segments = &self.segments;
        let mut order: Vec<usize> = (0..segments.len()).collect();
        order.sort_by(|&x, &y| {
            segments[y]
                .error
                .partial_cmp(&segments[x].error)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let position = order.iter().position(|&k| k == bisected).unwrap_or(0);
        self.order = order;
        self.nrmax = self.nrmax.min(position).min(self.order.len() - 1);
        self.current = self.order[self.nrmax];
    }

    fn reset_nrmax(&mut self) {
        self.nrmax = 0;
        self.current = self.order[0];
    }

    fn large_interval(&self) -> bool {
        self.segments[self.current].level < self.maximum_level
    }

    /// Moves to the largest-error segment that can still be bisected.
    fn increase_nrmax(&mut self) -> bool {
        let last = self.segments.len() - 1;
        let jupbnd = if last > 1 + self.limit / 2 {
            self.limit + 1 - last
        } else {
            last
        };
        let mut k = self.nrmax;
        while k <= jupbnd && self.nrmax < self.order.len() {
            let candidate = self.order[self.nrmax];
            self.current = candidate;
            if self.segments[candidate].level < self.maximum_level {
                return true;
            }
            self.nrmax += 1;
            k += 1;
        }
        if self.nrmax >= self.order.len() {
            self.nrmax = self.order.len() - 1;
            self.current = self.order[self.nrmax];
        }
        false
    }

    fn sum_results(&self) -> f64 {
        self.segments.iter().map(|s| s.result).sum()
    }
}

fn subinterval_too_small(a1: f64, a2: f64, b2: f64) -> bool {
    let tmp = (1.0 + 100.0 * EPSILON) * (a2.abs() + 1000.0 * TINY);
    a1.abs() <= tmp && b2.abs() <= tmp
}

/// Wynn epsilon table.
struct ExtrapolationTable {
    n: usize,
    rlist2: [f64; TABLE_SIZE + 1],
    nres: usize,
    res3la: [f64; 3],
}

impl ExtrapolationTable {
    fn new() -> Self {
        ExtrapolationTable {
            n: 0,
            rlist2: [0.0; TABLE_SIZE + 1],
            nres: 0,
            res3la: [0.0; 3],
        }
    }

    fn append(&mut self, y: f64) {
        if self.n < TABLE_SIZE {
            self.rlist2[self.n] = y;
            self.n += 1;
        }
    }

    /// Returns the extrapolated limit and its error estimate.
    fn extrapolate(&mut self) -> (f64, f64) {
        let n_orig = self.n - 1;
        let n = n_orig;
        let epstab = &mut self.rlist2;
        let current = epstab[n];
        let mut absolute = HUGE;
        let mut relative = 5.0 * EPSILON * current.abs();
        let newelm = n / 2;
        let nres_orig = self.nres;
        let mut n_final = n;
        let mut result = current;
        let mut abserr = HUGE;

        self.nres += 1;

        if n < 2 {
            return (current, absolute.max(relative));
        }

        epstab[n + 2] = epstab[n];
        epstab[n] = HUGE;

        for i in 0..newelm {
            let res = epstab[n - 2 * i + 2];
            let e0 = epstab[n - 2 * i - 2];
            let e1 = epstab[n - 2 * i - 1];
            let e2 = res;

            let e1abs = e1.abs();
            let delta2 = e2 - e1;
            let err2 = delta2.abs();
            let tol2 = e2.abs().max(e1abs) * EPSILON;
            let delta3 = e1 - e0;
            let err3 = delta3.abs();
            let tol3 = e1abs.max(e0.abs()) * EPSILON;

            if err2 <= tol2 && err3 <= tol3 {
                // e0, e1 and e2 agree to machine accuracy.
                absolute = err2 + err3;
                relative = 5.0 * EPSILON * res.abs();
                return (res, absolute.max(relative));
            }

            let e3 = epstab[n - 2 * i];
            epstab[n - 2 * i] = e1;
            let delta1 = e1 - e3;
            let err1 = delta1.abs();
            let tol1 = e1abs.max(e3.abs()) * EPSILON;

            if err1 <= tol1 || err2 <= tol2 || err3 <= tol3 {
                n_final = 2 * i;
                break;
            }

            let ss = 1.0 / delta1 + 1.0 / delta2 - 1.0 / delta3;
            if (ss * e1).abs() <= 1e-4 {
                n_final = 2 * i;
                break;
            }

            let res = e1 + 1.0 / ss;
            epstab[n - 2 * i] = res;
            let error = err2 + (res - e2).abs() + err3;
            if error <= abserr {
                abserr = error;
                result = res;
            }
        }

        let limexp = TABLE_LIMIT - 1;
        if n_final == limexp {
            n_final = 2 * (limexp / 2);
        }

        if n_orig % 2 == 1 {
            for i in 0..=n_final / 2 {
                epstab[1 + i * 2] = epstab[i * 2 + 3];
            }
        } else {
            for i in 0..=n_final / 2 {
                epstab[i * 2] = epstab[i * 2 + 2];
            }
        }

        if n_orig != n_final {
            for i in 0..=n_final {
                epstab[i] = epstab[n_orig - n_final + i];
            }
        }

        self.n = n_final + 1;

        if nres_orig < 3 {
            self.res3la[nres_orig] = result;
            abserr = HUGE;
        } else {
            abserr = (result - self.res3la[2]).abs()
                + (result - self.res3la[1]).abs()
                + (result - self.res3la[0]).abs();
            self.res3la[0] = self.res3la[1];
            self.res3la[1] = self.res3la[2];
            self.res3la[2] = result;
        }

        (result, abserr.max(5.0 * EPSILON * result.abs()))
    }
}

fn failure(a: f64, b: f64, abserr: f64, tolerance: f64, kind: QuadratureFailure) -> Error {
    Error::DifficultIntegral {
        left: a,
        right: b,
        abserr,
        tolerance,
        reason: kind.describe().to_string(),
    }
}

/// Integrates `f` over the finite interval `[a, b]`.
///
/// Fails with [`Error::DifficultIntegral`] when the requested accuracy
/// cannot be reached, and with [`Error::InvalidArgument`] for unusable
/// tolerances or endpoints.
pub fn qags<F: FnMut(f64) -> f64>(
    mut f: F,
    a: f64,
    b: f64,
    options: &QuadratureOptions,
) -> Result<Quadrature> {
    let QuadratureOptions {
        epsabs,
        epsrel,
        limit,
    } = *options;

    if !a.is_finite() || !b.is_finite() {
        return Err(Error::invalid(format!(
            "integration bounds must be finite, got [{a}, {b}]"
        )));
    }
    if limit == 0 {
        return Err(Error::invalid("subdivision limit must be positive"));
    }
    if epsabs <= 0.0 && (epsrel < 50.0 * EPSILON || epsrel < 0.5e-28) {
        return Err(Error::invalid(format!(
            "tolerance cannot be achieved with epsabs {epsabs} and epsrel {epsrel}"
        )));
    }

    let mut evaluations = 0usize;
    let mut counted = |x: f64| {
        evaluations += 1;
        f(x)
    };

    let first = qk21(&mut counted, a, b);
    let mut tolerance = epsabs.max(epsrel * first.result.abs());
    let round_off = 100.0 * EPSILON * first.resabs;

    if first.abserr <= round_off && first.abserr > tolerance {
        return Err(failure(a, b, first.abserr, tolerance, QuadratureFailure::Roundoff));
    }
    if (first.abserr <= tolerance && first.abserr != first.resasc) || first.abserr == 0.0 {
        return finish(a, b, first.result, first.abserr, tolerance, evaluations, 1);
    }
    if limit == 1 {
        return Err(failure(
            a,
            b,
            first.abserr,
            tolerance,
            QuadratureFailure::SubdivisionLimit,
        ));
    }

    let mut workspace = Workspace::new(
        Segment {
            a,
            b,
            result: first.result,
            error: first.abserr,
            level: 0,
        },
        limit,
    );
    let mut table = ExtrapolationTable::new();
    table.append(first.result);

    let mut area = first.result;
    let mut errsum = first.abserr;
    let mut res_ext = first.result;
    let mut err_ext = HUGE;
    let mut correc = 0.0;
    let mut ertest = 0.0;
    let mut error_over_large_intervals = 0.0;
    let mut ktmin = 0usize;
    let mut roundoff_type1 = 0usize;
    let mut roundoff_type2 = 0usize;
    let mut roundoff_type3 = 0usize;
    let mut error_type: Option<QuadratureFailure> = None;
    let mut error_type2 = false;
    let mut extrapolate = false;
    let mut disallow_extrapolation = false;
    let positive_integrand = first.result.abs() >= (1.0 - 50.0 * EPSILON) * first.resabs;
    let mut converged_by_sum = false;
    let mut iteration = 1usize;

    loop {
        let segment = workspace.retrieve();
        let current_level = segment.level + 1;
        let a1 = segment.a;
        let b1 = 0.5 * (segment.a + segment.b);
        let a2 = b1;
        let b2 = segment.b;

        iteration += 1;

        let left = qk21(&mut counted, a1, b1);
        let right = qk21(&mut counted, a2, b2);

        let area12 = left.result + right.result;
        let error12 = left.abserr + right.abserr;
        let last_e_i = segment.error;

        errsum += error12 - segment.error;
        area += area12 - segment.result;
        tolerance = epsabs.max(epsrel * area.abs());

        if left.resasc != left.abserr && right.resasc != right.abserr {
            let delta = segment.result - area12;
            if delta.abs() <= 1e-5 * area12.abs() && error12 >= 0.99 * segment.error {
                if extrapolate {
                    roundoff_type2 += 1;
                } else {
                    roundoff_type1 += 1;
                }
            }
            if iteration > 10 && error12 > segment.error {
                roundoff_type3 += 1;
            }
        }

        if roundoff_type1 + roundoff_type2 >= 10 || roundoff_type3 >= 20 {
            error_type = Some(QuadratureFailure::Roundoff);
        }
        if roundoff_type2 >= 5 {
            error_type2 = true;
        }
        if subinterval_too_small(a1, a2, b2) {
            error_type = Some(QuadratureFailure::BadIntegrand);
        }

        workspace.split(
            Segment {
                a: a1,
                b: b1,
                result: left.result,
                error: left.abserr,
                level: current_level,
            },
            Segment {
                a: a2,
                b: b2,
                result: right.result,
                error: right.abserr,
                level: current_level,
            },
        );

        if errsum <= tolerance {
            converged_by_sum = true;
            break;
        }
        if error_type.is_some() {
            break;
        }
        if iteration >= limit - 1 {
            error_type = Some(QuadratureFailure::SubdivisionLimit);
            break;
        }

        if iteration == 2 {
            error_over_large_intervals = errsum;
            ertest = tolerance;
            table.append(area);
            continue;
        }

        if disallow_extrapolation {
            continue;
        }

        error_over_large_intervals -= last_e_i;
        if current_level < workspace.maximum_level {
            error_over_large_intervals += error12;
        }

        if !extrapolate {
            // Keep bisecting while large intervals remain.
            if workspace.large_interval() {
                continue;
            }
            extrapolate = true;
            workspace.nrmax = 1.min(workspace.order.len() - 1);
            workspace.current = workspace.order[workspace.nrmax];
        }

        if !error_type2
            && error_over_large_intervals > ertest
            && workspace.increase_nrmax()
        {
            continue;
        }

        table.append(area);
        let (reseps, abseps) = table.extrapolate();
        ktmin += 1;

        if ktmin > 5 && err_ext < 1e-3 * errsum {
            error_type = Some(QuadratureFailure::NoConvergence);
        }

        if abseps < err_ext {
            ktmin = 0;
            err_ext = abseps;
            res_ext = reseps;
            correc = error_over_large_intervals;
            ertest = epsabs.max(epsrel * reseps.abs());
            if err_ext <= ertest {
                break;
            }
        }

        if table.n == 1 {
            disallow_extrapolation = true;
        }
        if error_type == Some(QuadratureFailure::NoConvergence) {
            break;
        }

        workspace.reset_nrmax();
        extrapolate = false;
        error_over_large_intervals = errsum;
    }

    let subintervals = workspace.segments.len();

    if converged_by_sum {
        return finish(
            a,
            b,
            workspace.sum_results(),
            errsum,
            tolerance,
            evaluations,
            subintervals,
        );
    }

    // Decide between the extrapolated value and the plain sum.
    if err_ext == HUGE {
        return summed(a, b, &workspace, errsum, tolerance, error_type, evaluations);
    }

    if error_type.is_some() || error_type2 {
        if error_type2 {
            err_ext += correc;
        }
        if error_type.is_none() {
            error_type = Some(QuadratureFailure::Roundoff);
        }
        if res_ext != 0.0 && area != 0.0 {
            if err_ext / res_ext.abs() > errsum / area.abs() {
                return summed(a, b, &workspace, errsum, tolerance, error_type, evaluations);
            }
        } else if err_ext > errsum {
            return summed(a, b, &workspace, errsum, tolerance, error_type, evaluations);
        } else if area == 0.0 {
            return conclude(a, b, res_ext, err_ext, tolerance, error_type, evaluations, subintervals);
        }
    }

    // Divergence test.
    let max_area = res_ext.abs().max(area.abs());
    if !positive_integrand && max_area < 0.01 * first.resabs {
        return conclude(a, b, res_ext, err_ext, tolerance, error_type, evaluations, subintervals);
    }
    let ratio = res_ext / area;
    if !(0.01..=100.0).contains(&ratio) || errsum > area.abs() {
        error_type = Some(QuadratureFailure::Divergent);
    }

    conclude(a, b, res_ext, err_ext, tolerance, error_type, evaluations, subintervals)
}

fn finish(
    a: f64,
    b: f64,
    value: f64,
    abserr: f64,
    tolerance: f64,
    evaluations: usize,
    subintervals: usize,
) -> Result<Quadrature> {
    if !value.is_finite() {
        return Err(Error::DifficultIntegral {
            left: a,
            right: b,
            abserr,
            tolerance,
            reason: format!("integrand produced a non-finite value ({value})"),
        });
    }
    Ok(Quadrature {
        value,
        abserr,
        evaluations,
        subintervals,
    })
}

fn summed(
    a: f64,
    b: f64,
    workspace: &Workspace,
    errsum: f64,
    tolerance: f64,
    error_type: Option<QuadratureFailure>,
    evaluations: usize,
) -> Result<Quadrature> {
    conclude(
        a,
        b,
        workspace.sum_results(),
        errsum,
        tolerance,
        error_type,
        evaluations,
        workspace.segments.len(),
    )
}

#[allow(clippy::too_many_arguments)]
fn conclude(
    a: f64,
    b: f64,
    value: f64,
    abserr: f64,
    tolerance: f64,
    error_type: Option<QuadratureFailure>,
    evaluations: usize,
    subintervals: usize,
) -> Result<Quadrature> {
    match error_type {
        Some(kind) => Err(failure(a, b, abserr, tolerance, kind)),
        None => finish(a, b, value, abserr, tolerance, evaluations, subintervals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(tol: f64) -> QuadratureOptions {
        QuadratureOptions::with_tolerance(tol, 50)
    }

    #[test]
    fn constant_integrand_is_exact() {
        let q = qags(|_| 1.0, 0.0, 1.0, &opts(1e-10)).unwrap();
        assert!((q.value - 1.0).abs() < 1e-14);
        assert_eq!(q.subintervals, 1);
        assert_eq!(q.evaluations, 21);
    }

    #[test]
    fn polynomial_is_exact() {
        // GK21 integrates polynomials up to degree 31 exactly.
        let q = qags(|x| x.powi(5) - 3.0 * x * x, -1.0, 2.0, &opts(1e-12)).unwrap();
        let exact = (64.0 - 1.0) / 6.0 - (8.0 + 1.0);
        assert!((q.value - exact).abs() < 1e-12, "got {}", q.value);
    }

    #[test]
    fn gaussian_mass() {
        let pdf = |x: f64| (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt();
        let q = qags(pdf, -8.0, 8.0, &opts(1e-10)).unwrap();
        assert!((q.value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sharp_peak_requires_subdivision() {
        let s = 1e-3;
        let pdf = |x: f64| (-0.5 * (x / s).powi(2)).exp() / (s * (2.0 * std::f64::consts::PI).sqrt());
        let q = qags(pdf, -1.0, 3.0, &opts(1e-8)).unwrap();
        assert!((q.value - 1.0).abs() < 1e-6, "got {}", q.value);
        assert!(q.subintervals > 1);
    }

    #[test]
    fn endpoint_singularity_uses_extrapolation() {
        // ∫_0^1 ln(x)/sqrt(x) dx = -4
        let q = qags(
            |x: f64| if x > 0.0 { x.ln() / x.sqrt() } else { 0.0 },
            0.0,
            1.0,
            &QuadratureOptions::with_tolerance(1e-8, 100),
        )
        .unwrap();
        assert!((q.value + 4.0).abs() < 1e-6, "got {}", q.value);
    }

    #[test]
    fn subdivision_limit_is_reported() {
        let err = qags(
            |x: f64| (1.0 / (x + 1e-9)).sin(),
            0.0,
            1.0,
            &QuadratureOptions::with_tolerance(1e-12, 3),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DifficultIntegral { .. }));
    }

    #[test]
    fn rejects_infinite_bounds() {
        let err = qags(|_| 1.0, 0.0, f64::INFINITY, &opts(1e-6)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn reversed_bounds_negate() {
        let q = qags(|x| x, 1.0, 0.0, &opts(1e-10)).unwrap();
        assert!((q.value + 0.5).abs() < 1e-12);
    }

    #[test]
    fn widened_scales_both_tolerances() {
        let w = opts(1e-5).widened(100.0);
        assert!((w.epsabs - 1e-3).abs() < 1e-15);
        assert!((w.epsrel - 1e-3).abs() < 1e-15);
        assert_eq!(w.limit, 50);
    }
}
