//! Direct discrete convolution and correlation.
//!
//! Tables here are short (discrete state counts, or a few hundred grid
//! points for numerical sums), so the direct O(n·m) forms are used.

/// Full convolution; output length is `a.len() + b.len() - 1`.
pub fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0.0 {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            out[i + j] += ai * bj;
        }
    }
    out
}

/// Valid-range correlation: `out[u] = Σ_s kernel[s] · signal[u + s]`.
///
/// Output length is `signal.len() - kernel.len() + 1`, empty when the
/// kernel is longer than the signal.
pub fn correlate_valid(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if kernel.is_empty() || kernel.len() > signal.len() {
        return Vec::new();
    }
    (0..=signal.len() - kernel.len())
        .map(|u| {
            kernel
                .iter()
                .enumerate()
                .map(|(s, &k)| k * signal[u + s])
                .sum()
        })
        .collect()
}

/// Divides by the sum; returns `None` when the sum is not positive.
pub fn normalized(values: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = values.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return None;
    }
    Some(values.iter().map(|v| v / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convolution_of_dice() {
        let die = vec![1.0 / 6.0; 6];
        let two = convolve(&die, &die);
        assert_eq!(two.len(), 11);
        assert!((two[5] - 6.0 / 36.0).abs() < 1e-15);
        assert!((two.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_slides_kernel() {
        let signal = [1.0, 2.0, 3.0, 4.0];
        let kernel = [0.5, 0.5];
        assert_eq!(correlate_valid(&signal, &kernel), vec![1.5, 2.5, 3.5]);
        assert!(correlate_valid(&kernel, &signal).is_empty());
    }

    #[test]
    fn normalized_rejects_zero_mass() {
        assert!(normalized(&[0.0, 0.0]).is_none());
        assert_eq!(normalized(&[1.0, 3.0]).unwrap(), vec![0.25, 0.75]);
    }
}
