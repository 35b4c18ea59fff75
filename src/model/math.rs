//! Numeric helpers shared by the model and the estimator.

use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::error::{GateError, Result};

/// `ln(Σ exp(v))`, stable for large magnitudes. Returns `-inf` when every
/// input is `-inf` (or there are none).
pub fn log_sum_exp<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let max = iter.clone().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let sum: f64 = iter.map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Natural log of the gamma function for positive `x`.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    if x <= 0.0 {
        return f64::INFINITY;
    }

    if x < 0.5 {
        // Reflection
        std::f64::consts::PI.ln() - (std::f64::consts::PI * x).sin().ln() - ln_gamma(1.0 - x)
    } else if x < 7.0 {
        let mut xx = x;
        let mut result = 0.0;
        while xx < 7.0 {
            result -= xx.ln();
            xx += 1.0;
        }
        result + ln_gamma(xx)
    } else {
        // Stirling series
        let x2 = x * x;
        (x - 0.5) * x.ln() - x + 0.5 * (2.0 * std::f64::consts::PI).ln() + 1.0 / (12.0 * x)
            - 1.0 / (360.0 * x2 * x)
            + 1.0 / (1260.0 * x2 * x2 * x)
    }
}

/// Log density of `x` under `Dirichlet(alpha)`.
#[must_use]
pub fn dirichlet_ln_pdf(x: &[f64], alpha: &[f64]) -> f64 {
    let alpha_sum: f64 = alpha.iter().sum();
    let mut ln_pdf = ln_gamma(alpha_sum);
    for (&xi, &ai) in x.iter().zip(alpha) {
        ln_pdf -= ln_gamma(ai);
        if (ai - 1.0).abs() > f64::EPSILON {
            ln_pdf += (ai - 1.0) * xi.ln();
        }
    }
    ln_pdf
}

/// Mode of `Dirichlet(alpha)`: `(alpha_i - 1) / (Σ alpha - K)`, clipped at
/// zero and renormalized. Falls back to the mean when no interior mode exists.
#[must_use]
pub fn dirichlet_mode(alpha: &[f64]) -> Vec<f64> {
    #[allow(clippy::cast_precision_loss)]
    let k = alpha.len() as f64;
    let denom = alpha.iter().sum::<f64>() - k;
    if denom > 0.0 {
        let clipped: Vec<f64> = alpha
            .iter()
            .map(|a| ((a - 1.0) / denom).max(0.0))
            .collect();
        if let Some(mode) = normalized(&clipped) {
            return mode;
        }
    }
    normalized(alpha).unwrap_or_else(|| vec![1.0 / k; alpha.len()])
}

/// Draw from `Dirichlet(alpha)` by normalizing independent gamma draws.
pub fn sample_dirichlet<R: Rng + ?Sized>(alpha: &[f64], rng: &mut R) -> Result<Vec<f64>> {
    let mut draws = Vec::with_capacity(alpha.len());
    for &a in alpha {
        let gamma = Gamma::new(a, 1.0)
            .map_err(|err| GateError::Estimation(format!("invalid dirichlet alpha {a}: {err}")))?;
        draws.push(gamma.sample(rng));
    }
    // Tiny shapes can underflow every draw.
    Ok(normalized(&draws).unwrap_or_else(|| dirichlet_mean(alpha)))
}

#[must_use]
pub fn dirichlet_mean(alpha: &[f64]) -> Vec<f64> {
    #[allow(clippy::cast_precision_loss)]
    let k = alpha.len() as f64;
    normalized(alpha).unwrap_or_else(|| vec![1.0 / k; alpha.len()])
}

/// Beta pseudo-counts with the given mode and total magnitude.
#[must_use]
pub fn beta_fit(mode: f64, mag: f64) -> [f64; 2] {
    let alpha = mode.mul_add(mag - 2.0, 1.0);
    [alpha, mag - alpha]
}

/// Penalty for a wrong answer that makes `accuracy` break even against
/// `reward` for a right one.
#[must_use]
pub fn get_penalty(accuracy: f64, reward: f64) -> f64 {
    accuracy * reward / (accuracy - 1.0)
}

/// `values / Σ values`, or `None` when the total is not positive.
#[must_use]
pub fn normalized(values: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        Some(values.iter().map(|v| v / total).collect())
    } else {
        None
    }
}
