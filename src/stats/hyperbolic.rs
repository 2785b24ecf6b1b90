//! The generalized hyperbolic distribution with shape-family parameter
//! lambda = 1 ("the" hyperbolic distribution), in the Barndorff-Nielsen
//! (1978) parameterization `(alpha, beta, delta, loc)`. Used to model
//! per-unit wind-power forecast error: `beta` skews the error, `alpha` and
//! `delta` trade off peakedness against tail weight.
//!
//! The density has the closed form
//! `f(x) = gamma / (2 alpha delta K1(delta gamma))
//!         * exp(-alpha * sqrt(delta^2 + (x - loc)^2) + beta (x - loc))`
//! with `gamma = sqrt(alpha^2 - beta^2)`. Moments come from the GIG mixing
//! representation `X = loc + beta W + sqrt(W) Z`, whose moment ratios are
//! ratios of modified Bessel functions; the CDF has no closed form and is
//! evaluated by adaptive quadrature over the density.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EnsembleError, Result};
use crate::stats::bessel::{bessel_kn_scaled, ln_bessel_kn};

/// Drop below the modal log-density at which the tails are treated as
/// numerically empty (e^-45 relative mass).
const SUPPORT_LOG_DROP: f64 = 45.0;

/// Fitted parameters of a hyperbolic distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperbolicParameters {
    /// Shape (tail steepness), > |beta|.
    pub alpha: f64,
    /// Skew.
    pub beta: f64,
    /// Scale, > 0.
    pub delta: f64,
    /// Location.
    pub loc: f64,
}

impl HyperbolicParameters {
    pub fn new(alpha: f64, beta: f64, delta: f64, loc: f64) -> Self {
        Self { alpha, beta, delta, loc }
    }

    pub fn from_array(x: [f64; 4]) -> Self {
        Self { alpha: x[0], beta: x[1], delta: x[2], loc: x[3] }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.alpha, self.beta, self.delta, self.loc]
    }
}

/// A frozen hyperbolic distribution supporting density, CDF, analytic
/// moments, and random sampling.
#[derive(Debug, Clone)]
pub struct Hyperbolic {
    params: HyperbolicParameters,
    gamma: f64,
    log_norm: f64,
    support: (f64, f64),
}

impl Hyperbolic {
    /// Freeze a distribution, rejecting parameters outside the feasible
    /// region of the family.
    pub fn new(params: HyperbolicParameters) -> Result<Self> {
        let HyperbolicParameters { alpha, beta, delta, loc } = params;
        if !(alpha.is_finite() && beta.is_finite() && delta.is_finite() && loc.is_finite()) {
            return Err(EnsembleError::InvalidParameters(format!(
                "non-finite parameters ({alpha}, {beta}, {delta}, {loc})"
            )));
        }
        if alpha <= beta.abs() {
            return Err(EnsembleError::InvalidParameters(format!(
                "alpha ({alpha}) must exceed |beta| ({})",
                beta.abs()
            )));
        }
        if delta <= 0.0 {
            return Err(EnsembleError::InvalidParameters(format!(
                "delta ({delta}) must be positive"
            )));
        }

        let gamma = ((alpha - beta.abs()) * (alpha + beta.abs())).sqrt();
        let log_norm = gamma.ln() - (2.0 * alpha * delta).ln() - ln_bessel_kn(1, delta * gamma);

        let mut dist = Self { params, gamma, log_norm, support: (0.0, 0.0) };
        dist.support = dist.effective_support();
        Ok(dist)
    }

    pub fn params(&self) -> HyperbolicParameters {
        self.params
    }

    /// Density mode, `loc + delta * beta / gamma`.
    pub fn mode(&self) -> f64 {
        self.params.loc + self.params.delta * self.params.beta / self.gamma
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        let centered = x - self.params.loc;
        self.log_norm - self.params.alpha * self.params.delta.hypot(centered)
            + self.params.beta * centered
    }

    pub fn pdf(&self, x: f64) -> f64 {
        self.log_pdf(x).exp()
    }

    /// P(X <= x), by adaptive Simpson quadrature of the density from the
    /// lower edge of the effective support, split at the mode so the peak
    /// is never straddled by a coarse panel.
    pub fn cdf(&self, x: f64) -> f64 {
        let (lo, hi) = self.support;
        if x <= lo {
            return 0.0;
        }
        if x >= hi {
            return 1.0;
        }
        let density = |t: f64| self.pdf(t);
        let mode = self.mode();
        let integral = if mode > lo && mode < x {
            adaptive_simpson(&density, lo, mode, 0.5e-9)
                + adaptive_simpson(&density, mode, x, 0.5e-9)
        } else {
            adaptive_simpson(&density, lo, x, 1e-9)
        };
        integral.clamp(0.0, 1.0)
    }

    /// Raw moments `E[W^k]`, k = 1..=4, of the GIG mixing variable:
    /// `E[W^k] = (delta/gamma)^k K_{1+k}(delta gamma) / K_1(delta gamma)`.
    fn gig_moments(&self) -> [f64; 4] {
        let z = self.params.delta * self.gamma;
        let ratio = self.params.delta / self.gamma;
        let k1 = bessel_kn_scaled(1, z);
        let mut moments = [0.0; 4];
        for (k, moment) in moments.iter_mut().enumerate() {
            *moment = ratio.powi(k as i32 + 1) * bessel_kn_scaled(k as u32 + 2, z) / k1;
        }
        moments
    }

    pub fn mean(&self) -> f64 {
        let z = self.params.delta * self.gamma;
        let w1 = (self.params.delta / self.gamma) * bessel_kn_scaled(2, z)
            / bessel_kn_scaled(1, z);
        self.params.loc + self.params.beta * w1
    }

    pub fn variance(&self) -> f64 {
        let [w1, w2, _, _] = self.gig_moments();
        w1 + self.params.beta.powi(2) * (w2 - w1 * w1)
    }

    /// Excess (Fisher) kurtosis from the mixture's central moments.
    pub fn excess_kurtosis(&self) -> f64 {
        let (_, kurtosis) = self.mean_and_kurtosis();
        kurtosis
    }

    /// Mean and excess kurtosis in one pass, the two moments the fit
    /// objective asks for.
    pub fn mean_and_kurtosis(&self) -> (f64, f64) {
        let beta = self.params.beta;
        let [w1, w2, w3, w4] = self.gig_moments();
        let mean = self.params.loc + beta * w1;

        let var_w = w2 - w1 * w1;
        let mu2 = w1 + beta * beta * var_w;
        // E[(W - w1)^2 W] and E[(W - w1)^4] in raw-moment form.
        let ww2 = w3 - 2.0 * w1 * w2 + w1.powi(3);
        let w_central4 = w4 - 4.0 * w1 * w3 + 6.0 * w1 * w1 * w2 - 3.0 * w1.powi(4);
        let mu4 = beta.powi(4) * w_central4 + 6.0 * beta * beta * ww2 + 3.0 * w2;

        (mean, mu4 / (mu2 * mu2) - 3.0)
    }

    /// Draw `n` iid samples by inverse transform over a normalized
    /// cumulative grid spanning the effective support.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        const GRID_CELLS: usize = 1024;
        let (lo, hi) = self.support;
        let dx = (hi - lo) / GRID_CELLS as f64;
        let density: Vec<f64> = (0..=GRID_CELLS)
            .map(|i| self.pdf(lo + dx * i as f64))
            .collect();
        let mut cumulative = vec![0.0; GRID_CELLS + 1];
        for i in 0..GRID_CELLS {
            cumulative[i + 1] = cumulative[i] + 0.5 * (density[i] + density[i + 1]) * dx;
        }
        let total = cumulative[GRID_CELLS];

        (0..n)
            .map(|_| {
                let u = rng.gen::<f64>() * total;
                let k = cumulative.partition_point(|&c| c < u).clamp(1, GRID_CELLS);
                let span = cumulative[k] - cumulative[k - 1];
                let x0 = lo + dx * (k - 1) as f64;
                if span > 0.0 {
                    x0 + (u - cumulative[k - 1]) / span * dx
                } else {
                    x0
                }
            })
            .collect()
    }

    /// Interval outside which the density is below e^-45 of its modal
    /// value. Found by doubling steps outward from the mode; the tails are
    /// log-linear so the expansion terminates quickly.
    fn effective_support(&self) -> (f64, f64) {
        let mode = self.mode();
        let peak = self.log_pdf(mode);
        let floor = peak - SUPPORT_LOG_DROP;
        let initial = self.params.delta.max(1e-6);

        let mut left = initial;
        for _ in 0..200 {
            if self.log_pdf(mode - left) <= floor {
                break;
            }
            left *= 2.0;
        }
        let mut right = initial;
        for _ in 0..200 {
            if self.log_pdf(mode + right) <= floor {
                break;
            }
            right *= 2.0;
        }
        (mode - left, mode + right)
    }
}

fn simpson_panel(fa: f64, fm: f64, fb: f64, width: f64) -> f64 {
    width / 6.0 * (fa + 4.0 * fm + fb)
}

/// Adaptive Simpson quadrature with Richardson correction.
pub(crate) fn adaptive_simpson<F: Fn(f64) -> f64>(f: &F, a: f64, b: f64, tol: f64) -> f64 {
    if !(b > a) {
        return 0.0;
    }
    let m = 0.5 * (a + b);
    let fa = f(a);
    let fm = f(m);
    let fb = f(b);
    let whole = simpson_panel(fa, fm, fb, b - a);
    simpson_recurse(f, a, m, b, fa, fm, fb, whole, tol, 52)
}

#[allow(clippy::too_many_arguments)]
fn simpson_recurse<F: Fn(f64) -> f64>(
    f: &F,
    a: f64,
    m: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
    tol: f64,
    depth: u32,
) -> f64 {
    let lm = 0.5 * (a + m);
    let rm = 0.5 * (m + b);
    let flm = f(lm);
    let frm = f(rm);
    let left = simpson_panel(fa, flm, fm, m - a);
    let right = simpson_panel(fm, frm, fb, b - m);
    let correction = left + right - whole;
    if depth == 0 || correction.abs() <= 15.0 * tol {
        left + right + correction / 15.0
    } else {
        simpson_recurse(f, a, lm, m, fa, flm, fm, left, 0.5 * tol, depth - 1)
            + simpson_recurse(f, m, rm, b, fm, frm, fb, right, 0.5 * tol, depth - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dist(alpha: f64, beta: f64, delta: f64, loc: f64) -> Hyperbolic {
        Hyperbolic::new(HyperbolicParameters::new(alpha, beta, delta, loc)).unwrap()
    }

    #[test]
    fn test_infeasible_parameters_rejected() {
        assert!(Hyperbolic::new(HyperbolicParameters::new(1.0, 1.5, 1.0, 0.0)).is_err());
        assert!(Hyperbolic::new(HyperbolicParameters::new(1.0, -1.0, 1.0, 0.0)).is_err());
        assert!(Hyperbolic::new(HyperbolicParameters::new(1.0, 0.0, 0.0, 0.0)).is_err());
        assert!(Hyperbolic::new(HyperbolicParameters::new(f64::NAN, 0.0, 1.0, 0.0)).is_err());
    }

    #[test]
    fn test_density_normalizes_to_one() {
        let d = dist(2.0, 0.5, 1.0, 0.1);
        let (lo, hi) = d.support;
        let mass = adaptive_simpson(&|x| d.pdf(x), lo, d.mode(), 1e-10)
            + adaptive_simpson(&|x| d.pdf(x), d.mode(), hi, 1e-10);
        assert!((mass - 1.0).abs() < 1e-6, "total mass {mass}");
    }

    #[test]
    fn test_cdf_monotone_and_bounded() {
        let d = dist(3.0, -1.0, 0.5, 0.0);
        let mut previous = 0.0;
        for i in -20..=20 {
            let x = i as f64 * 0.25;
            let c = d.cdf(x);
            assert!((0.0..=1.0).contains(&c));
            assert!(c >= previous, "cdf not monotone at {x}");
            previous = c;
        }
        assert!(d.cdf(-100.0) == 0.0);
        assert!(d.cdf(100.0) == 1.0);
    }

    #[test]
    fn test_symmetric_distribution_centered_on_loc() {
        let d = dist(2.0, 0.0, 1.0, 0.3);
        assert!((d.mean() - 0.3).abs() < 1e-10);
        assert!((d.cdf(0.3) - 0.5).abs() < 1e-6);
        assert!(d.excess_kurtosis() > 0.0);
    }

    #[test]
    fn test_analytic_mean_matches_quadrature() {
        let d = dist(2.5, 0.8, 1.2, -0.2);
        let (lo, hi) = d.support;
        let quadrature_mean = adaptive_simpson(&|x| x * d.pdf(x), lo, d.mode(), 1e-11)
            + adaptive_simpson(&|x| x * d.pdf(x), d.mode(), hi, 1e-11);
        assert!(
            (d.mean() - quadrature_mean).abs() < 1e-6,
            "analytic {} vs quadrature {}",
            d.mean(),
            quadrature_mean
        );
    }

    #[test]
    fn test_analytic_kurtosis_matches_quadrature() {
        let d = dist(2.0, 0.6, 1.0, 0.0);
        let (lo, hi) = d.support;
        let mean = d.mean();
        let moment = |p: i32| {
            adaptive_simpson(&|x| (x - mean).powi(p) * d.pdf(x), lo, d.mode(), 1e-12)
                + adaptive_simpson(&|x| (x - mean).powi(p) * d.pdf(x), d.mode(), hi, 1e-12)
        };
        let mu2 = moment(2);
        let mu4 = moment(4);
        let quadrature_kurtosis = mu4 / (mu2 * mu2) - 3.0;
        let analytic = d.excess_kurtosis();
        assert!(
            (analytic - quadrature_kurtosis).abs() < 1e-3 * quadrature_kurtosis.abs().max(1.0),
            "analytic {analytic} vs quadrature {quadrature_kurtosis}"
        );
        assert!((d.variance() - mu2).abs() < 1e-6);
    }

    #[test]
    fn test_mean_and_kurtosis_agree_with_individual_moments() {
        let d = dist(4.0, -1.5, 0.8, 0.2);
        let (mean, kurtosis) = d.mean_and_kurtosis();
        assert!((mean - d.mean()).abs() < 1e-12);
        assert!((kurtosis - d.excess_kurtosis()).abs() < 1e-12);
    }

    #[test]
    fn test_sampling_matches_analytic_moments() {
        let d = dist(2.0, 0.5, 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(7);
        let samples = d.sample(20_000, &mut rng);
        assert_eq!(samples.len(), 20_000);

        let empirical_mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!(
            (empirical_mean - d.mean()).abs() < 0.03,
            "sample mean {empirical_mean} vs {}",
            d.mean()
        );

        let x = 0.5;
        let empirical_cdf =
            samples.iter().filter(|&&s| s <= x).count() as f64 / samples.len() as f64;
        assert!(
            (empirical_cdf - d.cdf(x)).abs() < 0.02,
            "empirical cdf {empirical_cdf} vs {}",
            d.cdf(x)
        );
    }

    #[test]
    fn test_sampling_is_deterministic_for_a_seed() {
        let d = dist(2.0, 0.5, 1.0, 0.0);
        let a = d.sample(16, &mut StdRng::seed_from_u64(42));
        let b = d.sample(16, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_skew_shifts_mean_off_location() {
        let positive = dist(2.0, 1.0, 1.0, 0.0);
        let negative = dist(2.0, -1.0, 1.0, 0.0);
        assert!(positive.mean() > 0.0);
        assert!(negative.mean() < 0.0);
        assert!((positive.mean() + negative.mean()).abs() < 1e-10);
    }
}
