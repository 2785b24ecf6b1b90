//! Multi-start constrained fitting of a hyperbolic distribution to a mean,
//! a set of percentile constraints, and a kurtosis target.
//!
//! The objective is non-convex, so a single local search is unreliable: the
//! fitter sweeps a Cartesian grid of starting points spanning several orders
//! of magnitude, runs an independent Nelder-Mead search from each, and keeps
//! the lowest-scoring converged attempt. Family feasibility
//! (`alpha - |beta| >= eps`, `delta >= eps`, `loc` within the per-unit power
//! domain) is enforced through a graded penalty plateau, with starting
//! simplexes projected into the feasible region.

use argmin::core::{CostFunction, Error as SolverError, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use itertools::iproduct;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::config::FitConfig;
use crate::error::{EnsembleError, Result};
use crate::stats::hyperbolic::{Hyperbolic, HyperbolicParameters};

/// Minimum slack required of `alpha - |beta|` and of `delta`.
const FEASIBILITY_MARGIN: f64 = 1e-9;
/// Base score for infeasible parameter vectors, far above any attainable
/// feasible score so the simplex is pushed back into the feasible region.
const INFEASIBLE_PENALTY: f64 = 1e8;
/// Location bounds: forecast error is expressed in per-unit power.
const LOC_BOUNDS: (f64, f64) = (-1.0, 1.0);

/// One optimization attempt from one starting point, kept for diagnostic
/// replay of the multi-start search.
#[derive(Debug, Clone)]
pub struct FitAttempt {
    pub start: [f64; 4],
    pub converged: bool,
    pub score: Option<f64>,
    pub params: Option<[f64; 4]>,
    pub iterations: u64,
    pub message: String,
}

/// The outcome of a successful fit: best parameters, the frozen
/// distribution, its objective score, and the full attempt log.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub params: HyperbolicParameters,
    pub distribution: Hyperbolic,
    pub score: f64,
    pub attempts: Vec<FitAttempt>,
}

/// Fits hyperbolic distributions to moment and percentile constraints.
#[derive(Debug, Clone, Default)]
pub struct DistributionFitter {
    config: FitConfig,
}

impl DistributionFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Fit a distribution matching `mean`, the `(level, value)` percentile
    /// constraints, and the `kurtosis` target.
    ///
    /// With an explicit `start`, a single search runs from that point and
    /// must converge. Otherwise the full starting grid is swept and the
    /// lowest-scoring converged attempt wins. Either way a fit that
    /// converges nowhere is an error, never a silently substituted default.
    pub fn fit(
        &self,
        mean: f64,
        percentiles: &[(f64, f64)],
        kurtosis: f64,
        start: Option<[f64; 4]>,
    ) -> Result<FitResult> {
        let problem = FitProblem {
            mean,
            percentiles: percentiles.to_vec(),
            kurtosis,
            config: self.config.clone(),
        };

        let mut attempts = Vec::new();
        match start {
            Some(x0) => attempts.push(self.run_attempt(&problem, x0)),
            None => {
                for x0 in start_grid() {
                    // Cheap pre-filter: skip starts outside the family's
                    // feasible cone before paying for a solver run.
                    if x0[1].abs() > x0[0] {
                        continue;
                    }
                    let attempt = self.run_attempt(&problem, x0);
                    debug!(
                        start = ?attempt.start,
                        converged = attempt.converged,
                        score = attempt.score,
                        iterations = attempt.iterations,
                        "fit attempt finished"
                    );
                    attempts.push(attempt);
                }
            }
        }

        let best = attempts
            .iter()
            .filter(|a| a.converged)
            .filter_map(|a| match (a.score, a.params) {
                (Some(score), Some(params)) => Some((OrderedFloat(score), params)),
                _ => None,
            })
            .min_by_key(|(score, _)| *score);

        match best {
            Some((score, x)) => {
                let params = HyperbolicParameters::from_array(x);
                let distribution = Hyperbolic::new(params)?;
                Ok(FitResult { params, distribution, score: score.0, attempts })
            }
            None => {
                let message = attempts
                    .last()
                    .map(|a| a.message.clone())
                    .unwrap_or_else(|| "no feasible starting points".to_string());
                Err(EnsembleError::FitFailure(message))
            }
        }
    }

    fn run_attempt(&self, problem: &FitProblem, x0: [f64; 4]) -> FitAttempt {
        let failed = |message: String| FitAttempt {
            start: x0,
            converged: false,
            score: None,
            params: None,
            iterations: 0,
            message,
        };

        let solver = match NelderMead::new(initial_simplex(x0)).with_sd_tolerance(self.config.tol)
        {
            Ok(solver) => solver,
            Err(err) => return failed(err.to_string()),
        };
        let outcome = Executor::new(problem.clone(), solver)
            .configure(|state| state.max_iters(self.config.max_iter))
            .run();

        match outcome {
            Ok(result) => {
                let state = result.state();
                let converged = matches!(
                    state.get_termination_reason(),
                    Some(TerminationReason::SolverConverged)
                );
                let message = state
                    .get_termination_reason()
                    .map(|reason| format!("{reason:?}"))
                    .unwrap_or_else(|| "not terminated".to_string());
                FitAttempt {
                    start: x0,
                    converged,
                    score: Some(state.get_best_cost()),
                    params: state
                        .get_best_param()
                        .map(|p| [p[0], p[1], p[2], p[3]]),
                    iterations: state.get_iter(),
                    message,
                }
            }
            Err(err) => failed(err.to_string()),
        }
    }
}

/// The fit objective. Scores are a weighted, squared, offset-by-one penalty
/// sum, so even a perfect fit keeps a smooth non-zero floor that holds the
/// simplex away from degenerate zero-score regions.
#[derive(Debug, Clone)]
struct FitProblem {
    mean: f64,
    percentiles: Vec<(f64, f64)>,
    kurtosis: f64,
    config: FitConfig,
}

impl CostFunction for FitProblem {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<f64, SolverError> {
        let point = [x[0], x[1], x[2], x[3]];
        let gap = feasibility_gap(point);
        if gap > 0.0 {
            return Ok(INFEASIBLE_PENALTY * (1.0 + gap * gap));
        }
        let distribution = match Hyperbolic::new(HyperbolicParameters::from_array(point)) {
            Ok(distribution) => distribution,
            Err(_) => return Ok(INFEASIBLE_PENALTY),
        };

        // Maximum, not sum, over the percentile constraints: the optimizer
        // must not satisfy one tail at the expense of the other.
        let percentile_term = self
            .percentiles
            .iter()
            .map(|&(level, value)| {
                100.0 * (distribution.cdf(value) - level).powi(2) * self.config.percentile_weight
            })
            .fold(0.0_f64, f64::max);

        let (mean_dist, kurtosis_dist) = distribution.mean_and_kurtosis();
        let kurtosis_term = (1.0 + (self.kurtosis - kurtosis_dist).abs() / self.kurtosis).powi(2)
            * self.config.kurtosis_weight;
        let mean_term =
            (1.0 + (self.mean - mean_dist).abs()).powi(2) * self.config.mean_weight;

        let score = percentile_term + kurtosis_term + mean_term;
        Ok(if score.is_finite() { score } else { INFEASIBLE_PENALTY })
    }
}

/// Total constraint violation of a parameter vector; zero when feasible.
fn feasibility_gap(x: [f64; 4]) -> f64 {
    let [alpha, beta, delta, loc] = x;
    let mut gap = 0.0;
    gap += (FEASIBILITY_MARGIN - (alpha - beta.abs())).max(0.0);
    gap += (FEASIBILITY_MARGIN - alpha).max(0.0);
    gap += (FEASIBILITY_MARGIN - delta).max(0.0);
    gap += (loc - LOC_BOUNDS.1).max(0.0);
    gap += (LOC_BOUNDS.0 - loc).max(0.0);
    gap
}

/// Nudge a vertex into the feasible region.
fn project_feasible(mut x: [f64; 4]) -> Vec<f64> {
    x[0] = x[0].max(FEASIBILITY_MARGIN);
    x[2] = x[2].max(FEASIBILITY_MARGIN);
    x[3] = x[3].clamp(LOC_BOUNDS.0, LOC_BOUNDS.1);
    if x[0] - x[1].abs() < FEASIBILITY_MARGIN {
        x[0] = x[1].abs() + FEASIBILITY_MARGIN;
    }
    x.to_vec()
}

/// Initial simplex around a starting point: the point itself plus one
/// perturbed vertex per coordinate, stepped toward the feasible interior so
/// no vertex collapses onto the start after projection.
fn initial_simplex(x0: [f64; 4]) -> Vec<Vec<f64>> {
    let mut vertices = vec![project_feasible(x0)];
    for i in 0..4 {
        let mut vertex = x0;
        let step = 0.25 * vertex[i].abs().max(0.4);
        // loc steps down from its upper bound instead of through it.
        if i == 3 && vertex[i] + step > LOC_BOUNDS.1 {
            vertex[i] -= step;
        } else {
            vertex[i] += step;
        }
        vertices.push(project_feasible(vertex));
    }
    vertices
}

fn logspace(lo_exp: f64, hi_exp: f64, n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![10f64.powf(lo_exp)];
    }
    (0..n)
        .map(|i| 10f64.powf(lo_exp + (hi_exp - lo_exp) * i as f64 / (n - 1) as f64))
        .collect()
}

/// Lazy Cartesian grid of starting points: log-spaced `alpha` and `delta`
/// spanning eleven orders of magnitude, mirrored log-spaced `beta`, and
/// `loc` at both ends of the per-unit range.
fn start_grid() -> impl Iterator<Item = [f64; 4]> {
    let alphas = logspace(-9.0, 2.0, 3);
    let mut betas: Vec<f64> = logspace(-2.0, 2.0, 2).iter().map(|b| -b).collect();
    betas.extend(logspace(-2.0, 2.0, 2));
    let deltas = logspace(-9.0, 2.0, 3);
    let locs = vec![0.0, 1.0];
    iproduct!(alphas, betas, deltas, locs).map(|(alpha, beta, delta, loc)| [alpha, beta, delta, loc])
}
