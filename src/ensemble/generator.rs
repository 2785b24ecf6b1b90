//! Per-timestep ensemble generation: fit a forecast-error distribution to
//! each row of a per-unit forecast table and draw samples from it.

use ndarray::Array2;
use rand::Rng;
use tracing::debug;

use crate::config::FitConfig;
use crate::domain::{EnsembleTable, ForecastPoint, ForecastTable};
use crate::error::{EnsembleError, Result};
use crate::stats::DistributionFitter;

/// Column-name markers inherited from the upstream data provider. The
/// convention is inverted relative to what the suffixes suggest: the
/// `_p90`-suffixed column holds the 10th-percentile (lower) value and the
/// `_p10`-suffixed column holds the 90th-percentile (upper) value. This
/// mapping matches the provider's actual column semantics and must not be
/// "fixed" here.
// TODO: verify against the upstream data dictionary before shipping.
const LOWER_BOUND_MARKER: &str = "_p90";
const UPPER_BOUND_MARKER: &str = "_p10";

/// Percentile levels pinned to the two bound columns.
const LOWER_LEVEL: f64 = 0.1;
const UPPER_LEVEL: f64 = 0.9;

/// Generates sample ensembles from point forecasts with percentile bounds.
#[derive(Debug, Clone)]
pub struct EnsembleGenerator {
    fitter: DistributionFitter,
    sample_decimals: u32,
}

impl EnsembleGenerator {
    pub fn new(fit: FitConfig, sample_decimals: u32) -> Self {
        Self { fitter: DistributionFitter::new(fit), sample_decimals }
    }

    /// Generate `n` samples per timestep of a per-unit forecast table.
    ///
    /// The table must resolve to exactly one lower-bound column, one
    /// upper-bound column, and one mean column; anything else fails with
    /// [`EnsembleError::AmbiguousColumns`] before any optimization work
    /// begins. A fit failure on any row aborts the whole call.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        table: &ForecastTable,
        n: usize,
        kurtosis: f64,
        rng: &mut R,
    ) -> Result<EnsembleTable> {
        let rows = resolve_rows(table)?;

        let mut samples = Array2::zeros((rows.len(), n));
        for (i, point) in rows.iter().enumerate() {
            let constraints = [(LOWER_LEVEL, point.p10), (UPPER_LEVEL, point.p90)];
            let fit = self.fitter.fit(point.mean, &constraints, kurtosis, None)?;
            debug!(
                timestamp = %point.timestamp,
                score = fit.score,
                params = ?fit.params,
                "fitted timestep error distribution"
            );
            for (j, draw) in fit.distribution.sample(n, rng).into_iter().enumerate() {
                // Per-unit power cannot leave [0, 1]: out-of-range mass is
                // clamped to the boundary, not resampled.
                samples[(i, j)] = round_to(draw.clamp(0.0, 1.0), self.sample_decimals);
            }
        }

        EnsembleTable::new(table.index().to_vec(), samples)
    }
}

/// Resolve the three usable columns and view the table as forecast points.
fn resolve_rows(table: &ForecastTable) -> Result<Vec<ForecastPoint>> {
    let names = table.column_names();
    let lower_names: Vec<&String> =
        names.iter().filter(|c| c.contains(LOWER_BOUND_MARKER)).collect();
    let upper_names: Vec<&String> =
        names.iter().filter(|c| c.contains(UPPER_BOUND_MARKER)).collect();
    let remaining: Vec<String> = names
        .iter()
        .filter(|c| !c.contains(LOWER_BOUND_MARKER) && !c.contains(UPPER_BOUND_MARKER))
        .cloned()
        .collect();

    if lower_names.len() != 1 || upper_names.len() != 1 || remaining.len() != 1 {
        return Err(EnsembleError::AmbiguousColumns { remaining });
    }

    let lower = table.column(lower_names[0]).expect("column name from table");
    let upper = table.column(upper_names[0]).expect("column name from table");
    let mean = table.column(&remaining[0]).expect("column name from table");

    Ok(table
        .index()
        .iter()
        .enumerate()
        .map(|(i, &timestamp)| ForecastPoint {
            timestamp,
            mean: mean[i],
            p10: lower[i],
            p90: upper[i],
        })
        .collect())
}

fn round_to(x: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (x * scale).round() / scale
}
