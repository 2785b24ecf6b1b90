use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;

use crate::domain::Horizon;

/// Configuration for ensemble generation and aggregation.
///
/// Every instance carries its own copy, so two aggregators can run with
/// different horizon-kurtosis tables side by side.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// A forecast location whose nearest site is closer than this uses that
    /// single site; otherwise the three nearest sites are combined. Same
    /// units as the site catalog's reported distances (meters for the NREL
    /// WTK catalog).
    pub close_site_threshold: f64,
    /// Number of candidate sites combined when none is close enough.
    pub far_site_count: usize,
    /// Decimal places kept in generated per-unit samples.
    pub sample_decimals: u32,
    pub kurtosis: HorizonKurtosis,
    pub fit: FitConfig,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            close_site_threshold: 5_000.0,
            far_site_count: 3,
            sample_decimals: 4,
            kurtosis: HorizonKurtosis::default(),
            fit: FitConfig::default(),
        }
    }
}

/// Default forecast-error kurtosis per horizon.
///
/// Empirically tuned heaviness-of-tail by lead time: short horizons have
/// sharply peaked error distributions, day-ahead errors are near-Gaussian.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HorizonKurtosis {
    pub hour_ahead: f64,
    pub four_hour_ahead: f64,
    pub six_hour_ahead: f64,
    pub day_ahead: f64,
}

impl Default for HorizonKurtosis {
    fn default() -> Self {
        Self {
            hour_ahead: 18.0,
            four_hour_ahead: 14.0,
            six_hour_ahead: 10.0,
            day_ahead: 2.5,
        }
    }
}

impl HorizonKurtosis {
    pub fn for_horizon(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::HourAhead => self.hour_ahead,
            Horizon::FourHourAhead => self.four_hour_ahead,
            Horizon::SixHourAhead => self.six_hour_ahead,
            Horizon::DayAhead => self.day_ahead,
        }
    }
}

/// Distribution-fit objective weights and solver controls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub mean_weight: f64,
    pub percentile_weight: f64,
    pub kurtosis_weight: f64,
    /// Simplex standard-deviation tolerance for declaring convergence.
    pub tol: f64,
    /// Iteration cap per optimization attempt, the only termination control.
    pub max_iter: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            mean_weight: 100.0,
            percentile_weight: 2.0,
            kurtosis_weight: 10.0,
            tol: 1e-9,
            max_iter: 1000,
        }
    }
}

impl EnsembleConfig {
    /// Load configuration from `config/default.toml` overlaid with
    /// `WE__`-prefixed environment variables, e.g.
    /// `WE__KURTOSIS__DAY_AHEAD=3.0`.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("WE__").split("__"));
        Ok(figment.extract()?)
    }
}
