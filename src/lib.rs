//! Probabilistic wind-power ensemble forecasting.
//!
//! Given a point forecast with 10th/90th-percentile error bounds, this
//! crate fits a generalized hyperbolic error distribution (lambda = 1) per
//! timestep, matching the mean, both percentile constraints, and a
//! horizon-dependent kurtosis target through multi-start constrained
//! optimization. Per-unit sample ensembles drawn from the fits are
//! aggregated across the sites nearest the forecast location.
//!
//! Geospatial site search, meteorological data retrieval, and capacity
//! metadata live behind the [`provider`] traits; this crate owns only the
//! fitting, sampling, and aggregation pipeline.

pub mod config;
pub mod domain;
pub mod ensemble;
pub mod error;
pub mod provider;
pub mod stats;
pub mod telemetry;

pub use config::{EnsembleConfig, FitConfig, HorizonKurtosis};
pub use domain::{
    EnsembleTable, ForecastPoint, ForecastTable, GeoPoint, Horizon, HorizonEnsemble,
    SiteCandidate, SiteId,
};
pub use ensemble::{AggregationPolicy, EnsembleGenerator, MeanAggregation, SiteEnsembleAggregator};
pub use error::{EnsembleError, Result};
pub use stats::{DistributionFitter, FitAttempt, FitResult, Hyperbolic, HyperbolicParameters};
