//! Contracts for the external collaborators this core consumes: geospatial
//! site lookup, capacity metadata, and meteorological time-series retrieval.
//! The implementations (and any caching or I/O they do) live outside this
//! crate.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::domain::{ForecastTable, GeoPoint, SiteCandidate, SiteId};

/// Site search and metadata lookup.
#[cfg_attr(test, mockall::automock)]
pub trait SiteCatalog {
    /// Candidate sites for a query point, ascending by distance, with at
    /// least three entries when the catalog has them.
    fn nearest_sites(&self, point: &GeoPoint) -> Result<Vec<SiteCandidate>>;

    /// Nameplate capacity of a site, in the same units as the raw power
    /// columns of its forecast series.
    fn site_capacity(&self, site: &SiteId) -> Result<f64>;
}

/// Historical/forecast meteorological time-series retrieval.
#[cfg_attr(test, mockall::automock)]
pub trait ForecastProvider {
    /// Forecast series for a site restricted to `[start, end]` and the named
    /// attribute columns. `utc` selects UTC timestamps over site-local time.
    fn forecast_series(
        &self,
        site: &SiteId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        attributes: &[String],
        utc: bool,
    ) -> Result<ForecastTable>;
}
