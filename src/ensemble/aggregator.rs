//! Horizon-indexed ensemble forecasts for a geographic location, aggregated
//! over the nearby sites resolved from the external catalog.

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use crate::config::EnsembleConfig;
use crate::domain::{EnsembleTable, GeoPoint, Horizon, HorizonEnsemble, SiteCandidate};
use crate::ensemble::EnsembleGenerator;
use crate::error::{EnsembleError, Result};
use crate::provider::{ForecastProvider, SiteCatalog};

/// How per-site ensembles are combined into one table per horizon.
///
/// The default is an unweighted row-wise mean even though site distances
/// are available, a known simplification. Swapping in inverse-distance
/// weighting only needs another implementation of this trait.
pub trait AggregationPolicy {
    fn combine(&self, ensembles: &[EnsembleTable]) -> Result<EnsembleTable>;
}

/// Unweighted mean across sites, grouped by timestamp.
pub struct MeanAggregation;

impl AggregationPolicy for MeanAggregation {
    fn combine(&self, ensembles: &[EnsembleTable]) -> Result<EnsembleTable> {
        EnsembleTable::mean_by_timestamp(ensembles)
    }
}

/// Produces ensemble forecasts for a location across the requested
/// horizons.
pub struct SiteEnsembleAggregator {
    location: GeoPoint,
    horizons: Vec<Horizon>,
    config: EnsembleConfig,
    generator: EnsembleGenerator,
    catalog: Box<dyn SiteCatalog>,
    provider: Box<dyn ForecastProvider>,
    policy: Box<dyn AggregationPolicy>,
}

impl SiteEnsembleAggregator {
    /// Build an aggregator for `location` over `horizon_hours`.
    ///
    /// Horizons are validated here: any value outside {1, 4, 6, 24} fails
    /// immediately with [`EnsembleError::InvalidHorizon`] rather than
    /// surfacing later during data retrieval.
    pub fn new(
        location: GeoPoint,
        horizon_hours: &[u32],
        config: EnsembleConfig,
        catalog: Box<dyn SiteCatalog>,
        provider: Box<dyn ForecastProvider>,
    ) -> Result<Self> {
        let horizons = horizon_hours
            .iter()
            .map(|&hours| Horizon::try_from(hours))
            .collect::<Result<Vec<Horizon>>>()?;
        let generator = EnsembleGenerator::new(config.fit.clone(), config.sample_decimals);
        Ok(Self {
            location,
            horizons,
            config,
            generator,
            catalog,
            provider,
            policy: Box::new(MeanAggregation),
        })
    }

    /// Replace the site-combination policy.
    pub fn with_policy(mut self, policy: Box<dyn AggregationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Generate one ensemble per configured horizon over `[start, end]`,
    /// with `n` samples per timestep.
    pub fn forecast_ensemble<R: Rng + ?Sized>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        n: usize,
        rng: &mut R,
    ) -> Result<HorizonEnsemble> {
        let sites = self.candidate_sites()?;
        info!(
            location = %self.location.to_wkt(),
            sites = sites.len(),
            horizons = self.horizons.len(),
            "generating ensemble forecast"
        );

        let mut result = HorizonEnsemble::new();
        for &horizon in &self.horizons {
            let kurtosis = self.config.kurtosis.for_horizon(horizon);
            let attributes = horizon.attributes();
            let mut per_site = Vec::with_capacity(sites.len());
            for candidate in &sites {
                let series = self.provider.forecast_series(
                    &candidate.site_id,
                    start,
                    end,
                    &attributes,
                    true,
                )?;
                let capacity = self.catalog.site_capacity(&candidate.site_id)?;
                let per_unit = series.to_per_unit(capacity)?;
                debug!(
                    site = %candidate.site_id,
                    %horizon,
                    rows = per_unit.n_rows(),
                    capacity,
                    "generating per-site ensemble"
                );
                per_site.push(self.generator.generate(&per_unit, n, kurtosis, rng)?);
            }
            result.insert(horizon, self.policy.combine(&per_site)?);
        }
        Ok(result)
    }

    /// One close site, or the nearest few when nothing is close enough.
    fn candidate_sites(&self) -> Result<Vec<SiteCandidate>> {
        let candidates = self.catalog.nearest_sites(&self.location)?;
        let nearest = candidates.first().ok_or_else(|| {
            EnsembleError::Collaborator(anyhow::anyhow!(
                "site catalog returned no candidates for {}",
                self.location.to_wkt()
            ))
        })?;
        if nearest.distance < self.config.close_site_threshold {
            Ok(vec![nearest.clone()])
        } else {
            Ok(candidates
                .into_iter()
                .take(self.config.far_site_count)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ForecastTable, SiteId};
    use crate::provider::{MockForecastProvider, MockSiteCatalog};
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn location() -> GeoPoint {
        GeoPoint::new(-105.2, 39.7)
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2013, 1, 1, 2, 0, 0).unwrap(),
        )
    }

    /// One-row forecast series in raw power for a 16 MW site.
    fn raw_series(attributes: &[String]) -> ForecastTable {
        let index = vec![Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap()];
        ForecastTable::from_columns(
            index,
            vec![
                (attributes[0].clone(), vec![8.0]),
                (attributes[1].clone(), vec![6.4]),
                (attributes[2].clone(), vec![9.6]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_horizon_rejected_at_construction() {
        let err = SiteEnsembleAggregator::new(
            location(),
            &[1, 2],
            EnsembleConfig::default(),
            Box::new(MockSiteCatalog::new()),
            Box::new(MockForecastProvider::new()),
        )
        .err()
        .expect("horizon 2 must be rejected");
        assert!(matches!(err, EnsembleError::InvalidHorizon(2)));
    }

    #[test]
    fn test_close_site_short_circuits_to_single_site() {
        let mut catalog = MockSiteCatalog::new();
        catalog.expect_nearest_sites().times(1).returning(|_| {
            Ok(vec![
                SiteCandidate { site_id: SiteId::from("42"), distance: 100.0 },
                SiteCandidate { site_id: SiteId::from("43"), distance: 9_000.0 },
                SiteCandidate { site_id: SiteId::from("44"), distance: 12_000.0 },
            ])
        });
        catalog
            .expect_site_capacity()
            .times(1)
            .returning(|_| Ok(16.0));

        let mut provider = MockForecastProvider::new();
        provider
            .expect_forecast_series()
            .withf(|site, _, _, attributes, utc| {
                site == &SiteId::from("42")
                    && attributes[0] == "day_ahead_power"
                    && *utc
            })
            .times(1)
            .returning(|_, _, _, attributes, _| Ok(raw_series(attributes)));

        let aggregator = SiteEnsembleAggregator::new(
            location(),
            &[24],
            EnsembleConfig::default(),
            Box::new(catalog),
            Box::new(provider),
        )
        .unwrap();

        let (start, end) = window();
        let result = aggregator
            .forecast_ensemble(start, end, 5, &mut StdRng::seed_from_u64(3))
            .unwrap();
        let table = &result[&Horizon::DayAhead];
        assert_eq!(table.shape(), (1, 5));
        for &value in table.samples().iter() {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_far_location_combines_three_sites() {
        let mut catalog = MockSiteCatalog::new();
        catalog.expect_nearest_sites().times(1).returning(|_| {
            Ok(vec![
                SiteCandidate { site_id: SiteId::from("1"), distance: 20_000.0 },
                SiteCandidate { site_id: SiteId::from("2"), distance: 25_000.0 },
                SiteCandidate { site_id: SiteId::from("3"), distance: 30_000.0 },
                SiteCandidate { site_id: SiteId::from("4"), distance: 40_000.0 },
            ])
        });
        catalog
            .expect_site_capacity()
            .times(3)
            .returning(|_| Ok(16.0));

        let mut provider = MockForecastProvider::new();
        provider
            .expect_forecast_series()
            .times(3)
            .returning(|_, _, _, attributes, _| Ok(raw_series(attributes)));

        let aggregator = SiteEnsembleAggregator::new(
            location(),
            &[24],
            EnsembleConfig::default(),
            Box::new(catalog),
            Box::new(provider),
        )
        .unwrap();

        let (start, end) = window();
        let result = aggregator
            .forecast_ensemble(start, end, 4, &mut StdRng::seed_from_u64(4))
            .unwrap();
        assert_eq!(result[&Horizon::DayAhead].shape(), (1, 4));
    }

    #[test]
    fn test_catalog_failure_propagates() {
        let mut catalog = MockSiteCatalog::new();
        catalog
            .expect_nearest_sites()
            .returning(|_| Err(anyhow::anyhow!("catalog unreachable")));

        let aggregator = SiteEnsembleAggregator::new(
            location(),
            &[24],
            EnsembleConfig::default(),
            Box::new(catalog),
            Box::new(MockForecastProvider::new()),
        )
        .unwrap();

        let (start, end) = window();
        let err = aggregator
            .forecast_ensemble(start, end, 5, &mut StdRng::seed_from_u64(5))
            .unwrap_err();
        assert!(matches!(err, EnsembleError::Collaborator(_)));
    }

    #[test]
    fn test_empty_catalog_is_an_error() {
        let mut catalog = MockSiteCatalog::new();
        catalog.expect_nearest_sites().returning(|_| Ok(vec![]));

        let aggregator = SiteEnsembleAggregator::new(
            location(),
            &[24],
            EnsembleConfig::default(),
            Box::new(catalog),
            Box::new(MockForecastProvider::new()),
        )
        .unwrap();

        let (start, end) = window();
        assert!(aggregator
            .forecast_ensemble(start, end, 5, &mut StdRng::seed_from_u64(6))
            .is_err());
    }
}
