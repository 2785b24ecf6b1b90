use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::EnsembleTable;
use crate::error::EnsembleError;

/// Identifier of a wind site in the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(pub String);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SiteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A candidate site returned by the nearest-site search, with its distance
/// from the query point in catalog units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteCandidate {
    pub site_id: SiteId,
    pub distance: f64,
}

/// Geographic forecast location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// WKT rendering, longitude first, as the site catalog expects.
    pub fn to_wkt(self) -> String {
        format!("POINT({} {})", self.longitude, self.latitude)
    }
}

/// Forecast lead time. Only these four horizons exist in the upstream
/// forecast data; anything else is rejected at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    HourAhead,
    FourHourAhead,
    SixHourAhead,
    DayAhead,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [
        Horizon::HourAhead,
        Horizon::FourHourAhead,
        Horizon::SixHourAhead,
        Horizon::DayAhead,
    ];

    pub fn hours(self) -> u32 {
        match self {
            Horizon::HourAhead => 1,
            Horizon::FourHourAhead => 4,
            Horizon::SixHourAhead => 6,
            Horizon::DayAhead => 24,
        }
    }

    fn attribute_prefix(self) -> &'static str {
        match self {
            Horizon::HourAhead => "hour_ahead_power",
            Horizon::FourHourAhead => "4_hour_ahead_power",
            Horizon::SixHourAhead => "6_hour_ahead_power",
            Horizon::DayAhead => "day_ahead_power",
        }
    }

    /// Forecast attribute columns for this horizon: point estimate plus the
    /// two percentile-bound columns, named as the upstream provider names
    /// them.
    pub fn attributes(self) -> [String; 3] {
        let prefix = self.attribute_prefix();
        [
            prefix.to_string(),
            format!("{prefix}_p90"),
            format!("{prefix}_p10"),
        ]
    }
}

impl TryFrom<u32> for Horizon {
    type Error = EnsembleError;

    fn try_from(hours: u32) -> Result<Self, Self::Error> {
        match hours {
            1 => Ok(Horizon::HourAhead),
            4 => Ok(Horizon::FourHourAhead),
            6 => Ok(Horizon::SixHourAhead),
            24 => Ok(Horizon::DayAhead),
            other => Err(EnsembleError::InvalidHorizon(other)),
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.hours())
    }
}

/// One generated ensemble per requested horizon, keyed in ascending lead
/// time.
pub type HorizonEnsemble = BTreeMap<Horizon, EnsembleTable>;
