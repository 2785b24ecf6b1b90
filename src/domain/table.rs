use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{EnsembleError, Result};

/// A timestamp-indexed table of named forecast columns, as returned by the
/// forecast provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTable {
    index: Vec<DateTime<Utc>>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl ForecastTable {
    pub fn new(
        index: Vec<DateTime<Utc>>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if values.nrows() != index.len() || values.ncols() != columns.len() {
            return Err(EnsembleError::Shape(format!(
                "values of shape ({}, {}) do not match {} timestamps x {} columns",
                values.nrows(),
                values.ncols(),
                index.len(),
                columns.len()
            )));
        }
        Ok(Self { index, columns, values })
    }

    /// Convenience constructor from (name, values) column pairs sharing one
    /// timestamp index.
    pub fn from_columns(
        index: Vec<DateTime<Utc>>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self> {
        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let mut values = Array2::zeros((index.len(), columns.len()));
        for (j, (name, column)) in columns.iter().enumerate() {
            if column.len() != index.len() {
                return Err(EnsembleError::Shape(format!(
                    "column {name} has {} values for {} timestamps",
                    column.len(),
                    index.len()
                )));
            }
            for (i, value) in column.iter().enumerate() {
                values[(i, j)] = *value;
            }
        }
        Self::new(index, names, values)
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let j = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(j))
    }

    /// Normalize raw power to per-unit output by nameplate capacity.
    pub fn to_per_unit(&self, capacity: f64) -> Result<Self> {
        if !(capacity > 0.0) {
            return Err(EnsembleError::Shape(format!(
                "nameplate capacity must be positive, got {capacity}"
            )));
        }
        Ok(Self {
            index: self.index.clone(),
            columns: self.columns.clone(),
            values: &self.values / capacity,
        })
    }
}

/// One row of forecast input: a point estimate with its percentile error
/// bounds. `p10 <= mean <= p90` is expected but not enforced; inconsistent
/// bounds still get a best-effort fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub mean: f64,
    /// 10th-percentile value.
    pub p10: f64,
    /// 90th-percentile value.
    pub p90: f64,
}

/// A generated ensemble: one row per forecast timestep (input order
/// preserved), one column per drawn sample. Immutable once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleTable {
    index: Vec<DateTime<Utc>>,
    samples: Array2<f64>,
}

impl EnsembleTable {
    pub fn new(index: Vec<DateTime<Utc>>, samples: Array2<f64>) -> Result<Self> {
        if samples.nrows() != index.len() {
            return Err(EnsembleError::Shape(format!(
                "{} sample rows for {} timestamps",
                samples.nrows(),
                index.len()
            )));
        }
        Ok(Self { index, samples })
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn samples(&self) -> ArrayView2<'_, f64> {
        self.samples.view()
    }

    /// (rows, samples-per-row)
    pub fn shape(&self) -> (usize, usize) {
        (self.samples.nrows(), self.samples.ncols())
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.samples.row(i)
    }

    /// Combine per-site ensembles into one table by averaging rows that
    /// share a timestamp. Output rows are sorted by timestamp; a timestamp
    /// present in only some tables averages over those tables alone.
    pub fn mean_by_timestamp(tables: &[EnsembleTable]) -> Result<EnsembleTable> {
        let n_samples = match tables.first() {
            Some(table) => table.samples.ncols(),
            None => {
                return Err(EnsembleError::Shape(
                    "cannot aggregate zero ensemble tables".to_string(),
                ))
            }
        };
        if let Some(table) = tables.iter().find(|t| t.samples.ncols() != n_samples) {
            return Err(EnsembleError::Shape(format!(
                "ensemble tables disagree on sample count: {} vs {}",
                n_samples,
                table.samples.ncols()
            )));
        }

        let mut grouped: std::collections::BTreeMap<DateTime<Utc>, (Vec<f64>, usize)> =
            std::collections::BTreeMap::new();
        for table in tables {
            for (i, timestamp) in table.index.iter().enumerate() {
                let (sums, count) = grouped
                    .entry(*timestamp)
                    .or_insert_with(|| (vec![0.0; n_samples], 0));
                for (j, value) in table.samples.row(i).iter().enumerate() {
                    sums[j] += value;
                }
                *count += 1;
            }
        }

        let index: Vec<DateTime<Utc>> = grouped.keys().copied().collect();
        let mut samples = Array2::zeros((index.len(), n_samples));
        for (i, (sums, count)) in grouped.values().enumerate() {
            for (j, sum) in sums.iter().enumerate() {
                samples[(i, j)] = sum / *count as f64;
            }
        }
        EnsembleTable::new(index, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    fn index(n: usize) -> Vec<DateTime<Utc>> {
        (0..n)
            .map(|h| Utc.with_ymd_and_hms(2013, 1, 1, h as u32, 0, 0).unwrap())
            .collect()
    }

    #[test]
    fn test_column_lookup() {
        let table = ForecastTable::from_columns(
            index(2),
            vec![
                ("power".to_string(), vec![0.5, 0.6]),
                ("power_p90".to_string(), vec![0.4, 0.5]),
            ],
        )
        .unwrap();
        let column = table.column("power_p90").unwrap();
        assert_eq!(column.to_vec(), vec![0.4, 0.5]);
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let result = ForecastTable::from_columns(
            index(3),
            vec![("power".to_string(), vec![0.5, 0.6])],
        );
        assert!(matches!(result, Err(EnsembleError::Shape(_))));
    }

    #[test]
    fn test_per_unit_normalization() {
        let table = ForecastTable::from_columns(
            index(2),
            vec![("power".to_string(), vec![8.0, 16.0])],
        )
        .unwrap();
        let per_unit = table.to_per_unit(16.0).unwrap();
        assert_eq!(per_unit.column("power").unwrap().to_vec(), vec![0.5, 1.0]);
        assert!(table.to_per_unit(0.0).is_err());
    }

    #[test]
    fn test_mean_by_timestamp_matching_indexes() {
        let a = EnsembleTable::new(index(2), array![[0.2, 0.4], [0.6, 0.8]]).unwrap();
        let b = EnsembleTable::new(index(2), array![[0.4, 0.6], [0.8, 1.0]]).unwrap();
        let combined = EnsembleTable::mean_by_timestamp(&[a, b]).unwrap();
        assert_eq!(combined.shape(), (2, 2));
        assert_eq!(combined.samples(), array![[0.3, 0.5], [0.7, 0.9]].view());
    }

    #[test]
    fn test_mean_by_timestamp_partial_overlap() {
        let a = EnsembleTable::new(index(2), array![[0.2], [0.4]]).unwrap();
        let b = EnsembleTable::new(index(3), array![[0.4], [0.6], [0.9]]).unwrap();
        let combined = EnsembleTable::mean_by_timestamp(&[a, b]).unwrap();
        assert_eq!(combined.shape(), (3, 1));
        // Third timestamp only exists in the second table.
        assert!((combined.row(2)[0] - 0.9).abs() < 1e-12);
        assert!((combined.row(0)[0] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_mean_by_timestamp_rejects_mismatched_sample_counts() {
        let a = EnsembleTable::new(index(1), array![[0.2, 0.3]]).unwrap();
        let b = EnsembleTable::new(index(1), array![[0.4]]).unwrap();
        assert!(EnsembleTable::mean_by_timestamp(&[a, b]).is_err());
    }
}
