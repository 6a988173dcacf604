//! Column-oriented time series table.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use gridplan_core::{GridError, GridResult};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;

pub type TimeIndex = Vec<NaiveDateTime>;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time series of several components sharing one time index.
///
/// Every column has exactly `index.len()` values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesFrame {
    pub index: TimeIndex,
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl TimeSeriesFrame {
    pub fn new(index: TimeIndex) -> Self {
        Self {
            index,
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) -> GridResult<()> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(GridError::Validation(format!(
                "Time series {} has {} values but the time index has {} entries.",
                name,
                values.len(),
                self.index.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<f64>> {
        self.columns.remove(name)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.columns.retain(|k, _| keep(k));
    }

    /// Position of `ts` in the index.
    pub fn position(&self, ts: &NaiveDateTime) -> Option<usize> {
        self.index.iter().position(|t| t == ts)
    }

    /// Value of column `name` at row `row`, zero if the column is missing.
    pub fn value(&self, name: &str, row: usize) -> f64 {
        self.columns
            .get(name)
            .and_then(|v| v.get(row))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn row(&self, row: usize) -> BTreeMap<&str, f64> {
        self.columns
            .iter()
            .filter_map(|(k, v)| v.get(row).map(|x| (k.as_str(), *x)))
            .collect()
    }

    pub fn sum_row(&self, row: usize) -> f64 {
        self.columns.values().filter_map(|v| v.get(row)).sum()
    }

    /// Sum over all columns for every row.
    pub fn sum_rows(&self) -> Vec<f64> {
        (0..self.len()).map(|r| self.sum_row(r)).collect()
    }

    /// Maximum of each column.
    pub fn column_max(&self) -> BTreeMap<&str, f64> {
        self.columns
            .iter()
            .map(|(k, v)| (k.as_str(), v.iter().copied().fold(f64::NEG_INFINITY, f64::max)))
            .collect()
    }

    /// Rows for the given time steps, in the given order.
    pub fn select_timesteps(&self, timesteps: &[NaiveDateTime]) -> GridResult<Self> {
        let rows = timesteps
            .iter()
            .map(|ts| {
                self.position(ts).ok_or_else(|| {
                    GridError::Validation(format!("Time step {} is not in the time index.", ts))
                })
            })
            .collect::<GridResult<Vec<usize>>>()?;
        Ok(self.select_rows(&rows))
    }

    pub(crate) fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), rows.iter().map(|&r| v[r]).collect()))
                .collect(),
        }
    }

    /// Align the frame with `index`; rows missing in the frame become zero.
    pub fn reindex(&self, index: &[NaiveDateTime]) -> Self {
        let rows: Vec<Option<usize>> = index.iter().map(|ts| self.position(ts)).collect();
        Self {
            index: index.to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| {
                    let values = rows.iter().map(|r| r.map_or(0.0, |r| v[r])).collect();
                    (k.clone(), values)
                })
                .collect(),
        }
    }

    /// Insert all columns of `other`, which must share the index.
    pub fn merge(&mut self, other: TimeSeriesFrame) -> GridResult<()> {
        if other.index != self.index && !other.columns.is_empty() {
            return Err(GridError::Validation(
                "Cannot merge time series with different time indexes.".to_string(),
            ));
        }
        self.columns.extend(other.columns);
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        for values in self.columns.values_mut() {
            for v in values.iter_mut() {
                *v *= factor;
            }
        }
    }

    pub fn to_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let timestamps: Vec<String> = self
            .index
            .iter()
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .collect();
        let mut series = vec![Series::new("timestamp", timestamps)];
        for (name, values) in &self.columns {
            series.push(Series::new(name, values.clone()));
        }
        let mut df = DataFrame::new(series).context("building time series frame")?;
        let mut file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        CsvWriter::new(&mut file)
            .finish(&mut df)
            .context("writing CSV file")?;
        Ok(())
    }

    /// Read a frame whose first column holds the timestamps.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let df = CsvReader::new(&mut file)
            .has_header(true)
            .finish()
            .context("reading CSV file")?;

        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        let Some((index_name, value_names)) = names.split_first() else {
            return Err(anyhow!("{} has no columns", path.display()));
        };

        let index_series = df
            .column(index_name)?
            .cast(&DataType::Utf8)
            .context("casting timestamp column to Utf8")?;
        let index = index_series
            .utf8()?
            .into_iter()
            .map(|raw| {
                let raw = raw.ok_or_else(|| anyhow!("missing timestamp in {}", path.display()))?;
                parse_timestamp(raw)
            })
            .collect::<Result<TimeIndex>>()?;

        let mut frame = Self::new(index);
        for name in value_names {
            let values = df
                .column(name)?
                .cast(&DataType::Float64)
                .with_context(|| format!("casting column {} to Float64", name))?;
            let values: Vec<f64> = values
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            frame.columns.insert(name.clone(), values);
        }
        Ok(frame)
    }
}

/// Parse `2011-01-01 00:00:00`, `2011-01-01T00:00:00` or `2011-01-01`.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .map_err(anyhow::Error::from)
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(anyhow::Error::from)
                .and_then(|d| d.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("invalid date")))
        })
        .with_context(|| format!("parsing timestamp '{}'", raw))
}

/// `periods` time steps starting at `start` spaced by `step`.
pub fn date_range(start: NaiveDateTime, periods: usize, step: chrono::Duration) -> TimeIndex {
    (0..periods as i32).map(|i| start + step * i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn index(n: usize) -> TimeIndex {
        let start = parse_timestamp("2011-01-01 00:00:00").unwrap();
        date_range(start, n, Duration::hours(1))
    }

    #[test]
    fn insert_checks_length() {
        let mut frame = TimeSeriesFrame::new(index(3));
        assert!(frame.insert("a", vec![1.0, 2.0]).is_err());
        frame.insert("a", vec![1.0, 2.0, 3.0]).unwrap();
        frame.insert("b", vec![0.5, 0.5, 0.5]).unwrap();
        assert_eq!(frame.sum_rows(), vec![1.5, 2.5, 3.5]);
        assert_eq!(frame.value("missing", 0), 0.0);
    }

    #[test]
    fn reindex_fills_zero() {
        let mut frame = TimeSeriesFrame::new(index(2));
        frame.insert("a", vec![1.0, 2.0]).unwrap();
        let longer = index(4);
        let re = frame.reindex(&longer);
        assert_eq!(re.column("a").unwrap(), &[1.0, 2.0, 0.0, 0.0]);

        let sel = re.select_timesteps(&[longer[1], longer[0]]).unwrap();
        assert_eq!(sel.column("a").unwrap(), &[2.0, 1.0]);
        assert!(frame.select_timesteps(&[longer[3]]).is_err());
    }

    #[test]
    fn csv_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loads_active_power.csv");
        let mut frame = TimeSeriesFrame::new(index(3));
        frame.insert("Load_1", vec![0.1, 0.25, 0.5]).unwrap();
        frame.insert("Load_2", vec![1.0, 0.0, -1.0]).unwrap();
        frame.to_csv(&path).unwrap();

        let read = TimeSeriesFrame::from_csv(&path).unwrap();
        assert_eq!(read.index, frame.index);
        for (name, values) in &frame.columns {
            let got = read.column(name).unwrap();
            for (a, b) in values.iter().zip(got) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn timestamp_formats() {
        assert!(parse_timestamp("2011-01-01T12:00:00").is_ok());
        assert!(parse_timestamp("2011-01-01").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
