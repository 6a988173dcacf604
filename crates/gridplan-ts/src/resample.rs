use crate::frame::{TimeIndex, TimeSeriesFrame};
use chrono::Duration;
use gridplan_core::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Up-sampling method. Down-sampling always averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    /// Repeat the last known value
    #[default]
    Ffill,
    /// Linear interpolation between known values
    Interpolate,
}

impl FromStr for ResampleMethod {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffill" => Ok(ResampleMethod::Ffill),
            "interpolate" => Ok(ResampleMethod::Interpolate),
            other => Err(GridError::Validation(format!(
                "unsupported resampling method '{}'; use ffill or interpolate",
                other
            ))),
        }
    }
}

/// Parse frequencies like `15min`, `15T`, `1h`, `H`, `30s` or `1D`.
pub fn parse_frequency(freq: &str) -> GridResult<Duration> {
    let freq = freq.trim();
    let split = freq
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(freq.len());
    let (digits, unit) = freq.split_at(split);
    let amount: i64 = if digits.is_empty() {
        1
    } else {
        digits
            .parse()
            .map_err(|_| GridError::Validation(format!("invalid frequency '{}'", freq)))?
    };
    let duration = match unit {
        "s" | "S" => Duration::seconds(amount),
        "min" | "T" | "m" => Duration::minutes(amount),
        "h" | "H" => Duration::hours(amount),
        "d" | "D" => Duration::days(amount),
        _ => {
            return Err(GridError::Validation(format!(
                "invalid frequency '{}'; use e.g. 15min, 1h or 1D",
                freq
            )))
        }
    };
    if amount <= 0 {
        return Err(GridError::Validation("frequency must be positive".to_string()));
    }
    Ok(duration)
}

/// Spacing of the first two time steps.
pub fn infer_frequency(index: &[chrono::NaiveDateTime]) -> Option<Duration> {
    match index {
        [a, b, ..] => Some(*b - *a),
        _ => None,
    }
}

/// Resample every column of `frame` to `freq`.
///
/// When up-sampling, the new index is extended so that the last original
/// period is fully covered (hourly data resampled to 15 minutes ends at
/// hh:45 of the last hour).
pub fn resample_frame(
    frame: &TimeSeriesFrame,
    freq: Duration,
    method: ResampleMethod,
) -> GridResult<TimeSeriesFrame> {
    let old = infer_frequency(&frame.index).ok_or_else(|| {
        GridError::Validation(
            "Cannot resample time series with less than two time steps.".to_string(),
        )
    })?;
    if freq == old {
        return Ok(frame.clone());
    }
    if freq < old {
        Ok(upsample(frame, old, freq, method))
    } else {
        Ok(downsample(frame, freq))
    }
}

fn upsample(
    frame: &TimeSeriesFrame,
    old: Duration,
    freq: Duration,
    method: ResampleMethod,
) -> TimeSeriesFrame {
    let start = frame.index[0];
    let end = frame.index[frame.index.len() - 1] + old - freq;
    let mut index: TimeIndex = Vec::new();
    let mut t = start;
    while t <= end {
        index.push(t);
        t += freq;
    }

    // position of the last original time step at or before each new step
    let mut anchors = Vec::with_capacity(index.len());
    let mut i = 0;
    for t in &index {
        while i + 1 < frame.index.len() && frame.index[i + 1] <= *t {
            i += 1;
        }
        anchors.push(i);
    }

    let mut out = TimeSeriesFrame::new(index.clone());
    for (name, values) in &frame.columns {
        let resampled = index
            .iter()
            .zip(&anchors)
            .map(|(t, &i)| match method {
                ResampleMethod::Ffill => values[i],
                ResampleMethod::Interpolate if i + 1 < values.len() => {
                    let span = (frame.index[i + 1] - frame.index[i]).num_seconds() as f64;
                    let share = (*t - frame.index[i]).num_seconds() as f64 / span;
                    values[i] + (values[i + 1] - values[i]) * share
                }
                ResampleMethod::Interpolate => values[i],
            })
            .collect();
        out.columns.insert(name.clone(), resampled);
    }
    out
}

#[derive(Default)]
struct BucketStats {
    sum: f64,
    count: usize,
}

fn downsample(frame: &TimeSeriesFrame, freq: Duration) -> TimeSeriesFrame {
    let start = frame.index[0];
    let period = freq.num_seconds();
    let buckets: Vec<i64> = frame
        .index
        .iter()
        .map(|t| (*t - start).num_seconds().div_euclid(period))
        .collect();
    let mut keys: Vec<i64> = buckets.clone();
    keys.dedup();
    let index = keys
        .iter()
        .map(|k| start + Duration::seconds(k * period))
        .collect();

    let mut out = TimeSeriesFrame::new(index);
    for (name, values) in &frame.columns {
        let mut stats: BTreeMap<i64, BucketStats> = BTreeMap::new();
        for (bucket, value) in buckets.iter().zip(values) {
            let entry = stats.entry(*bucket).or_default();
            entry.sum += value;
            entry.count += 1;
        }
        let means = stats
            .values()
            .map(|s| s.sum / s.count as f64)
            .collect();
        out.columns.insert(name.clone(), means);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{date_range, parse_timestamp};

    fn hourly(values: &[f64]) -> TimeSeriesFrame {
        let start = parse_timestamp("2011-01-01 00:00:00").unwrap();
        let mut frame = TimeSeriesFrame::new(date_range(start, values.len(), Duration::hours(1)));
        frame.insert("a", values.to_vec()).unwrap();
        frame
    }

    #[test]
    fn frequency_parsing() {
        assert_eq!(parse_frequency("15min").unwrap(), Duration::minutes(15));
        assert_eq!(parse_frequency("H").unwrap(), Duration::hours(1));
        assert_eq!(parse_frequency("2h").unwrap(), Duration::hours(2));
        assert!(parse_frequency("3 weeks").is_err());
        assert!("linear".parse::<ResampleMethod>().is_err());
    }

    #[test]
    fn upsample_ffill_covers_last_period() {
        let frame = hourly(&[1.0, 2.0]);
        let out = resample_frame(&frame, Duration::minutes(15), ResampleMethod::Ffill).unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out.column("a").unwrap(), &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
        assert_eq!(
            out.index[7],
            parse_timestamp("2011-01-01 01:45:00").unwrap()
        );
    }

    #[test]
    fn upsample_interpolate() {
        let frame = hourly(&[1.0, 2.0]);
        let out =
            resample_frame(&frame, Duration::minutes(15), ResampleMethod::Interpolate).unwrap();
        assert_eq!(
            out.column("a").unwrap(),
            &[1.0, 1.25, 1.5, 1.75, 2.0, 2.0, 2.0, 2.0]
        );
    }

    #[test]
    fn downsample_mean() {
        let frame = hourly(&[1.0, 3.0, 5.0, 7.0]);
        let out = resample_frame(&frame, Duration::hours(2), ResampleMethod::Ffill).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.column("a").unwrap(), &[2.0, 6.0]);
    }

    #[test]
    fn single_step_cannot_be_resampled() {
        let frame = hourly(&[1.0]);
        assert!(resample_frame(&frame, Duration::minutes(15), ResampleMethod::Ffill).is_err());
    }
}
