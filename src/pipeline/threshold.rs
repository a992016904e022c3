/// Contour-floor threshold estimation
///
/// Three policies: Otsu's bimodal histogram split ("auto-split"), a
/// median + k·stddev noise estimate ("statistical"), or a fixed value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Histogram resolution for the auto-split method
pub const OTSU_BINS: usize = 256;
/// Default standard-deviation multiplier for the statistical method
pub const DEFAULT_NSTD: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ThresholdSpec {
    AutoSplit,
    Fixed(f64),
    Statistical { nstd: f64 },
}

impl Default for ThresholdSpec {
    fn default() -> Self {
        ThresholdSpec::AutoSplit
    }
}

impl std::fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdSpec::AutoSplit => write!(f, "auto-split"),
            ThresholdSpec::Fixed(v) => write!(f, "fixed {:.3e}", v),
            ThresholdSpec::Statistical { nstd } => write!(f, "median + {} x stddev", nstd),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("cannot estimate a threshold: {0}")]
    DegenerateDistribution(String),
}

/// Resolve a threshold spec against a column of intensities.
pub fn resolve(intensities: &[f64], spec: &ThresholdSpec) -> Result<f64, ThresholdError> {
    match spec {
        ThresholdSpec::Fixed(v) => Ok(*v),
        ThresholdSpec::AutoSplit => otsu(intensities),
        ThresholdSpec::Statistical { nstd } => statistical(intensities, *nstd),
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Otsu threshold: center of the histogram bin that maximizes the
/// between-class variance of the two populations split there.
pub fn otsu(intensities: &[f64]) -> Result<f64, ThresholdError> {
    let values = finite(intensities);
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if values.is_empty() || min >= max {
        return Err(ThresholdError::DegenerateDistribution(format!(
            "auto-split needs at least two distinct intensities ({} finite values)",
            values.len()
        )));
    }

    let width = (max - min) / OTSU_BINS as f64;
    let mut hist = [0.0f64; OTSU_BINS];
    for &v in &values {
        // last bin is closed on the right
        let bin = (((v - min) / width) as usize).min(OTSU_BINS - 1);
        hist[bin] += 1.0;
    }
    let centers: Vec<f64> = (0..OTSU_BINS)
        .map(|i| min + width * (i as f64 + 0.5))
        .collect();

    // weight1/mean1 cover bins [0, i]; weight2/mean2 cover bins [i + 1, end)
    let total: f64 = hist.iter().sum();
    let total_moment: f64 = hist.iter().zip(&centers).map(|(h, c)| h * c).sum();
    let mut weight1 = 0.0;
    let mut moment1 = 0.0;
    let mut best = (f64::NEG_INFINITY, 0usize);
    for i in 0..OTSU_BINS - 1 {
        weight1 += hist[i];
        moment1 += hist[i] * centers[i];
        let weight2 = total - weight1;
        if weight1 == 0.0 || weight2 == 0.0 {
            continue;
        }
        let mean1 = moment1 / weight1;
        let mean2 = (total_moment - moment1) / weight2;
        let variance = weight1 * weight2 * (mean1 - mean2).powi(2);
        if variance > best.0 {
            best = (variance, i);
        }
    }
    Ok(centers[best.1])
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// `median + nstd * stddev`
pub fn statistical(intensities: &[f64], nstd: f64) -> Result<f64, ThresholdError> {
    let values = finite(intensities);
    let med = median(&values).ok_or_else(|| {
        ThresholdError::DegenerateDistribution("no finite intensities".to_string())
    })?;
    Ok(med + nstd * std_dev(&values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_passes_through() {
        assert_eq!(resolve(&[], &ThresholdSpec::Fixed(1e7)).unwrap(), 1e7);
        assert_eq!(resolve(&[1.0], &ThresholdSpec::Fixed(-3.5)).unwrap(), -3.5);
    }

    #[test]
    fn test_statistical_zero_multiplier_is_median() {
        let data = [1.0, 2.0, 3.0, 4.0, 100.0];
        let t = resolve(&data, &ThresholdSpec::Statistical { nstd: 0.0 }).unwrap();
        assert_eq!(t, 3.0);
    }

    #[test]
    fn test_statistical_default_multiplier() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // sample stddev of this set is sqrt(32 / 7)
        let expected = 4.5 + DEFAULT_NSTD * (32.0f64 / 7.0).sqrt();
        let t = statistical(&data, DEFAULT_NSTD).unwrap();
        assert!((t - expected).abs() < 1e-12);
    }

    #[test]
    fn test_otsu_bimodal() {
        let data = [0.0, 0.0, 0.0, 0.0, 100.0, 100.0, 100.0, 100.0];
        let t = resolve(&data, &ThresholdSpec::AutoSplit).unwrap();
        assert!(t > 0.0 && t < 100.0, "threshold {}", t);
    }

    #[test]
    fn test_otsu_separates_noise_from_peaks() {
        let mut data: Vec<f64> = (0..500).map(|i| (i % 10) as f64 * 0.1).collect();
        data.extend((0..50).map(|i| 50.0 + (i % 5) as f64));
        let t = otsu(&data).unwrap();
        assert!(t > 1.0 && t < 50.0, "threshold {}", t);
    }

    #[test]
    fn test_otsu_degenerate() {
        assert!(matches!(
            otsu(&[3.0, 3.0, 3.0]),
            Err(ThresholdError::DegenerateDistribution(_))
        ));
        assert!(otsu(&[]).is_err());
        assert!(otsu(&[f64::NAN, 1.0]).is_err());
        assert!(statistical(&[], 5.0).is_err());
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(std_dev(&[7.0]), 0.0);
    }
}
