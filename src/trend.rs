//! Trend fitter: closed-form linear fits shared by every forecast.
//!
//! Each coefficient is `cov(feature, target) / var(feature)` over
//! mean-centered data, computed feature by feature. Covariance between
//! features is ignored, which matches how the dashboards have always fitted
//! their trends; do not replace this with a full multivariate solve without
//! re-baselining every published figure.

use crate::types::{Domain, Metric};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;

/// Variances below this force the coefficient to zero.
pub const VARIANCE_EPSILON: f64 = 1e-10;
/// Accuracy assigned when the target has no variance (`SS_tot ~ 0`).
pub const DEGENERATE_ACCURACY: f64 = 0.0;
/// Accuracy of the fallback model built from no usable samples.
pub const FALLBACK_ACCURACY: f64 = 0.0;
/// Accuracy the housing-density view publishes regardless of fit quality.
/// Kept as a product decision rather than a measured value.
pub const REPORTED_DENSITY_ACCURACY: f64 = 0.70;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub features: Vec<f64>,
    pub target: f64,
}

impl Sample {
    pub fn new(features: Vec<f64>, target: f64) -> Self {
        Sample { features, target }
    }

    fn is_finite(&self) -> bool {
        self.target.is_finite() && self.features.iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracySource {
    /// `1 - SS_res / SS_tot` over the training samples.
    Fitted,
    /// Target was constant; [`DEGENERATE_ACCURACY`].
    Degenerate,
    /// No usable samples; [`FALLBACK_ACCURACY`].
    Fallback,
}

impl AccuracySource {
    pub fn as_str(self) -> &'static str {
        match self {
            AccuracySource::Fitted => "fitted",
            AccuracySource::Degenerate => "degenerate",
            AccuracySource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitConfig {
    /// Range predictions are clamped into.
    pub domain: Domain,
    /// Constant prediction of the fallback model.
    pub fallback_intercept: f64,
    /// Accuracy to publish instead of the fitted one.
    pub accuracy_override: Option<f64>,
}

impl FitConfig {
    pub fn for_metric(metric: Metric) -> Self {
        FitConfig {
            domain: metric.domain(),
            fallback_intercept: metric.default_value(),
            accuracy_override: (metric == Metric::PopulationDensity)
                .then_some(REPORTED_DENSITY_ACCURACY),
        }
    }
}

/// Zone code to numeric index, in sorted zone order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZoneEncoding {
    codes: BTreeMap<String, usize>,
}

impl ZoneEncoding {
    pub fn from_zones<'a, I>(zones: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut sorted: Vec<&str> = zones.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();
        ZoneEncoding {
            codes: sorted
                .into_iter()
                .enumerate()
                .map(|(i, z)| (z.to_string(), i))
                .collect(),
        }
    }

    pub fn encode(&self, zone: &str) -> Option<f64> {
        self.codes.get(zone).map(|i| *i as f64)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Fitted coefficients plus everything needed to predict. Immutable once
/// built; [`TrendModel::predict`] takes `&self`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendModel {
    coefficients: Vec<f64>,
    intercept: f64,
    feature_means: Vec<f64>,
    zones: ZoneEncoding,
    r_squared: f64,
    accuracy_source: AccuracySource,
    accuracy_override: Option<f64>,
    sample_count: usize,
    domain: Domain,
}

impl TrendModel {
    /// Fit over `samples`.
    ///
    /// Samples with non-finite values, or whose feature count differs from
    /// the first valid sample, are discarded. With nothing left the
    /// [`TrendModel::fallback`] model is returned.
    pub fn fit(samples: &[Sample], config: &FitConfig) -> TrendModel {
        let width = samples
            .iter()
            .find(|s| s.is_finite())
            .map(|s| s.features.len());
        let Some(width) = width else {
            let guess = samples.first().map_or(0, |s| s.features.len());
            warn!(
                "no usable samples out of {}, using fallback model",
                samples.len()
            );
            return TrendModel::fallback(guess, config);
        };
        let valid: Vec<&Sample> = samples
            .iter()
            .filter(|s| s.is_finite() && s.features.len() == width)
            .collect();
        let n = valid.len() as f64;

        let mut feature_means = vec![0.0; width];
        let mut target_mean = 0.0;
        for s in &valid {
            for (m, x) in feature_means.iter_mut().zip(&s.features) {
                *m += x;
            }
            target_mean += s.target;
        }
        for m in &mut feature_means {
            *m /= n;
        }
        target_mean /= n;

        let coefficients: Vec<f64> = (0..width)
            .map(|j| {
                let mut cov = 0.0;
                let mut var = 0.0;
                for s in &valid {
                    let dx = s.features[j] - feature_means[j];
                    cov += dx * (s.target - target_mean);
                    var += dx * dx;
                }
                cov /= n;
                var /= n;
                if var < VARIANCE_EPSILON {
                    0.0
                } else {
                    cov / var
                }
            })
            .collect();

        let intercept = target_mean
            - coefficients
                .iter()
                .zip(&feature_means)
                .map(|(c, m)| c * m)
                .sum::<f64>();

        let mut model = TrendModel {
            coefficients,
            intercept,
            feature_means,
            zones: ZoneEncoding::default(),
            r_squared: DEGENERATE_ACCURACY,
            accuracy_source: AccuracySource::Degenerate,
            accuracy_override: config.accuracy_override,
            sample_count: valid.len(),
            domain: config.domain,
        };

        let ss_tot: f64 = valid.iter().map(|s| (s.target - target_mean).powi(2)).sum();
        if ss_tot >= VARIANCE_EPSILON {
            let ss_res: f64 = valid
                .iter()
                .map(|s| (s.target - model.linear(&s.features)).powi(2))
                .sum();
            model.r_squared = 1.0 - ss_res / ss_tot;
            model.accuracy_source = AccuracySource::Fitted;
        }

        debug!(
            "fitted {} features over {} samples (r2 = {:.4}, {})",
            width,
            model.sample_count,
            model.r_squared,
            model.accuracy_source.as_str()
        );
        model
    }

    /// Constant model: zero coefficients, intercept from the config.
    pub fn fallback(feature_count: usize, config: &FitConfig) -> TrendModel {
        TrendModel {
            coefficients: vec![0.0; feature_count],
            intercept: config.fallback_intercept,
            feature_means: vec![0.0; feature_count],
            zones: ZoneEncoding::default(),
            r_squared: FALLBACK_ACCURACY,
            accuracy_source: AccuracySource::Fallback,
            accuracy_override: config.accuracy_override,
            sample_count: 0,
            domain: config.domain,
        }
    }

    pub fn with_zone_encoding(mut self, zones: ZoneEncoding) -> Self {
        self.zones = zones;
        self
    }

    /// Unclamped linear response. Missing or non-finite inputs take the
    /// training mean, so they contribute nothing.
    fn linear(&self, features: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(&self.feature_means)
            .enumerate()
            .map(|(j, (c, mean))| {
                let x = features.get(j).copied().filter(|v| v.is_finite()).unwrap_or(*mean);
                c * x
            })
            .sum::<f64>()
            + self.intercept
    }

    /// Predict and clamp into the model's domain.
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.domain.clamp(self.linear(features))
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn zones(&self) -> &ZoneEncoding {
        &self.zones
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    pub fn accuracy_source(&self) -> AccuracySource {
        self.accuracy_source
    }

    /// Accuracy to publish: the configured override if any, else R².
    pub fn reported_accuracy(&self) -> f64 {
        self.accuracy_override.unwrap_or(self.r_squared)
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_config() -> FitConfig {
        FitConfig {
            domain: Domain::Count,
            fallback_intercept: 7.0,
            accuracy_override: None,
        }
    }

    #[test]
    fn recovers_exact_line() {
        let samples: Vec<Sample> = (0..6)
            .map(|x| Sample::new(vec![x as f64], 2.0 * x as f64 + 1.0))
            .collect();
        let model = TrendModel::fit(&samples, &count_config());
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-12);
        assert!((model.intercept() - 1.0).abs() < 1e-12);
        assert!((model.r_squared() - 1.0).abs() < 1e-12);
        assert_eq!(model.accuracy_source(), AccuracySource::Fitted);
        assert!((model.predict(&[10.0]) - 21.0).abs() < 1e-9);
    }

    #[test]
    fn constant_feature_gets_zero_coefficient() {
        let samples = vec![
            Sample::new(vec![1.0, 5.0], 3.0),
            Sample::new(vec![2.0, 5.0], 5.0),
            Sample::new(vec![3.0, 5.0], 7.0),
        ];
        let model = TrendModel::fit(&samples, &count_config());
        assert_eq!(model.coefficients()[1], 0.0);
        assert!(model.coefficients()[0].is_finite());
        assert!(model.intercept().is_finite());
    }

    #[test]
    fn coordinate_wise_coefficients_ignore_feature_covariance() {
        // x2 duplicates x1, so each coordinate-wise slope is the full slope.
        let samples: Vec<Sample> = (0..4)
            .map(|x| Sample::new(vec![x as f64, x as f64], 3.0 * x as f64))
            .collect();
        let model = TrendModel::fit(&samples, &count_config());
        assert!((model.coefficients()[0] - 3.0).abs() < 1e-12);
        assert!((model.coefficients()[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn constant_target_uses_degenerate_accuracy() {
        let samples = vec![Sample::new(vec![1.0], 4.0), Sample::new(vec![2.0], 4.0)];
        let model = TrendModel::fit(&samples, &count_config());
        assert_eq!(model.r_squared(), DEGENERATE_ACCURACY);
        assert_eq!(model.accuracy_source(), AccuracySource::Degenerate);
        assert_eq!(model.predict(&[9.0]), 4.0);
    }

    #[test]
    fn empty_or_invalid_input_yields_fallback() {
        let model = TrendModel::fit(&[], &count_config());
        assert_eq!(model.accuracy_source(), AccuracySource::Fallback);
        assert_eq!(model.r_squared(), FALLBACK_ACCURACY);
        assert_eq!(model.predict(&[]), 7.0);

        let junk = vec![Sample::new(vec![f64::NAN, 1.0], 2.0)];
        let model = TrendModel::fit(&junk, &count_config());
        assert_eq!(model.accuracy_source(), AccuracySource::Fallback);
        assert_eq!(model.coefficients(), &[0.0, 0.0]);
    }

    #[test]
    fn mismatched_width_samples_are_dropped() {
        let samples = vec![
            Sample::new(vec![0.0], 0.0),
            Sample::new(vec![1.0], 1.0),
            Sample::new(vec![5.0, 5.0], 100.0),
        ];
        let model = TrendModel::fit(&samples, &count_config());
        assert_eq!(model.sample_count(), 2);
        assert!((model.coefficients()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn predictions_are_clamped_and_pure() {
        let samples: Vec<Sample> = (0..5)
            .map(|x| Sample::new(vec![x as f64], 30.0 * x as f64))
            .collect();
        let config = FitConfig {
            domain: Domain::Percent,
            fallback_intercept: 50.0,
            accuracy_override: None,
        };
        let model = TrendModel::fit(&samples, &config);
        let before = model.clone();
        assert_eq!(model.predict(&[10.0]), 100.0);
        assert_eq!(model.predict(&[-10.0]), 0.0);
        assert_eq!(model, before);
    }

    #[test]
    fn override_changes_reported_accuracy_only() {
        let samples: Vec<Sample> = (0..4)
            .map(|x| Sample::new(vec![x as f64], (x * x) as f64))
            .collect();
        let config = FitConfig::for_metric(Metric::PopulationDensity);
        let model = TrendModel::fit(&samples, &config);
        assert_eq!(model.reported_accuracy(), REPORTED_DENSITY_ACCURACY);
        assert!(model.r_squared() < 1.0);
        assert!(FitConfig::for_metric(Metric::Congestion).accuracy_override.is_none());
    }

    #[test]
    fn zone_encoding_is_sorted_and_deduplicated() {
        let enc = ZoneEncoding::from_zones(["Zone B", "Zone A", "Zone B"]);
        assert_eq!(enc.len(), 2);
        assert_eq!(enc.encode("Zone A"), Some(0.0));
        assert_eq!(enc.encode("Zone B"), Some(1.0));
        assert_eq!(enc.encode("Zone Z"), None);
    }
}
