//! Parametric runtime-distribution models
//!
//! A [`ProbModel`] binds a distribution family to a fitted parameter
//! vector. Fitting is maximum likelihood over a batch of non-negative
//! runtimes; evaluation is the cumulative distribution function, which
//! yields the "rank" of an observed runtime (the fraction of the
//! reference population expected to run faster).
//!
//! A CDF rank is used instead of a raw mean comparison because runtime
//! distributions are right-skewed, not normal; the rank is bounded in
//! [0, 1] and interpretable as a percentile of slowness.
//!
//! A model is either *unfit* (no parameters; cannot be evaluated or
//! serialized) or *fit*. Refitting replaces the parameters wholesale.

use crate::error::{Result, StoreError};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use statrs::distribution::{ContinuousCDF, Gamma, LogNormal, Normal};
use statrs::function::gamma::digamma;
use std::fmt;
use std::str::FromStr;

/// Minimum spread required of a sample batch before a fit is attempted.
///
/// All-identical samples make every supported estimator singular (zero
/// variance, or zero log-spread for the gamma shape equation), so they
/// are rejected up front with `FittingError`.
const DEGENERATE_EPS: f64 = 1e-12;

/// Newton iterations for the gamma shape MLE. The fixed-point is smooth
/// and the moment-based starting value is close, so convergence is fast.
const GAMMA_NEWTON_STEPS: usize = 25;

/// Supported distribution families
///
/// Serialized by name (`"gamma"`, `"normal"`, `"log-normal"`), which is
/// the fixed registration table for the on-disk tagged representation:
/// unknown names fail deserialization rather than being discovered at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    /// Two-parameter gamma: `[shape, scale]`
    Gamma,
    /// Normal: `[mean, std_dev]`
    Normal,
    /// Log-normal: `[mu, sigma]` of the underlying normal
    LogNormal,
}

impl ModelFamily {
    /// Canonical lowercase name, matching the serialized form
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Gamma => "gamma",
            ModelFamily::Normal => "normal",
            ModelFamily::LogNormal => "log-normal",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gamma" => Ok(ModelFamily::Gamma),
            "normal" | "norm" => Ok(ModelFamily::Normal),
            "log-normal" | "lognormal" => Ok(ModelFamily::LogNormal),
            other => Err(StoreError::Fitting {
                family: other.to_string(),
                reason: "unsupported distribution family".to_string(),
            }),
        }
    }
}

/// A distribution family plus (optionally) fitted parameters
///
/// Two models are equal iff they share a family and their parameter
/// vectors are equal element-wise; models of different families are
/// never equal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbModel {
    family: ModelFamily,
    params: Option<Vec<f64>>,
}

impl ProbModel {
    /// Create an unfit model of the given family
    pub fn unfit(family: ModelFamily) -> Self {
        Self {
            family,
            params: None,
        }
    }

    /// Fit a model of the given family to a batch of runtimes
    ///
    /// Requires at least one sample. Fails with `FittingError` on
    /// degenerate input: empty or all-identical batches, non-finite or
    /// negative durations, or non-positive durations for the gamma and
    /// log-normal families (their support is strictly positive).
    pub fn fit(family: ModelFamily, samples: &[f64]) -> Result<Self> {
        let mut model = Self::unfit(family);
        model.refit(samples)?;
        Ok(model)
    }

    /// Refit this model over a new batch, replacing any previous parameters
    ///
    /// Idempotent: refitting the same batch produces the same parameters.
    /// On failure the previous parameters are left untouched.
    pub fn refit(&mut self, samples: &[f64]) -> Result<()> {
        validate_samples(self.family, samples)?;
        let params = match self.family {
            ModelFamily::Gamma => fit_gamma(samples)?,
            ModelFamily::Normal => fit_normal(samples)?,
            ModelFamily::LogNormal => fit_log_normal(samples)?,
        };
        self.params = Some(params);
        Ok(())
    }

    /// Whether the model carries fitted parameters
    pub fn is_fit(&self) -> bool {
        self.params.is_some()
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    /// Fitted parameter vector, if any
    pub fn params(&self) -> Option<&[f64]> {
        self.params.as_deref()
    }

    /// Evaluate the cumulative distribution function at `x`
    ///
    /// Returns a probability in [0, 1]. Fails with `InvalidStateError`
    /// when the model is unfit or its parameters cannot reconstruct the
    /// distribution (e.g. a corrupted document).
    pub fn cdf(&self, x: f64) -> Result<f64> {
        let params = self.checked_params()?;
        let invalid = |e: statrs::StatsError| {
            StoreError::InvalidState(format!(
                "'{}' model parameters {params:?} are invalid: {e}",
                self.family
            ))
        };
        Ok(match self.family {
            // statrs parameterizes gamma by rate, the store by scale.
            ModelFamily::Gamma => Gamma::new(params[0], 1.0 / params[1])
                .map_err(invalid)?
                .cdf(x),
            ModelFamily::Normal => Normal::new(params[0], params[1]).map_err(invalid)?.cdf(x),
            ModelFamily::LogNormal => LogNormal::new(params[0], params[1])
                .map_err(invalid)?
                .cdf(x),
        })
    }

    /// Mean of the fitted distribution
    ///
    /// Gamma: `shape * scale`; normal: `mean`; log-normal:
    /// `exp(mu + sigma^2 / 2)`.
    pub fn mean(&self) -> Result<f64> {
        let params = self.checked_params()?;
        Ok(match self.family {
            ModelFamily::Gamma => params[0] * params[1],
            ModelFamily::Normal => params[0],
            ModelFamily::LogNormal => (params[0] + params[1] * params[1] / 2.0).exp(),
        })
    }

    fn checked_params(&self) -> Result<&[f64]> {
        let params = self.params.as_deref().ok_or_else(|| {
            StoreError::InvalidState(format!(
                "'{}' model has not been fit; no parameters available",
                self.family
            ))
        })?;
        if params.len() != 2 {
            return Err(StoreError::InvalidState(format!(
                "'{}' model expects 2 parameters, found {}",
                self.family,
                params.len()
            )));
        }
        Ok(params)
    }
}

/// On-disk shape of a fit model: `{family, parameters}`
#[derive(Serialize, Deserialize)]
struct ModelDocument {
    family: ModelFamily,
    parameters: Vec<f64>,
}

// An unfit model refuses serialization outright; persisted reference
// records must always carry evaluable models.
impl Serialize for ProbModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let parameters = self
            .params
            .clone()
            .ok_or_else(|| S::Error::custom("cannot serialize an unfit model"))?;
        ModelDocument {
            family: self.family,
            parameters,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProbModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let doc = ModelDocument::deserialize(deserializer)?;
        if doc.parameters.is_empty() {
            return Err(D::Error::custom("model document has no parameters"));
        }
        Ok(ProbModel {
            family: doc.family,
            params: Some(doc.parameters),
        })
    }
}

fn validate_samples(family: ModelFamily, samples: &[f64]) -> Result<()> {
    let fail = |reason: String| StoreError::Fitting {
        family: family.name().to_string(),
        reason,
    };
    if samples.is_empty() {
        return Err(fail("at least one sample is required".to_string()));
    }
    if let Some(bad) = samples.iter().find(|x| !x.is_finite() || **x < 0.0) {
        return Err(fail(format!("samples must be finite and non-negative, found {bad}")));
    }
    let positive_support = matches!(family, ModelFamily::Gamma | ModelFamily::LogNormal);
    if positive_support && samples.iter().any(|x| *x <= 0.0) {
        return Err(fail(
            "family has strictly positive support; zero-duration samples cannot be fit"
                .to_string(),
        ));
    }
    let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max - min < DEGENERATE_EPS {
        return Err(fail(
            "degenerate sample batch (all values identical); the estimator is singular"
                .to_string(),
        ));
    }
    Ok(())
}

fn mean_of(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Population (MLE) variance
fn variance_of(samples: &[f64], mean: f64) -> f64 {
    samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / samples.len() as f64
}

/// Maximum-likelihood normal fit: `[mean, std_dev]`
fn fit_normal(samples: &[f64]) -> Result<Vec<f64>> {
    let mean = mean_of(samples);
    let std_dev = variance_of(samples, mean).sqrt();
    Ok(vec![mean, std_dev])
}

/// Maximum-likelihood log-normal fit: `[mu, sigma]` of `ln(x)`
fn fit_log_normal(samples: &[f64]) -> Result<Vec<f64>> {
    let logs: Vec<f64> = samples.iter().map(|x| x.ln()).collect();
    let mu = mean_of(&logs);
    let sigma = variance_of(&logs, mu).sqrt();
    if sigma < DEGENERATE_EPS {
        return Err(StoreError::Fitting {
            family: ModelFamily::LogNormal.name().to_string(),
            reason: "log-spread of samples is zero; sigma estimate is singular".to_string(),
        });
    }
    Ok(vec![mu, sigma])
}

/// Maximum-likelihood gamma fit: `[shape, scale]`
///
/// Solves `ln(k) - psi(k) = s` for the shape `k`, where
/// `s = ln(mean) - mean(ln x)`, starting from the Minka moment
/// approximation and refining with Newton steps. The scale follows as
/// `mean / k`.
fn fit_gamma(samples: &[f64]) -> Result<Vec<f64>> {
    let mean = mean_of(samples);
    let mean_log = mean_of(&samples.iter().map(|x| x.ln()).collect::<Vec<f64>>());
    let s = mean.ln() - mean_log;
    if !s.is_finite() || s <= DEGENERATE_EPS {
        return Err(StoreError::Fitting {
            family: ModelFamily::Gamma.name().to_string(),
            reason: format!("log-spread statistic {s} is singular; cannot estimate shape"),
        });
    }

    let mut k = (3.0 - s + ((s - 3.0) * (s - 3.0) + 24.0 * s).sqrt()) / (12.0 * s);
    for _ in 0..GAMMA_NEWTON_STEPS {
        let f = k.ln() - digamma(k) - s;
        let df = 1.0 / k - trigamma(k);
        let next = k - f / df;
        if !next.is_finite() || next <= 0.0 {
            break;
        }
        if (next - k).abs() < 1e-12 * k {
            k = next;
            break;
        }
        k = next;
    }
    if !k.is_finite() || k <= 0.0 {
        return Err(StoreError::Fitting {
            family: ModelFamily::Gamma.name().to_string(),
            reason: format!("shape estimate diverged (k = {k})"),
        });
    }
    Ok(vec![k, mean / k])
}

/// First derivative of the digamma function.
///
/// statrs exposes `digamma` but not its derivative, so this uses the
/// standard recurrence to shift the argument above 6 and then the
/// asymptotic series. Accurate to well below the Newton tolerance.
fn trigamma(mut x: f64) -> f64 {
    let mut acc = 0.0;
    while x < 6.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    acc + inv
        + inv2 / 2.0
        + inv * inv2 / 6.0
        - inv * inv2 * inv2 / 30.0
        + inv * inv2 * inv2 * inv2 / 42.0
}
