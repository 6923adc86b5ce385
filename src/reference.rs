//! Reference records: stored runtime baselines
//!
//! A [`Reference`] binds a `(machine, software, workload)` key to the raw
//! runtime samples and the distribution model fitted over them. The raw
//! samples are kept alongside the model for auditability and re-fitting.
//!
//! Records visible outside the store always carry a fit model; an unfit
//! model refuses serialization, so unfit records can never be persisted.
//! Records are replaced wholesale (new samples plus refit model), never
//! partially updated.

use crate::error::Result;
use crate::identity::ConfigId;
use crate::model::{ModelFamily, ProbModel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite key of a reference record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceKey {
    pub machine_id: ConfigId,
    pub software_id: ConfigId,
    pub workload_id: String,
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.machine_id.short(),
            self.software_id.short(),
            self.workload_id
        )
    }
}

/// Baseline for one workload under one resolved environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub key: ReferenceKey,
    /// Raw runtime measurements behind the current fit, in seconds
    pub samples: Vec<f64>,
    pub model: ProbModel,
}

impl Reference {
    /// Fit a model of `family` over `samples` and build the record
    ///
    /// Fit failures propagate before any record exists, so a degenerate
    /// batch never produces a half-built reference.
    pub fn from_samples(key: ReferenceKey, samples: Vec<f64>, family: ModelFamily) -> Result<Self> {
        let model = ProbModel::fit(family, &samples)?;
        Ok(Self {
            key,
            samples,
            model,
        })
    }

    /// Rank a runtime against the fitted model (CDF value in [0, 1])
    pub fn rank(&self, runtime: f64) -> Result<f64> {
        self.model.cdf(runtime)
    }

    /// Mean of the raw sample batch
    pub fn empirical_mean(&self) -> f64 {
        if self.samples.is_empty() {
            return f64::NAN;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(workload: &str) -> ReferenceKey {
        ReferenceKey {
            machine_id: ConfigId::from("aaaaaaaaaaaaaaaa"),
            software_id: ConfigId::from("bbbbbbbbbbbbbbbb"),
            workload_id: workload.to_string(),
        }
    }

    #[test]
    fn test_from_samples_fits_model() {
        let reference = Reference::from_samples(
            key("suite::case_a"),
            vec![0.1, 0.12, 0.11, 0.13, 0.09],
            ModelFamily::Gamma,
        )
        .unwrap();
        assert!(reference.model.is_fit());
        assert_eq!(reference.samples.len(), 5);
        let rank = reference.rank(0.11).unwrap();
        assert!(rank > 0.0 && rank < 1.0);
    }

    #[test]
    fn test_from_samples_propagates_fit_failure() {
        let result = Reference::from_samples(
            key("suite::case_a"),
            vec![0.1, 0.1, 0.1],
            ModelFamily::Gamma,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empirical_mean() {
        let reference = Reference::from_samples(
            key("suite::case_a"),
            vec![0.1, 0.2, 0.3],
            ModelFamily::Gamma,
        )
        .unwrap();
        assert!((reference.empirical_mean() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_serialization_round_trip() {
        let reference = Reference::from_samples(
            key("suite::case_a"),
            vec![0.1, 0.12, 0.11, 0.13, 0.09],
            ModelFamily::Gamma,
        )
        .unwrap();
        let text = serde_json::to_string(&reference).unwrap();
        let loaded: Reference = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, reference);
    }

    #[test]
    fn test_key_display_clips_ids() {
        let display = key("suite::case_a").to_string();
        assert_eq!(display, "(aaaaaaa, bbbbbbb, suite::case_a)");
    }
}
