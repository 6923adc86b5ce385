//! Result records handed to the presentation layer
//!
//! One [`ResultRecord`] summarizes one ranked workload: the rank, the
//! measured runtime, the runtime relative to the model mean, and a
//! summary of the reference it was ranked against. Rendering beyond the
//! plain-text report (tables, colors) belongs to the presentation
//! collaborator, which consumes the record list directly.

use crate::error::Result;
use crate::identity::ConfigId;
use crate::model::ModelFamily;
use crate::reference::Reference;

/// Identifying summary of the reference a result was ranked against
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSummary {
    pub machine_id: ConfigId,
    pub software_id: ConfigId,
    pub family: ModelFamily,
    pub sample_count: usize,
    /// Mean of the fitted model
    pub model_mean: f64,
    /// Mean of the raw sample batch behind the fit
    pub empirical_mean: f64,
}

/// One ranked workload, ready for presentation
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub workload_id: String,
    /// Whether the reference matched the current environment exactly
    pub exact: bool,
    /// CDF rank of the measured runtime under the reference model
    pub rank: f64,
    /// Measured runtime in seconds
    pub runtime: f64,
    /// Runtime relative to the reference model mean (1.0 = on par)
    pub rltv_runtime: f64,
    pub reference: ReferenceSummary,
}

impl ResultRecord {
    /// Assemble a record from a ranked reference lookup
    pub fn new(
        workload_id: impl Into<String>,
        exact: bool,
        rank: f64,
        runtime: f64,
        reference: &Reference,
    ) -> Result<Self> {
        let model_mean = reference.model.mean()?;
        Ok(Self {
            workload_id: workload_id.into(),
            exact,
            rank,
            runtime,
            rltv_runtime: runtime / model_mean,
            reference: ReferenceSummary {
                machine_id: reference.key.machine_id.clone(),
                software_id: reference.key.software_id.clone(),
                family: reference.model.family(),
                sample_count: reference.samples.len(),
                model_mean,
                empirical_mean: reference.empirical_mean(),
            },
        })
    }

    /// Whether this result should be flagged as slow
    pub fn is_slow(&self, rank_thresh: f64, rltv_thresh: f64) -> bool {
        self.rank > rank_thresh || self.rltv_runtime > rltv_thresh
    }
}

/// Render a plain-text report over a batch of results
///
/// Rows are sorted by rank, slowest first, and flagged against the given
/// thresholds; a trailing summary counts slow and inexactly-matched
/// workloads.
pub fn render_report(results: &[ResultRecord], rank_thresh: f64, rltv_thresh: f64) -> String {
    let mut report = String::new();
    if results.is_empty() {
        report.push_str("No benchmarked workloads matched the request.\n");
        return report;
    }

    let mut rows: Vec<&ResultRecord> = results.iter().collect();
    rows.sort_by(|a, b| b.rank.total_cmp(&a.rank));

    report.push_str(&format!(
        "{:<40} {:>8} {:>8} {:>12} {:>9} {:>9}\n",
        "Workload", "Rank", "Rltv", "Runtime", "Machine", "Software"
    ));
    for row in &rows {
        let flag = if row.is_slow(rank_thresh, rltv_thresh) {
            " SLOW"
        } else {
            ""
        };
        let exactness = if row.exact { "" } else { " (inexact ref)" };
        report.push_str(&format!(
            "{:<40} {:>7.2}% {:>7.1}X {:>11.6}s {:>9} {:>9}{}{}\n",
            row.workload_id,
            row.rank * 100.0,
            row.rltv_runtime,
            row.runtime,
            row.reference.machine_id.short(),
            row.reference.software_id.short(),
            flag,
            exactness,
        ));
    }

    let count = rows.len() as f64;
    let mean_rank: f64 = rows.iter().map(|r| r.rank).sum::<f64>() / count;
    let mean_rltv: f64 = rows.iter().map(|r| r.rltv_runtime).sum::<f64>() / count;
    let mean_runtime: f64 = rows.iter().map(|r| r.runtime).sum::<f64>() / count;
    report.push_str(&format!(
        "{:<40} {:>7.2}% {:>7.1}X {:>11.6}s\n",
        "(averages)",
        mean_rank * 100.0,
        mean_rltv,
        mean_runtime,
    ));

    let slow = rows
        .iter()
        .filter(|r| r.is_slow(rank_thresh, rltv_thresh))
        .count();
    if slow > 0 {
        report.push_str(&format!("{slow}/{} workloads ranked slow.\n", rows.len()));
    }
    let inexact = rows.iter().filter(|r| !r.exact).count();
    if inexact > 0 {
        report.push_str(&format!(
            "{inexact}/{} workloads ran against a mis-matched reference.\n",
            rows.len()
        ));
    }
    report
}
