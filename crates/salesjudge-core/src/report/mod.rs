pub mod console;
pub mod heatmap;
pub mod markdown;
pub mod sink;
pub mod svg;

use crate::canonical::{self, CanonicalSelection, Comparison};
use crate::engine::ScanPolicy;
use crate::errors::ScanError;
use crate::metrics;
use crate::model::ScanMetricRow;
use crate::rules::{self, METRICS_VERSION};
use crate::storage::{BadCase, PhaseStats, Store};
use crate::thresholds::QualityThresholds;
use heatmap::{Heatmap, WorstCell};
use sink::ReportSink;

pub use sink::{DirSink, MemorySink};

pub const MARKDOWN_NAME: &str = "metrics.md";
pub const HEATMAP_NAME: &str = "accuracy_heatmap.svg";
pub const BAD_CASE_LIMIT: usize = 20;
pub const WORST_CELL_LIMIT: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    /// Defaults to the latest successful run.
    pub run_id: Option<String>,
    /// Explicit baseline; replaces the canonical run in the delta table.
    pub against: Option<String>,
}

/// Everything the renderers need, read from the store in one pass.
#[derive(Debug, Clone)]
pub struct ReportData {
    pub run_id: String,
    pub metrics_version: String,
    pub policy_line: String,
    pub thresholds: QualityThresholds,
    pub canonical: CanonicalSelection,
    pub against: Option<String>,
    pub comparison: Comparison,
    pub inserted: i64,
    pub judged: i64,
    pub coverage: f64,
    pub metrics: Vec<ScanMetricRow>,
    pub calls: Vec<PhaseStats>,
    pub heatmap: Heatmap,
    pub worst_cells: Vec<WorstCell>,
    pub bad_cases: Vec<BadCase>,
    pub summary_json: String,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub run_id: String,
    pub canonical_run_id: String,
    pub metrics_version: String,
    pub bad_cases: usize,
    pub markdown: String,
    pub svg: String,
}

impl Report {
    /// Writes the markdown and the heat-grid; returns the artifact names.
    pub fn write_to(&self, sink: &mut dyn ReportSink) -> anyhow::Result<Vec<&'static str>> {
        sink.write_report(MARKDOWN_NAME, self.markdown.as_bytes())?;
        sink.write_report(HEATMAP_NAME, self.svg.as_bytes())?;
        Ok(vec![MARKDOWN_NAME, HEATMAP_NAME])
    }
}

fn require_run(store: &Store, run_id: &str) -> anyhow::Result<()> {
    if store.get_run(run_id)?.is_none() {
        return Err(ScanError::Selection(format!("scan run '{}' not found", run_id)).into());
    }
    Ok(())
}

/// Reads everything a report needs. Does not write to the store.
pub fn collect(store: &Store, req: &ReportRequest) -> anyhow::Result<ReportData> {
    let run_id = match &req.run_id {
        Some(id) => {
            require_run(store, id)?;
            id.clone()
        }
        None => store
            .latest_successful_run()?
            .ok_or_else(|| ScanError::Selection("no successful scan run found".into()))?,
    };
    if let Some(against) = &req.against {
        require_run(store, against)?;
    }

    let metrics_version = store
        .run_metrics_version(&run_id)?
        .unwrap_or_else(|| METRICS_VERSION.to_string());
    let canonical = canonical::select(store, &run_id, &metrics_version)?;
    let baseline = req.against.as_deref().unwrap_or(&canonical.run_id);
    let comparison = canonical::compare(store, &run_id, baseline)?;

    let comparison = match comparison {
        Comparison::Delta(deltas) => Comparison::Delta(registry_order(deltas)),
        other => other,
    };

    let (inserted, judged) = store.count_results(&run_id)?;
    let keys = rules::rule_keys();
    let heatmap = Heatmap::from_cells(&keys, &store.heatmap_cells(&run_id)?);
    let worst_cells = heatmap.worst_cells(WORST_CELL_LIMIT);
    let summary_json = store
        .get_run(&run_id)?
        .map(|r| r.summary.to_string())
        .unwrap_or_else(|| "{}".to_string());

    Ok(ReportData {
        metrics_version,
        policy_line: ScanPolicy::fixed().doc_line(),
        thresholds: rules::quality_thresholds(),
        canonical,
        against: req.against.clone(),
        comparison,
        inserted,
        judged,
        coverage: metrics::overall_coverage(inserted, judged),
        metrics: store.metrics(&run_id)?,
        calls: store.llm_call_stats(&run_id)?,
        heatmap,
        worst_cells,
        bad_cases: store.bad_cases(&run_id, BAD_CASE_LIMIT)?,
        summary_json,
        run_id,
    })
}

/// Registry rules first in registry order, then any other stored rules by key.
fn registry_order(mut deltas: Vec<canonical::RuleDelta>) -> Vec<canonical::RuleDelta> {
    let keys = rules::rule_keys();
    let mut out = Vec::with_capacity(deltas.len().max(keys.len()));
    for key in &keys {
        match deltas.iter().position(|d| d.rule_key == *key) {
            Some(i) => out.push(deltas.remove(i)),
            None => out.push(canonical::RuleDelta {
                rule_key: key.to_string(),
                baseline: 0.0,
                current: 0.0,
                delta: 0.0,
            }),
        }
    }
    out.extend(deltas);
    out
}

pub fn compose(store: &Store, req: &ReportRequest) -> anyhow::Result<Report> {
    let data = collect(store, req)?;
    let markdown = markdown::render_markdown(&data);
    let svg = svg::render_heatmap_svg(&data.heatmap, &data.thresholds);
    tracing::info!(
        event = "report.composed",
        run_id = %data.run_id,
        canonical_run_id = %data.canonical.run_id,
        bad_cases = data.bad_cases.len(),
        "report composed"
    );
    Ok(Report {
        run_id: data.run_id,
        canonical_run_id: data.canonical.run_id,
        metrics_version: data.metrics_version,
        bad_cases: data.bad_cases.len(),
        markdown,
        svg,
    })
}
