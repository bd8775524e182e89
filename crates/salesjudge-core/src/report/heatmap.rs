//! Judge-aligned conversation x rule grid.

use crate::metrics::safe_div;
use crate::storage::HeatCell;
use crate::thresholds::{QualityThresholds, Zone};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct WorstCell {
    pub conversation_id: String,
    pub rule_key: String,
    pub score: f64,
    pub judged_total: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub conversation_ids: Vec<String>,
    pub rule_keys: Vec<String>,
    /// `scores[row][col]`; `None` when nothing in the cell was judged.
    pub scores: Vec<Vec<Option<f64>>>,
    pub judged: Vec<Vec<i64>>,
}

pub fn cell_score(judged_total: i64, judge_true: i64) -> Option<f64> {
    (judged_total > 0).then(|| safe_div(judge_true, judged_total))
}

impl Heatmap {
    /// Rows are the conversations present in `cells`, sorted; columns follow `rule_keys`.
    pub fn from_cells<S: AsRef<str>>(rule_keys: &[S], cells: &[HeatCell]) -> Self {
        let conversation_ids: Vec<String> = cells
            .iter()
            .map(|c| c.conversation_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let by_cell: HashMap<(&str, &str), &HeatCell> = cells
            .iter()
            .map(|c| ((c.conversation_id.as_str(), c.rule_key.as_str()), c))
            .collect();

        let mut scores = Vec::with_capacity(conversation_ids.len());
        let mut judged = Vec::with_capacity(conversation_ids.len());
        for conv in &conversation_ids {
            let mut row_scores = Vec::with_capacity(rule_keys.len());
            let mut row_judged = Vec::with_capacity(rule_keys.len());
            for key in rule_keys {
                let (j, t) = by_cell
                    .get(&(conv.as_str(), key.as_ref()))
                    .map(|c| (c.judged_total, c.judge_true))
                    .unwrap_or((0, 0));
                row_scores.push(cell_score(j, t));
                row_judged.push(j);
            }
            scores.push(row_scores);
            judged.push(row_judged);
        }

        Self {
            conversation_ids,
            rule_keys: rule_keys.iter().map(|k| k.as_ref().to_string()).collect(),
            scores,
            judged,
        }
    }

    /// Cell count per zone, in [`Zone::ALL`] order.
    pub fn zone_counts(&self, thresholds: &QualityThresholds) -> Vec<(Zone, usize)> {
        let mut counts: Vec<(Zone, usize)> = Zone::ALL.iter().map(|z| (*z, 0)).collect();
        for score in self.scores.iter().flatten() {
            let zone = thresholds.zone(*score);
            if let Some(entry) = counts.iter_mut().find(|(z, _)| *z == zone) {
                entry.1 += 1;
            }
        }
        counts
    }

    /// Lowest scores first; ties prefer more judged rows, then ids.
    pub fn worst_cells(&self, limit: usize) -> Vec<WorstCell> {
        let mut ranked = Vec::new();
        for (row, conv) in self.conversation_ids.iter().enumerate() {
            for (col, key) in self.rule_keys.iter().enumerate() {
                let judged_total = self.judged[row][col];
                let Some(score) = self.scores[row][col] else {
                    continue;
                };
                if judged_total <= 0 {
                    continue;
                }
                ranked.push(WorstCell {
                    conversation_id: conv.clone(),
                    rule_key: key.clone(),
                    score,
                    judged_total,
                });
            }
        }
        ranked.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then(b.judged_total.cmp(&a.judged_total))
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
                .then_with(|| a.rule_key.cmp(&b.rule_key))
        });
        ranked.truncate(limit);
        ranked
    }
}
