use serde::{Deserialize, Serialize};

/// Quality zone boundaries used by the heatmap and the markdown report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub green_min: f64,
    pub yellow_min: f64,
    pub rule_alert_min: f64,
    pub judge_coverage_min: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            green_min: 0.90,
            yellow_min: 0.80,
            rule_alert_min: 0.85,
            judge_coverage_min: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Green,
    Yellow,
    Red,
    Na,
}

impl Zone {
    pub const ALL: [Zone; 4] = [Zone::Green, Zone::Yellow, Zone::Red, Zone::Na];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Green => "green",
            Zone::Yellow => "yellow",
            Zone::Red => "red",
            Zone::Na => "na",
        }
    }
}

impl QualityThresholds {
    pub fn zone(&self, score: Option<f64>) -> Zone {
        match score {
            None => Zone::Na,
            Some(s) if s >= self.green_min => Zone::Green,
            Some(s) if s >= self.yellow_min => Zone::Yellow,
            Some(_) => Zone::Red,
        }
    }

    /// True when a rule's judge correctness is below the alert line.
    pub fn is_rule_alert(&self, judge_correctness: f64) -> bool {
        judge_correctness < self.rule_alert_min
    }

    pub fn doc_line(&self) -> String {
        format!(
            "green >= {:.2}, yellow >= {:.2}, red < {:.2}, na = no_judged",
            self.green_min, self.yellow_min, self.yellow_min
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_boundaries_are_inclusive() {
        let t = QualityThresholds::default();
        assert_eq!(t.zone(Some(1.0)), Zone::Green);
        assert_eq!(t.zone(Some(0.90)), Zone::Green);
        assert_eq!(t.zone(Some(0.8999)), Zone::Yellow);
        assert_eq!(t.zone(Some(0.80)), Zone::Yellow);
        assert_eq!(t.zone(Some(0.79)), Zone::Red);
        assert_eq!(t.zone(Some(0.0)), Zone::Red);
        assert_eq!(t.zone(None), Zone::Na);
    }

    #[test]
    fn test_doc_line() {
        let line = QualityThresholds::default().doc_line();
        assert_eq!(
            line,
            "green >= 0.90, yellow >= 0.80, red < 0.80, na = no_judged"
        );
    }
}
