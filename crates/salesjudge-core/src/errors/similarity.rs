#[derive(Debug, Clone, PartialEq)]
pub struct ClosestMatch {
    pub candidate: String,
    pub similarity: f64,
}

const THRESHOLD: f64 = 0.55;

pub fn closest_match<'a>(
    needle: &str,
    hay: impl IntoIterator<Item = &'a str>,
) -> Option<ClosestMatch> {
    let mut best: Option<ClosestMatch> = None;
    for candidate in hay {
        let sim = strsim::normalized_levenshtein(needle, candidate);
        if sim >= THRESHOLD && best.as_ref().map_or(true, |b| sim > b.similarity) {
            best = Some(ClosestMatch {
                candidate: candidate.to_string(),
                similarity: sim,
            });
        }
    }
    best
}

/// " (did you mean 'x'?)" or an empty string.
pub fn did_you_mean<'a>(needle: &str, hay: impl IntoIterator<Item = &'a str>) -> String {
    match closest_match(needle, hay) {
        Some(m) => format!(" (did you mean '{}'?)", m.candidate),
        None => String::new(),
    }
}
