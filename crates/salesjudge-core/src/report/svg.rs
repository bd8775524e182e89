use super::heatmap::Heatmap;
use crate::thresholds::{QualityThresholds, Zone};

const CELL_W: usize = 88;
const CELL_H: usize = 22;
const GAP: usize = 3;
const PAD: usize = 14;
const CHAR_W: usize = 7;
const MIN_WIDTH: usize = 640;
const HEADER_H: usize = 68;

fn zone_color(zone: Zone) -> &'static str {
    match zone {
        Zone::Green => "#42a160",
        Zone::Yellow => "#e3b643",
        Zone::Red => "#c95246",
        Zone::Na => "#bababa",
    }
}

fn legend(thresholds: &QualityThresholds) -> [(String, Zone); 4] {
    [
        (format!("GREEN {:.2}-1.00", thresholds.green_min), Zone::Green),
        (
            format!("YELLOW {:.2}-{:.2}", thresholds.yellow_min, thresholds.green_min - 0.01),
            Zone::Yellow,
        ),
        (format!("RED 0.00-{:.2}", thresholds.yellow_min - 0.01), Zone::Red),
        ("NA NO_JUDGED".to_string(), Zone::Na),
    ]
}

/// Renders the grid as a standalone SVG document; one row per conversation.
pub fn render_heatmap_svg(map: &Heatmap, thresholds: &QualityThresholds) -> String {
    let no_data = vec!["NO_DATA".to_string()];
    let no_rules = vec!["NO_RULES".to_string()];
    let rows = if map.conversation_ids.is_empty() {
        &no_data
    } else {
        &map.conversation_ids
    };
    let cols = if map.rule_keys.is_empty() {
        &no_rules
    } else {
        &map.rule_keys
    };

    let label_w = rows
        .iter()
        .map(|r| r.chars().count())
        .chain(std::iter::once("CONVERSATION".len()))
        .max()
        .unwrap_or(0)
        * CHAR_W;
    let grid_left = PAD + label_w + 12;
    let grid_top = PAD + HEADER_H;
    let grid_w = cols.len() * CELL_W + (cols.len() - 1) * GAP;
    let grid_h = rows.len() * CELL_H + (rows.len() - 1) * GAP;
    let width = (grid_left + grid_w + PAD).max(MIN_WIDTH);
    let height = grid_top + grid_h + PAD;

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
    ));
    svg.push_str(&format!(
        "<rect x=\"0\" y=\"0\" width=\"{width}\" height=\"{height}\" fill=\"#ffffff\"/>\n"
    ));
    svg.push_str(&format!(
        "<text x=\"{PAD}\" y=\"{}\" font-family=\"monospace\" font-size=\"13\">EVAL VS JUDGE HEATMAP</text>\n",
        PAD + 10
    ));

    let mut x = PAD;
    let legend_y = PAD + 22;
    for (label, zone) in legend(thresholds) {
        svg.push_str(&format!(
            "<rect x=\"{x}\" y=\"{legend_y}\" width=\"10\" height=\"10\" fill=\"{}\" stroke=\"#dcdcdc\"/>\n",
            zone_color(zone)
        ));
        svg.push_str(&format!(
            "<text x=\"{}\" y=\"{}\" font-family=\"monospace\" font-size=\"11\">{}</text>\n",
            x + 14,
            legend_y + 9,
            xml_escape(&label)
        ));
        x += label.chars().count() * CHAR_W + 32;
    }

    svg.push_str(&format!(
        "<text x=\"{PAD}\" y=\"{}\" font-family=\"monospace\" font-size=\"11\">CONVERSATION</text>\n",
        grid_top - 8
    ));
    for (col, key) in cols.iter().enumerate() {
        svg.push_str(&format!(
            "<text x=\"{}\" y=\"{}\" font-family=\"monospace\" font-size=\"11\">{}</text>\n",
            grid_left + col * (CELL_W + GAP) + 2,
            grid_top - 8,
            xml_escape(key)
        ));
    }

    for (row, conv) in rows.iter().enumerate() {
        let y = grid_top + row * (CELL_H + GAP);
        svg.push_str(&format!(
            "<text x=\"{PAD}\" y=\"{}\" font-family=\"monospace\" font-size=\"11\">{}</text>\n",
            y + 15,
            xml_escape(conv)
        ));
        for col in 0..cols.len() {
            let score = map
                .scores
                .get(row)
                .and_then(|r| r.get(col))
                .copied()
                .flatten();
            let cx = grid_left + col * (CELL_W + GAP);
            svg.push_str(&format!(
                "<rect x=\"{cx}\" y=\"{y}\" width=\"{CELL_W}\" height=\"{CELL_H}\" fill=\"{}\" stroke=\"#dcdcdc\"/>\n",
                zone_color(thresholds.zone(score))
            ));
        }
    }

    svg.push_str("</svg>\n");
    svg
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
