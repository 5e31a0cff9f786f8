//! Text rendering of chart projections: one line per tick on stdout.

use cpuwatch_core::{ChartUpdate, Series};

const NAME_WIDTH: usize = 16;
const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub fn truncate_middle(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max {
        return s.to_string();
    }
    if max <= 3 {
        return "...".into();
    }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    let head: String = s.chars().take(left).collect();
    let tail: String = s.chars().skip(len - right).collect();
    format!("{head}...{tail}")
}

pub fn format_reading(value: Option<f32>) -> String {
    match value {
        Some(v) => format!("{v:5.1}%"),
        None => "    --".into(),
    }
}

fn format_series(series: &Series) -> String {
    format!(
        "{}[{}] {}",
        truncate_middle(&series.name, NAME_WIDTH),
        series.pid,
        format_reading(series.last())
    )
}

/// `tick N | name[pid] value | ...` for the newest tick of `update`.
pub fn chart_line(update: &ChartUpdate) -> String {
    let mut line = format!("tick {:>4}", update.ticks.saturating_sub(1));
    if update.series.is_empty() {
        line.push_str(" | (no matching processes)");
    }
    for series in &update.series {
        line.push_str(" | ");
        line.push_str(&format_series(series));
    }
    line
}

/// The newest `width` points on a fixed 0..100 scale. Gaps render as spaces.
pub fn sparkline(points: &[Option<f32>], width: usize) -> String {
    let start = points.len().saturating_sub(width);
    points[start..]
        .iter()
        .map(|p| match p {
            Some(v) => {
                let level = (v.clamp(0.0, 100.0) / 100.0 * (BARS.len() - 1) as f32).round();
                BARS[(level as usize).min(BARS.len() - 1)]
            }
            None => ' ',
        })
        .collect()
}

/// `name[pid] |sparkline| latest` per series.
pub fn history_lines(update: &ChartUpdate, width: usize) -> Vec<String> {
    update
        .series
        .iter()
        .map(|s| {
            format!(
                "{:<w$} |{:<width$}| {}",
                format!("{}[{}]", truncate_middle(&s.name, NAME_WIDTH), s.pid),
                sparkline(&s.points, width),
                format_reading(s.last()),
                w = NAME_WIDTH + 8,
            )
        })
        .collect()
}

/// Session summary: per series, the mean of its available points.
pub fn summary_lines(update: &ChartUpdate) -> Vec<String> {
    update
        .series
        .iter()
        .map(|s| {
            let values: Vec<f32> = s.points.iter().flatten().copied().collect();
            let mean = if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f32>() / values.len() as f32)
            };
            format!(
                "{}[{}] mean {} over {} of {} ticks",
                s.name,
                s.pid,
                format_reading(mean).trim_start(),
                values.len(),
                s.points.len()
            )
        })
        .collect()
}
