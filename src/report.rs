use crate::aggregate::LogAggregator;
use crate::config::ReportConfig;
use crate::stats::Summary;

/// Which optional sections to print after the latency line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sections {
    pub ratios: bool,
    pub responses: bool,
    pub windows: bool,
}

impl From<&ReportConfig> for Sections {
    fn from(c: &ReportConfig) -> Self {
        Self {
            ratios: c.ratios,
            responses: c.responses,
            windows: c.windows,
        }
    }
}

/// `mean q1 q2 ...` on one line.
pub fn latency_line(summary: &Summary) -> String {
    let mut out = summary.mean.to_string();
    for (_, value) in &summary.quantiles {
        out.push(' ');
        out.push_str(&value.to_string());
    }
    out
}

fn fmt_ratio(r: Option<f64>) -> String {
    r.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

/// Render the full report.
pub fn render(summary: &Summary, agg: &LogAggregator, sections: Sections) -> String {
    let mut output = latency_line(summary);
    output.push('\n');

    if sections.ratios {
        output.push_str(&format!("Hit Rate: {}\n", fmt_ratio(agg.hit_rate())));
        output.push_str(&format!("Sample Ratio: {}\n", fmt_ratio(agg.sample_ratio())));
        output.push_str(&format!("Byte Ratio: {}\n", fmt_ratio(agg.byte_ratio())));
    }

    if sections.responses {
        let r = &agg.responses;
        output.push_str(&format!(
            "Responses: {} (length {}, time {})\n",
            r.count, r.length, r.time
        ));
    }

    if sections.windows {
        match agg.windows() {
            Some(w) => {
                output.push_str(&format!(
                    "Range Mean: {} ({} queries)\n",
                    fmt_ratio(w.mean_range()),
                    w.ranges().len()
                ));
                let spread: Vec<String> = w
                    .bucket_spread()
                    .iter()
                    .map(|(size, keys)| format!("{size}:{keys}"))
                    .collect();
                output.push_str(&format!(
                    "Bucket Spread ({} keys): {}\n",
                    w.keys(),
                    spread.join(" ")
                ));
            }
            None => tracing::warn!("window report requested but query tracking is disabled"),
        }
    }

    output
}
