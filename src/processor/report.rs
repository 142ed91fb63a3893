use crate::processor::aggregate::StationSummary;
use crate::processor::pipeline::AggregationResult;

/// Rounds to one decimal, halves away from zero, without a negative zero.
pub fn round_one_decimal(value: f64) -> f64 {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// `key=min/mean/max` with every figure rounded to one decimal
pub fn format_station(key: &str, stats: &StationSummary) -> String {
    format!(
        "{}={:.1}/{:.1}/{:.1}",
        key,
        round_one_decimal(stats.min),
        round_one_decimal(stats.mean),
        round_one_decimal(stats.max)
    )
}

/// Renders `{a=min/mean/max, b=...}` ordered by key.
pub fn format_report(result: &AggregationResult) -> String {
    let mut out = String::from("{");
    for (i, (key, stats)) in result.summaries().iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format_station(key, stats));
    }
    out.push('}');
    out
}
