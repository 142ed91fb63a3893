use chunk_aggregator::{PipelineConfig, aggregate_file};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "measurements.txt".to_string());

    let result = aggregate_file(&path, PipelineConfig::default())?;

    // Hottest stations by mean
    let mut stations: Vec<_> = result.summaries().into_iter().collect();
    stations.sort_by(|a, b| b.1.mean.total_cmp(&a.1.mean));
    for (station, stats) in stations.iter().take(10) {
        println!(
            "{} => mean {:.1} over {} readings (min {:.1}, max {:.1})",
            station, stats.mean, stats.count, stats.min, stats.max
        );
    }

    let summary = result.summary();
    for err in &summary.errors {
        eprintln!("skipped byte {}: {}", err.offset, err.error);
    }
    let unlisted = summary.malformed - summary.errors.len() as u64;
    if unlisted > 0 {
        eprintln!("... and {unlisted} more malformed values");
    }

    Ok(())
}
