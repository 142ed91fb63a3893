use chunk_aggregator::{PipelineConfig, aggregate_file};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn main() -> anyhow::Result<()> {
    let _profiler = dhat::Profiler::new_heap();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "measurements.txt".to_string());
    let result = aggregate_file(&path, PipelineConfig::from_env()?)?;

    println!(
        "{} rows over {} keys. See dhat-heap.json for details",
        result.summary().rows_processed,
        result.aggregates().len()
    );
    Ok(())
}
