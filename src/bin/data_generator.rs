use rand::Rng;
use std::fs::File;
use std::io::{BufWriter, Write};

const STATIONS: [&str; 12] = [
    "Hamburg", "Palermo", "Bulawayo", "Cracow", "Istanbul", "Roseau", "Conakry", "St. John's",
    "Abéché", "Reykjavík", "Ouagadougou", "Zürich",
];

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "measurements.txt".to_string());
    let rows: u64 = match args.next() {
        Some(raw) => raw.parse()?,
        None => 10_000_000,
    };

    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);

    let mut rng = rand::rng();
    for _ in 0..rows {
        let station = STATIONS[rng.random_range(0..STATIONS.len())];
        let tenths: i32 = rng.random_range(-999..=999);
        writeln!(writer, "{};{:.1}", station, tenths as f64 / 10.0)?;
    }
    writer.flush()?;

    println!("Sample measurements generated: {} ({} rows)", path, rows);
    Ok(())
}
