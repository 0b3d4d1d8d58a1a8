use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::ArrowWriter;

const N_NODES: usize = 8;
const STEPS_PER_DAY: usize = 288;
const DAYS: usize = 2;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Vehicle speed at one detector: free flow minus morning and evening rush dips.
fn speed(hour: f64, node: usize, rng: &mut SimpleRng) -> f64 {
    let lag = node as f64 * 0.15;
    let congestion = gaussian(hour, 8.0 + lag, 1.0, 25.0) + gaussian(hour, 17.5 + lag, 1.5, 30.0);
    (65.0 - congestion + rng.gauss(0.0, 2.0)).max(0.0)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct Readings {
    timestamps: Vec<String>,
    /// Per node, per row.
    columns: Vec<Vec<Option<f64>>>,
}

fn generate_readings(rng: &mut SimpleRng) -> Result<Readings> {
    let start = NaiveDate::from_ymd_opt(2011, 9, 15)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid start date")?;

    let mut timestamps = Vec::new();
    let mut columns = vec![Vec::new(); N_NODES];

    for step in 0..STEPS_PER_DAY * DAYS {
        // A dropped row: the loader must re-insert it as fully missing.
        if step == 100 {
            continue;
        }
        let t = start + Duration::minutes(5 * step as i64);
        let hour = (step % STEPS_PER_DAY) as f64 / 12.0;
        timestamps.push(t.format("%Y-%m-%d %H:%M:%S").to_string());

        for (node, column) in columns.iter_mut().enumerate() {
            let v = speed(hour, node, rng);
            let dropout = rng.next_f64() < 0.02;
            column.push((!dropout).then_some((v * 100.0).round() / 100.0));
        }
    }

    Ok(Readings { timestamps, columns })
}

/// Detectors along a highway plus a few cross links; pair (3, 7) is absent.
fn generate_distances(rng: &mut SimpleRng) -> Vec<(usize, usize, f64)> {
    let mut pairs = Vec::new();
    for i in 0..N_NODES - 1 {
        pairs.push((i, i + 1, 0.5 + rng.next_f64()));
    }
    for (a, b) in [(0, 4), (2, 6), (1, 5)] {
        pairs.push((a, b, 2.0 + rng.next_f64()));
    }
    pairs
}

fn node_name(i: usize) -> String {
    format!("{}", 1000 + i)
}

fn write_readings_csv(path: &Path, readings: &Readings) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating readings CSV")?;
    let header = std::iter::once("timestamp".to_string()).chain((0..N_NODES).map(node_name));
    writer.write_record(header)?;
    for (row, t) in readings.timestamps.iter().enumerate() {
        let cells = readings
            .columns
            .iter()
            .map(|c| c[row].map(|v| v.to_string()).unwrap_or_default());
        writer.write_record(std::iter::once(t.clone()).chain(cells))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_readings_parquet(path: &Path, readings: &Readings) -> Result<()> {
    let mut fields = vec![Field::new("timestamp", DataType::Utf8, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(StringArray::from(
        readings.timestamps.iter().map(String::as_str).collect::<Vec<_>>(),
    ))];
    for (node, column) in readings.columns.iter().enumerate() {
        fields.push(Field::new(node_name(node), DataType::Float64, true));
        arrays.push(Arc::new(Float64Array::from(column.clone())));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn write_distances_csv(path: &Path, pairs: &[(usize, usize, f64)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating distances CSV")?;
    writer.write_record(["node_a", "node_b", "distance"])?;
    for &(a, b, d) in pairs {
        writer.write_record([node_name(a), node_name(b), format!("{d:.3}")])?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let readings = generate_readings(&mut rng)?;
    let pairs = generate_distances(&mut rng);

    write_readings_csv(&out_dir.join("readings.csv"), &readings)?;
    write_readings_parquet(&out_dir.join("readings.parquet"), &readings)?;
    write_distances_csv(&out_dir.join("distances.csv"), &pairs)?;

    let config = serde_json::json!({
        "name": "synthetic-highway",
        "readings_path": "readings.csv",
        "distances_path": "distances.csv",
        "output_path": "adjacency.csv",
        "loader": { "freq": "5T" },
        "similarity": { "method": "distance" }
    });
    std::fs::write(out_dir.join("config.json"), serde_json::to_string_pretty(&config)?)?;

    log::info!(
        "Wrote {} rows x {N_NODES} nodes and {} distance pairs to {}",
        readings.timestamps.len(),
        pairs.len(),
        out_dir.display()
    );
    Ok(())
}
