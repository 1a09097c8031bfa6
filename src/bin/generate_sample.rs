use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::{Array1, Array2};
use ndarray_npy::{write_npy, NpzWriter};
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const N_ROWS: usize = 100;
const N_FEATURES: usize = 3;
const WEIGHTS: [f64; N_FEATURES] = [1.5, -2.0, 0.5];

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// Features drawn from N(0, 1); target is a noisy linear combination.
struct Sample {
    features: Array2<f64>,
    target: Array1<f64>,
    labels: Vec<String>,
}

fn generate(rng: &mut StdRng) -> Sample {
    let features = Array2::from_shape_fn((N_ROWS, N_FEATURES), |_| gauss(rng, 0.0, 1.0));
    let target: Array1<f64> = features
        .rows()
        .into_iter()
        .map(|row| {
            let signal: f64 = row.iter().zip(WEIGHTS).map(|(x, w)| x * w).sum();
            signal + gauss(rng, 0.0, 0.1)
        })
        .collect();
    let labels = target
        .iter()
        .map(|&t| if t >= 0.0 { "pos" } else { "neg" }.to_string())
        .collect();
    Sample {
        features,
        target,
        labels,
    }
}

fn write_csv(sample: &Sample, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["id", "f0", "f1", "f2", "target", "label"])?;
    for (i, row) in sample.features.rows().into_iter().enumerate() {
        let mut record = vec![i.to_string()];
        record.extend(row.iter().map(|v| format!("{v:.6}")));
        record.push(format!("{:.6}", sample.target[i]));
        record.push(sample.labels[i].clone());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_npz(sample: &Sample, path: &Path) -> Result<()> {
    let mut npz = NpzWriter::new(File::create(path)?);
    npz.add_array("X", &sample.features)?;
    npz.add_array("y", &sample.target)?;
    npz.finish()?;
    Ok(())
}

fn write_parquet(sample: &Sample, path: &Path) -> Result<()> {
    let column = |j: usize| Float64Array::from(sample.features.column(j).to_vec());

    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("f0", DataType::Float64, false),
        Field::new("f1", DataType::Float64, false),
        Field::new("f2", DataType::Float64, false),
        Field::new("target", DataType::Float64, false),
        Field::new("label", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(0..N_ROWS as i64)),
            Arc::new(column(0)),
            Arc::new(column(1)),
            Arc::new(column(2)),
            Arc::new(Float64Array::from(sample.target.to_vec())),
            Arc::new(StringArray::from(
                sample.labels.iter().map(String::as_str).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building record batch")?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn write_config(csv_path: &Path, path: &Path) -> Result<()> {
    let config = json!({
        "data_pars": {
            "input_pars": {
                "path": csv_path,
                "col_Xinput": ["f0", "f1", "f2"],
                "col_Yinput": ["target"],
                "names": ["X", "y"],
                "test_size": 0.2
            },
            "split_xy": {"uri": "split_xy::columns"},
            "output": {"shape": [[3], [1]]}
        }
    });
    serde_json::to_writer_pretty(File::create(path)?, &config)?;
    Ok(())
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = StdRng::seed_from_u64(42);
    let sample = generate(&mut rng);

    let csv_path = out_dir.join("sample_data.csv");
    write_csv(&sample, &csv_path)?;
    write_npy(out_dir.join("sample_data.npy"), &sample.features)?;
    write_npz(&sample, &out_dir.join("sample_data.npz"))?;
    write_parquet(&sample, &out_dir.join("sample_data.parquet"))?;
    write_config(&csv_path, &out_dir.join("sample_config.json"))?;

    println!(
        "Wrote {N_ROWS} rows ({N_FEATURES} features each) as csv, npy, npz and parquet to {}",
        out_dir.display()
    );
    Ok(())
}
