use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
};
use arrow::datatypes::DataType;
use ndarray::ArrayD;
use ndarray_npy::{NpzReader, ReadNpyExt};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{Frame, Scalar, Source, Value};
use super::output::{Named, Output};
use super::stream::{open_source, read_columns, Stream};
use crate::config::{arg_bool, arg_usize, Args};

// ---------------------------------------------------------------------------
// CSV loader  (csv::read)
// ---------------------------------------------------------------------------

/// Read a CSV source into a frame.
///
/// Args:
/// * `chunksize`   – return a lazy stream of frames with this many rows
/// * `delimiter`   – single-character field separator (default `,`)
/// * `has_headers` – first row holds column names (default `true`)
pub fn read_csv(source: &Source, args: &Args) -> Result<Output> {
    let delimiter = match args.get("delimiter").and_then(JsonValue::as_str) {
        None => b',',
        Some(d) if d.len() == 1 => d.as_bytes()[0],
        Some(d) => bail!("delimiter must be a single byte, got '{d}'"),
    };
    let has_headers = arg_bool(args, "has_headers")?.unwrap_or(true);

    if let Some(chunksize) = arg_usize(args, "chunksize")? {
        return Ok(Output::Single(Value::Stream(Stream::CsvChunks {
            source: source.clone(),
            chunksize,
            delimiter,
            has_headers,
        })));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .from_reader(open_source(source)?);
    let columns = read_columns(&mut reader)?;

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() != columns.len() {
            bail!(
                "CSV row {row_no}: expected {} fields, found {}",
                columns.len(),
                record.len()
            );
        }
        rows.push(record.iter().map(Scalar::parse).collect());
    }

    Ok(Output::Single(Value::Frame(Frame::new(columns, rows))))
}

// ---------------------------------------------------------------------------
// NumPy loader  (npy::load)
// ---------------------------------------------------------------------------

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Load a `.npy` array, or every member of a `.npz` archive.
///
/// Archives are recognised by their zip signature and come back as a named
/// mapping in archive order. Integer, boolean and `f32` arrays are widened to
/// `f64`. `allow_pickle` is accepted for compatibility; object arrays are
/// never readable.
pub fn load_npy(source: &Source, _args: &Args) -> Result<Output> {
    let path = source.local_path()?;
    let mut bytes = Vec::new();
    File::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .read_to_end(&mut bytes)
        .with_context(|| format!("reading {}", path.display()))?;

    if bytes.starts_with(ZIP_MAGIC) {
        let mut npz = NpzReader::new(Cursor::new(bytes)).context("opening npz archive")?;
        let mut members = Named::new();
        for name in npz.names().context("listing npz members")? {
            let array = read_npz_member(&mut npz, &name)?;
            let key = name.strip_suffix(".npy").unwrap_or(&name).to_string();
            members.insert(key, Value::Array(array));
        }
        return Ok(Output::Map(members));
    }

    Ok(Output::Single(Value::Array(read_npy_bytes(&bytes)?)))
}

fn read_npy_bytes(bytes: &[u8]) -> Result<ArrayD<f64>> {
    if let Ok(a) = ArrayD::<f64>::read_npy(Cursor::new(bytes)) {
        return Ok(a);
    }
    if let Ok(a) = ArrayD::<f32>::read_npy(Cursor::new(bytes)) {
        return Ok(a.mapv(f64::from));
    }
    if let Ok(a) = ArrayD::<i64>::read_npy(Cursor::new(bytes)) {
        return Ok(a.mapv(|v| v as f64));
    }
    if let Ok(a) = ArrayD::<i32>::read_npy(Cursor::new(bytes)) {
        return Ok(a.mapv(f64::from));
    }
    if let Ok(a) = ArrayD::<bool>::read_npy(Cursor::new(bytes)) {
        return Ok(a.mapv(|v| if v { 1.0 } else { 0.0 }));
    }
    ArrayD::<f64>::read_npy(Cursor::new(bytes)).context("unsupported .npy element type")
}

fn read_npz_member(npz: &mut NpzReader<Cursor<Vec<u8>>>, name: &str) -> Result<ArrayD<f64>> {
    if let Ok(a) = npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::IxDyn>(name) {
        return Ok(a);
    }
    if let Ok(a) = npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::IxDyn>(name) {
        return Ok(a.mapv(f64::from));
    }
    if let Ok(a) = npz.by_name::<ndarray::OwnedRepr<i64>, ndarray::IxDyn>(name) {
        return Ok(a.mapv(|v| v as f64));
    }
    if let Ok(a) = npz.by_name::<ndarray::OwnedRepr<i32>, ndarray::IxDyn>(name) {
        return Ok(a.mapv(f64::from));
    }
    npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::IxDyn>(name)
        .with_context(|| format!("npz member '{name}' has an unsupported element type"))
}

// ---------------------------------------------------------------------------
// Pickle-style loader  (pickle::load)
// ---------------------------------------------------------------------------

/// Restore an output persisted by `save::pickle`.
pub fn load_pickle(source: &Source, _args: &Args) -> Result<Output> {
    let reader = open_source(source)?;
    serde_json::from_reader(reader).with_context(|| format!("deserializing {source}"))
}

// ---------------------------------------------------------------------------
// JSON records loader  (json::read)
// ---------------------------------------------------------------------------

/// Records-oriented JSON (`[{ "col": value, ... }, ...]`) into a frame.
///
/// Columns appear in order of first occurrence; missing cells are null.
pub fn read_json(source: &Source, _args: &Args) -> Result<Output> {
    let root: JsonValue =
        serde_json::from_reader(open_source(source)?).context("parsing JSON")?;
    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut columns: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .filter_map(JsonValue::as_object)
        .map(|obj| {
            columns
                .iter()
                .map(|c| obj.get(c).map(json_to_scalar).unwrap_or(Scalar::Null))
                .collect()
        })
        .collect();

    Ok(Output::Single(Value::Frame(Frame::new(columns, rows))))
}

fn json_to_scalar(val: &JsonValue) -> Scalar {
    match val {
        JsonValue::String(s) => Scalar::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Scalar::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Scalar::Float(f)
            } else {
                Scalar::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => Scalar::Bool(*b),
        JsonValue::Null => Scalar::Null,
        other => Scalar::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader  (parquet::read)
// ---------------------------------------------------------------------------

/// Flat Parquet columns into a frame. Nested columns are kept as text.
pub fn read_parquet(source: &Source, _args: &Args) -> Result<Output> {
    let path = source.local_path()?;
    let file = File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|col| extract_scalar(col, row))
                    .collect(),
            );
        }
    }

    Ok(Output::Single(Value::Frame(Frame::new(columns, rows))))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_scalar(col: &Arc<dyn Array>, row: usize) -> Scalar {
    if col.is_null(row) {
        return Scalar::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => Scalar::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Scalar::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map_or(Scalar::Null, |a| Scalar::Integer(i64::from(a.value(row)))),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map_or(Scalar::Null, |a| Scalar::Integer(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map_or(Scalar::Null, |a| Scalar::Float(f64::from(a.value(row)))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map_or(Scalar::Null, |a| Scalar::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map_or(Scalar::Null, |a| Scalar::Bool(a.value(row))),
        _ => match arrow::util::display::array_value_to_string(col, row) {
            Ok(s) => Scalar::String(s),
            Err(_) => Scalar::String(format!("{:?}", col.data_type())),
        },
    }
}

// ---------------------------------------------------------------------------
// Image directory loader  (image::read_dir)
// ---------------------------------------------------------------------------

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Index a directory laid out as `<root>/<class>/<image>` into lazy batches.
///
/// Args: `batch_size` (default 32), `target_size` as `[width, height]`
/// (default `[256, 256]`). Classes are sorted by name and labelled `0..n`.
pub fn read_image_dir(source: &Source, args: &Args) -> Result<Output> {
    let root = source.local_path()?;
    let batch_size = arg_usize(args, "batch_size")?.unwrap_or(32);
    let target_size = match args.get("target_size") {
        None => (256, 256),
        Some(v) => parse_target_size(v)?,
    };

    let mut class_dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("listing {}", root.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    class_dirs.sort();
    if class_dirs.is_empty() {
        bail!("{} has no class sub-directories", root.display());
    }

    let mut classes = Vec::with_capacity(class_dirs.len());
    let mut files = Vec::new();
    for (label, dir) in class_dirs.iter().enumerate() {
        classes.push(
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("listing {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect();
        images.sort();
        files.extend(images.into_iter().map(|p| (p, label)));
    }
    log::debug!(
        "found {} images in {} classes under {}",
        files.len(),
        classes.len(),
        root.display()
    );

    Ok(Output::Single(Value::Stream(Stream::ImageBatches {
        classes,
        files,
        batch_size,
        target_size,
    })))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn parse_target_size(v: &JsonValue) -> Result<(u32, u32)> {
    let dims: Vec<u32> = v
        .as_array()
        .context("target_size must be [width, height]")?
        .iter()
        .map(|d| {
            d.as_u64()
                .and_then(|d| u32::try_from(d).ok())
                .filter(|d| *d > 0)
                .context("target_size entries must be positive integers")
        })
        .collect::<Result<_>>()?;
    match dims.as_slice() {
        [w, h] => Ok((*w, *h)),
        _ => bail!("target_size must have exactly two entries"),
    }
}
