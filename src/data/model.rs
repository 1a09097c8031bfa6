use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayD, Axis, Slice};
use serde::{Deserialize, Serialize};

use super::stream::Stream;

// ---------------------------------------------------------------------------
// Scalar – a single cell of a tabular source
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring common dataframe dtypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => write!(f, "{s}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Null => write!(f, ""),
        }
    }
}

impl Scalar {
    /// Numeric view of the cell. Null maps to NaN; strings have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Null => Some(f64::NAN),
            Scalar::String(_) => None,
        }
    }

    /// Guess the type of a raw text cell (CSV fields, query strings).
    pub fn parse(s: &str) -> Scalar {
        if s.is_empty() {
            return Scalar::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return Scalar::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Scalar::Float(f);
        }
        if s == "true" || s == "false" {
            return Scalar::Bool(s == "true");
        }
        Scalar::String(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Frame – a small row-major table
// ---------------------------------------------------------------------------

/// Tabular data with named columns, one `Vec<Scalar>` per row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        Frame { columns, rows }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// `[rows, columns]`.
    pub fn shape(&self) -> Vec<usize> {
        vec![self.n_rows(), self.n_cols()]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Frame> {
        let mut rows = Vec::with_capacity(indices.len());
        for &i in indices {
            match self.rows.get(i) {
                Some(row) => rows.push(row.clone()),
                None => bail!("row {i} out of range for frame with {} rows", self.n_rows()),
            }
        }
        Ok(Frame {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Columns named in `names`, in that order.
    pub fn select_columns(&self, names: &[String]) -> Result<Frame> {
        let mut idx = Vec::with_capacity(names.len());
        for name in names {
            match self.column_index(name) {
                Some(i) => idx.push(i),
                None => bail!("frame has no column '{name}'"),
            }
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                idx.iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(Scalar::Null))
                    .collect()
            })
            .collect();
        Ok(Frame {
            columns: names.to_vec(),
            rows,
        })
    }

    /// Numeric `[rows, columns]` matrix; fails on text cells.
    pub fn to_array(&self) -> Result<Array2<f64>> {
        let mut out = Array2::<f64>::zeros((self.n_rows(), self.n_cols()));
        for (r, row) in self.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate().take(self.n_cols()) {
                match cell.as_f64() {
                    Some(v) => out[[r, c]] = v,
                    None => bail!(
                        "column '{}', row {r}: '{cell}' is not numeric",
                        self.columns[c]
                    ),
                }
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Source – where a loader reads from
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    Path(PathBuf),
    Url(String),
}

impl Source {
    /// The local path, or an error for remote sources.
    pub fn local_path(&self) -> Result<&PathBuf> {
        match self {
            Source::Path(p) => Ok(p),
            Source::Url(u) => bail!("loader needs a local file, got URL {u}"),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(p) => write!(f, "{}", p.display()),
            Source::Url(u) => write!(f, "{u}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Value – one data payload
// ---------------------------------------------------------------------------

/// A single payload produced by a loader or preprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Array(ArrayD<f64>),
    Frame(Frame),
    Scalar(Scalar),
    /// Lazily evaluated chunks; has neither a shape nor a length.
    Stream(Stream),
}

impl Value {
    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            Value::Array(a) => Some(a.shape().to_vec()),
            Value::Frame(f) => Some(f.shape()),
            Value::Scalar(_) | Value::Stream(_) => None,
        }
    }

    /// Length of the leading axis.
    pub fn n_rows(&self) -> Option<usize> {
        match self {
            Value::Array(a) if a.ndim() > 0 => Some(a.len_of(Axis(0))),
            Value::Frame(f) => Some(f.n_rows()),
            _ => None,
        }
    }

    /// Keep at most `max_len` entries along the leading axis.
    pub fn truncate(&self, max_len: usize) -> Result<Value> {
        match self {
            Value::Array(a) if a.ndim() > 0 => {
                let end = max_len.min(a.len_of(Axis(0)));
                Ok(Value::Array(
                    a.slice_axis(Axis(0), Slice::from(0..end)).to_owned(),
                ))
            }
            Value::Frame(f) => Ok(Value::Frame(f.head(max_len))),
            other => bail!("{} value has no leading axis to truncate", other.kind()),
        }
    }

    /// Entries at `indices` along the leading axis.
    pub fn take(&self, indices: &[usize]) -> Result<Value> {
        match self {
            Value::Array(a) if a.ndim() > 0 => {
                let len = a.len_of(Axis(0));
                if let Some(bad) = indices.iter().find(|&&i| i >= len) {
                    bail!("index {bad} out of range for axis of length {len}");
                }
                Ok(Value::Array(a.select(Axis(0), indices)))
            }
            Value::Frame(f) => Ok(Value::Frame(f.select_rows(indices)?)),
            other => bail!("cannot index rows of a {} value", other.kind()),
        }
    }

    /// Short type name used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Array(a) if a.ndim() == 0 => "0-d array",
            Value::Array(_) => "array",
            Value::Frame(_) => "frame",
            Value::Scalar(_) => "scalar",
            Value::Stream(_) => "stream",
        }
    }

    /// Numeric array view: arrays as-is, frames converted.
    pub fn to_array(&self) -> Result<ArrayD<f64>> {
        match self {
            Value::Array(a) => Ok(a.clone()),
            Value::Frame(f) => Ok(f.to_array()?.into_dyn()),
            other => bail!("cannot convert a {} value to an array", other.kind()),
        }
    }
}

impl From<ArrayD<f64>> for Value {
    fn from(a: ArrayD<f64>) -> Self {
        Value::Array(a)
    }
}

impl From<Frame> for Value {
    fn from(f: Frame) -> Self {
        Value::Frame(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn frame() -> Frame {
        Frame::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![Scalar::Integer(1), Scalar::Float(0.5)],
                vec![Scalar::Integer(2), Scalar::Null],
                vec![Scalar::Integer(3), Scalar::Bool(true)],
            ],
        )
    }

    #[test]
    fn parse_guesses_cell_types() {
        assert_eq!(Scalar::parse(""), Scalar::Null);
        assert_eq!(Scalar::parse("42"), Scalar::Integer(42));
        assert_eq!(Scalar::parse("4.5"), Scalar::Float(4.5));
        assert_eq!(Scalar::parse("true"), Scalar::Bool(true));
        assert_eq!(Scalar::parse("abc"), Scalar::String("abc".into()));
    }

    #[test]
    fn truncate_array_and_frame() {
        let arr = Value::Array(Array::zeros((10, 3)).into_dyn());
        assert_eq!(arr.truncate(4).unwrap().shape(), Some(vec![4, 3]));
        assert_eq!(arr.truncate(40).unwrap().shape(), Some(vec![10, 3]));

        let f = Value::Frame(frame());
        assert_eq!(f.truncate(2).unwrap().shape(), Some(vec![2, 2]));
    }

    #[test]
    fn truncate_scalar_fails() {
        assert!(Value::Scalar(Scalar::Integer(1)).truncate(1).is_err());
    }

    #[test]
    fn take_selects_rows_in_order() {
        let arr = Value::Array(Array::from_shape_vec((3, 1), vec![0.0, 1.0, 2.0]).unwrap().into_dyn());
        let Value::Array(picked) = arr.take(&[2, 0]).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(picked.iter().copied().collect::<Vec<_>>(), vec![2.0, 0.0]);
        assert!(arr.take(&[3]).is_err());
    }

    #[test]
    fn frame_to_array_maps_null_to_nan() {
        let arr = frame().to_array().unwrap();
        assert_eq!(arr.shape(), &[3, 2]);
        assert!(arr[[1, 1]].is_nan());
        assert_eq!(arr[[2, 1]], 1.0);
    }

    #[test]
    fn select_columns_rejects_unknown() {
        let f = frame();
        assert_eq!(f.select_columns(&["b".into()]).unwrap().shape(), vec![3, 1]);
        assert!(f.select_columns(&["zzz".into()]).is_err());
    }
}
