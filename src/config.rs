//! Configuration: the `data_pars` document and its typed sections.
//!
//! Only the outer structure is validated here. `input_pars` stays a raw
//! mapping until `compute()` interprets it, so a missing `path` is reported
//! by the pipeline rather than at parse time.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::bail;
use serde_json::Value as JsonValue;

use crate::error::{LoaderError, Result};
use crate::registry::{Loader, PreprocessorFactory, Saver, Transform};

/// Static keyword arguments of a callable.
pub type Args = serde_json::Map<String, JsonValue>;

// ---------------------------------------------------------------------------
// Callable specifications
// ---------------------------------------------------------------------------

/// How a pluggable callable is named in the configuration.
#[derive(Clone)]
pub enum CallableSpec<F> {
    /// `{"uri": "<namespace>::<name>", "arg": {...}}`. `uri` may be omitted
    /// for loaders, which then fall back to the default table.
    Registry { uri: Option<String>, arg: Args },
    /// A function supplied directly, with its static args.
    Direct { func: F, arg: Args },
}

impl<F> CallableSpec<F> {
    pub fn uri(uri: impl Into<String>) -> Self {
        CallableSpec::Registry {
            uri: Some(uri.into()),
            arg: Args::new(),
        }
    }

    pub fn direct(func: F, arg: Args) -> Self {
        CallableSpec::Direct { func, arg }
    }

    pub fn with_arg(mut self, key: &str, value: JsonValue) -> Self {
        match &mut self {
            CallableSpec::Registry { arg, .. } | CallableSpec::Direct { arg, .. } => {
                arg.insert(key.to_string(), value);
            }
        }
        self
    }

    /// Parse a spec from `{"uri": .., "arg": ..}` or a bare uri string.
    pub fn from_json(value: &JsonValue, what: &str) -> Result<Self> {
        match value {
            JsonValue::String(uri) => Ok(CallableSpec::uri(uri.clone())),
            JsonValue::Object(obj) => {
                let uri = match obj.get("uri") {
                    None | Some(JsonValue::Null) => None,
                    Some(JsonValue::String(s)) => Some(s.clone()),
                    Some(other) => {
                        return Err(LoaderError::config(format!(
                            "{what}: uri must be a string, got {other}"
                        )))
                    }
                };
                let arg = match obj.get("arg").or_else(|| obj.get("args")) {
                    None | Some(JsonValue::Null) => Args::new(),
                    Some(JsonValue::Object(a)) => a.clone(),
                    Some(other) => {
                        return Err(LoaderError::config(format!(
                            "{what}: arg must be a mapping, got {other}"
                        )))
                    }
                };
                Ok(CallableSpec::Registry { uri, arg })
            }
            other => Err(LoaderError::config(format!(
                "{what}: expected a callable specification, got {other}"
            ))),
        }
    }
}

impl<F> fmt::Debug for CallableSpec<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallableSpec::Registry { uri, arg } => f
                .debug_struct("Registry")
                .field("uri", uri)
                .field("arg", arg)
                .finish(),
            CallableSpec::Direct { arg, .. } => {
                f.debug_struct("Direct").field("arg", arg).finish_non_exhaustive()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// `loader` section.
#[derive(Debug, Clone, Default)]
pub struct LoaderPars {
    pub data_loader: Option<CallableSpec<Loader>>,
    /// Rows per chunk in generator mode; defaults to `batch_size`.
    pub chunksize: Option<usize>,
}

/// `save_intermediate_output` section.
#[derive(Debug, Clone)]
pub struct SavePars {
    pub path: PathBuf,
    pub save_function: CallableSpec<Saver>,
}

/// Expected trailing dimensions of output values.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedShape {
    /// `[d1, d2, ..]`: one shape for every value.
    One(Vec<usize>),
    /// `[[..], [..]]`: one shape per entry, in order.
    PerEntry(Vec<Vec<usize>>),
}

impl ExpectedShape {
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| LoaderError::config(format!("output.shape must be a list, got {value}")))?;
        if items.iter().all(JsonValue::is_array) && !items.is_empty() {
            let per_entry = items.iter().map(dims).collect::<Result<_>>()?;
            Ok(ExpectedShape::PerEntry(per_entry))
        } else {
            Ok(ExpectedShape::One(dims(value)?))
        }
    }
}

fn dims(value: &JsonValue) -> Result<Vec<usize>> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .map(|d| {
            d.as_u64()
                .map(|d| d as usize)
                .ok_or_else(|| LoaderError::config(format!("shape entries must be non-negative integers, got {d}")))
        })
        .collect()
}

/// `output` section.
#[derive(Debug, Clone, Default)]
pub struct OutputPars {
    pub out_max_len: Option<usize>,
    pub shape: Option<ExpectedShape>,
    pub format: Option<CallableSpec<Transform>>,
}

// ---------------------------------------------------------------------------
// DataPars – the whole document
// ---------------------------------------------------------------------------

/// Parsed configuration. `raw` keeps the document verbatim for lookups.
#[derive(Debug, Clone, Default)]
pub struct DataPars {
    pub input_pars: Args,
    pub loader: LoaderPars,
    pub preprocessor: Option<CallableSpec<PreprocessorFactory>>,
    pub split_xy: Option<CallableSpec<Transform>>,
    pub save_intermediate_output: Option<SavePars>,
    pub output: Option<OutputPars>,
    pub raw: Args,
}

impl DataPars {
    pub fn from_json(value: JsonValue) -> Result<Self> {
        let JsonValue::Object(raw) = value else {
            return Err(LoaderError::config("data_pars must be a JSON object"));
        };

        let input_pars = match raw.get("input_pars") {
            None => Args::new(),
            Some(JsonValue::Object(m)) => m.clone(),
            Some(other) => {
                return Err(LoaderError::config(format!(
                    "input_pars must be a mapping, got {other}"
                )))
            }
        };

        let mut loader = LoaderPars::default();
        if let Some(section) = present(&raw, "loader") {
            let obj = section
                .as_object()
                .ok_or_else(|| LoaderError::config("loader must be a mapping"))?;
            if let Some(spec) = present(obj, "data_loader") {
                loader.data_loader = Some(CallableSpec::from_json(spec, "loader.data_loader")?);
            }
            loader.chunksize = positive_int(obj.get("chunksize"), "loader.chunksize")?;
        }

        let preprocessor = present(&raw, "preprocessor")
            .map(|v| CallableSpec::from_json(v, "preprocessor"))
            .transpose()?;
        let split_xy = present(&raw, "split_xy")
            .map(|v| CallableSpec::from_json(v, "split_xy"))
            .transpose()?;

        let save_intermediate_output = match present(&raw, "save_intermediate_output") {
            None => None,
            Some(section) => {
                let path = section
                    .get("path")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| LoaderError::config("save_intermediate_output.path is required"))?;
                let func = section.get("save_function").ok_or_else(|| {
                    LoaderError::config("save_intermediate_output.save_function is required")
                })?;
                Some(SavePars {
                    path: PathBuf::from(path),
                    save_function: CallableSpec::from_json(
                        func,
                        "save_intermediate_output.save_function",
                    )?,
                })
            }
        };

        let output = match present(&raw, "output") {
            None => None,
            Some(section) => {
                let obj = section
                    .as_object()
                    .ok_or_else(|| LoaderError::config("output must be a mapping"))?;
                Some(OutputPars {
                    out_max_len: non_negative_int(obj.get("out_max_len"), "output.out_max_len")?,
                    shape: present(obj, "shape").map(ExpectedShape::from_json).transpose()?,
                    format: present(obj, "format")
                        .map(|v| CallableSpec::from_json(v, "output.format"))
                        .transpose()?,
                })
            }
        };

        Ok(DataPars {
            input_pars,
            loader,
            preprocessor,
            split_xy,
            save_intermediate_output,
            output,
            raw,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_json(serde_json::from_str(text)?)
    }

    /// Read a JSON file. `section` selects a nested key such as `data_pars`.
    pub fn from_path(path: &Path, section: Option<&str>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut doc: JsonValue = serde_json::from_reader(std::io::BufReader::new(file))?;
        if let Some(key) = section {
            doc = doc
                .get_mut(key)
                .map(JsonValue::take)
                .ok_or_else(|| LoaderError::config(format!("{} has no `{key}` section", path.display())))?;
        }
        Self::from_json(doc)
    }

    /// Supply the loader function directly instead of by uri.
    pub fn with_loader(mut self, loader: Loader, arg: Args) -> Self {
        self.loader.data_loader = Some(CallableSpec::direct(loader, arg));
        self
    }

    pub fn with_preprocessor(mut self, factory: PreprocessorFactory, arg: Args) -> Self {
        self.preprocessor = Some(CallableSpec::direct(factory, arg));
        self
    }
}

fn present<'a>(map: &'a Args, key: &str) -> Option<&'a JsonValue> {
    map.get(key).filter(|v| !v.is_null())
}

fn positive_int(value: Option<&JsonValue>, what: &str) -> Result<Option<usize>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n > 0 => Ok(Some(n as usize)),
            _ => Err(LoaderError::config(format!(
                "{what} must be a positive integer, got {v}"
            ))),
        },
    }
}

fn non_negative_int(value: Option<&JsonValue>, what: &str) -> Result<Option<usize>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => v.as_u64().map(|n| Some(n as usize)).ok_or_else(|| {
            LoaderError::config(format!("{what} must be a non-negative integer, got {v}"))
        }),
    }
}

// ---------------------------------------------------------------------------
// Argument helpers shared by the built-in callables
// ---------------------------------------------------------------------------

pub fn arg_bool(args: &Args, key: &str) -> anyhow::Result<Option<bool>> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(other) => bail!("argument `{key}` must be a boolean, got {other}"),
    }
}

pub fn arg_usize(args: &Args, key: &str) -> anyhow::Result<Option<usize>> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n > 0 => Ok(Some(n as usize)),
            _ => bail!("argument `{key}` must be a positive integer, got {v}"),
        },
    }
}

/// A column list given either as one string or a list of strings.
pub fn arg_string_list(args: &Args, key: &str) -> anyhow::Result<Option<Vec<String>>> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(vec![s.clone()])),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|i| match i.as_str() {
                Some(s) => Ok(s.to_string()),
                None => bail!("argument `{key}` must list strings, got {i}"),
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Some),
        Some(other) => bail!("argument `{key}` must be a string or list of strings, got {other}"),
    }
}
