//! Registry of pluggable callables, addressed by `<namespace>::<name>`.
//!
//! Configuration never names code directly: every uri is looked up here and
//! an unknown uri is an error. `Registry::default()` holds the built-ins;
//! callers may register their own functions or replace built-ins.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Args, CallableSpec};
use crate::context::Context;
use crate::data::model::{Source, Value};
use crate::data::output::Output;
use crate::data::{loader, split};
use crate::error::{LoaderError, Result};
use crate::ops::{format, preprocess, save};
use crate::ops::preprocess::Preprocessor;

pub const CSV_READ: &str = "csv::read";
pub const NPY_LOAD: &str = "npy::load";
pub const PICKLE_LOAD: &str = "pickle::load";
pub const PARQUET_READ: &str = "parquet::read";
pub const JSON_READ: &str = "json::read";
pub const IMAGE_READ_DIR: &str = "image::read_dir";
pub const PREPROCESS_IDENTITY: &str = "preprocess::identity";
pub const PREPROCESS_TO_ARRAY: &str = "preprocess::to_array";
pub const SPLIT_XY_COLUMNS: &str = "split_xy::columns";
pub const FORMAT_TO_ARRAY: &str = "format::to_array";
pub const FORMAT_FIRST: &str = "format::first";
pub const TRAIN_TEST_SPLIT: &str = "split::train_test_split";
pub const SAVE_PICKLE: &str = "save::pickle";
pub const SAVE_NPZ: &str = "save::npz";

/// Identity reported for callables passed directly rather than by uri.
pub const DIRECT: &str = "<direct>";

// ---------------------------------------------------------------------------
// Callable kinds
// ---------------------------------------------------------------------------

type LoaderFn = dyn Fn(&Source, &Args) -> anyhow::Result<Output> + Send + Sync;
type PreprocessorFn = dyn Fn(&Context, &Args) -> anyhow::Result<Box<dyn Preprocessor>> + Send + Sync;
type TransformFn = dyn Fn(Output, &Context, &Args) -> anyhow::Result<Output> + Send + Sync;
type SplitterFn = dyn Fn(Vec<Value>, &Args) -> anyhow::Result<Vec<Value>> + Send + Sync;
type SaverFn = dyn Fn(&Output, &Path, &Context, &Args) -> anyhow::Result<()> + Send + Sync;

/// Reads a source into memory.
#[derive(Clone)]
pub struct Loader(Arc<LoaderFn>);

impl Loader {
    pub fn new(
        f: impl Fn(&Source, &Args) -> anyhow::Result<Output> + Send + Sync + 'static,
    ) -> Self {
        Loader(Arc::new(f))
    }

    pub fn call(&self, source: &Source, args: &Args) -> anyhow::Result<Output> {
        (self.0)(source, args)
    }
}

/// Builds a preprocessor from the context and its static args.
#[derive(Clone)]
pub struct PreprocessorFactory(Arc<PreprocessorFn>);

impl PreprocessorFactory {
    pub fn new(
        f: impl Fn(&Context, &Args) -> anyhow::Result<Box<dyn Preprocessor>> + Send + Sync + 'static,
    ) -> Self {
        PreprocessorFactory(Arc::new(f))
    }

    pub fn build(&self, context: &Context, args: &Args) -> anyhow::Result<Box<dyn Preprocessor>> {
        (self.0)(context, args)
    }
}

/// Output → output; used for `split_xy` and `output.format`.
#[derive(Clone)]
pub struct Transform(Arc<TransformFn>);

impl Transform {
    pub fn new(
        f: impl Fn(Output, &Context, &Args) -> anyhow::Result<Output> + Send + Sync + 'static,
    ) -> Self {
        Transform(Arc::new(f))
    }

    pub fn call(&self, data: Output, context: &Context, args: &Args) -> anyhow::Result<Output> {
        (self.0)(data, context, args)
    }
}

/// N fields in, 2·N partitions out (N train then N test).
#[derive(Clone)]
pub struct Splitter(Arc<SplitterFn>);

impl Splitter {
    pub fn new(
        f: impl Fn(Vec<Value>, &Args) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    ) -> Self {
        Splitter(Arc::new(f))
    }

    pub fn call(&self, fields: Vec<Value>, args: &Args) -> anyhow::Result<Vec<Value>> {
        (self.0)(fields, args)
    }
}

/// Persists an intermediate output.
#[derive(Clone)]
pub struct Saver(Arc<SaverFn>);

impl Saver {
    pub fn new(
        f: impl Fn(&Output, &Path, &Context, &Args) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Saver(Arc::new(f))
    }

    pub fn call(&self, data: &Output, path: &Path, context: &Context, args: &Args) -> anyhow::Result<()> {
        (self.0)(data, path, context, args)
    }
}

/// Any registered callable.
#[derive(Clone)]
pub enum Callable {
    Loader(Loader),
    Preprocessor(PreprocessorFactory),
    Transform(Transform),
    Splitter(Splitter),
    Saver(Saver),
}

impl Callable {
    pub fn kind(&self) -> &'static str {
        match self {
            Callable::Loader(_) => Loader::KIND,
            Callable::Preprocessor(_) => PreprocessorFactory::KIND,
            Callable::Transform(_) => Transform::KIND,
            Callable::Splitter(_) => Splitter::KIND,
            Callable::Saver(_) => Saver::KIND,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable::{}", self.kind())
    }
}

/// Ties each newtype to its `Callable` variant.
pub trait CallableKind: Clone + Sized {
    const KIND: &'static str;
    fn from_callable(callable: &Callable) -> Option<Self>;
    fn into_callable(self) -> Callable;
}

macro_rules! callable_kind {
    ($ty:ident, $variant:ident, $kind:literal) => {
        impl CallableKind for $ty {
            const KIND: &'static str = $kind;

            fn from_callable(callable: &Callable) -> Option<Self> {
                match callable {
                    Callable::$variant(f) => Some(f.clone()),
                    _ => None,
                }
            }

            fn into_callable(self) -> Callable {
                Callable::$variant(self)
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(..)", stringify!($ty))
            }
        }
    };
}

callable_kind!(Loader, Loader, "loader");
callable_kind!(PreprocessorFactory, Preprocessor, "preprocessor");
callable_kind!(Transform, Transform, "transform");
callable_kind!(Splitter, Splitter, "splitter");
callable_kind!(Saver, Saver, "saver");

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A resolved callable with its merged static args.
#[derive(Debug, Clone)]
pub struct Resolved<F> {
    /// The uri it was resolved from, or [`DIRECT`].
    pub id: String,
    pub func: F,
    pub args: Args,
}

#[derive(Debug, Clone)]
pub struct Registry {
    entries: HashMap<String, Callable>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Registry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Registry {
            entries: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut r = Registry::empty();

        r.register(CSV_READ, Loader::new(loader::read_csv));
        r.register(NPY_LOAD, Loader::new(loader::load_npy));
        r.register(PICKLE_LOAD, Loader::new(loader::load_pickle));
        r.register(PARQUET_READ, Loader::new(loader::read_parquet));
        r.register(JSON_READ, Loader::new(loader::read_json));
        r.register(IMAGE_READ_DIR, Loader::new(loader::read_image_dir));

        r.register(PREPROCESS_IDENTITY, PreprocessorFactory::new(preprocess::identity));
        r.register(PREPROCESS_TO_ARRAY, PreprocessorFactory::new(preprocess::to_array));

        r.register(SPLIT_XY_COLUMNS, Transform::new(split::split_columns));
        r.register(FORMAT_TO_ARRAY, Transform::new(format::to_array));
        r.register(FORMAT_FIRST, Transform::new(format::first));

        r.register(TRAIN_TEST_SPLIT, Splitter::new(split::train_test_split));

        r.register(SAVE_PICKLE, Saver::new(save::pickle));
        r.register(SAVE_NPZ, Saver::new(save::npz));

        r
    }

    /// Add or replace an entry. Returns the entry it replaced.
    pub fn register<F: CallableKind>(&mut self, uri: &str, func: F) -> Option<Callable> {
        self.entries.insert(uri.to_string(), func.into_callable())
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    /// Registered uris, sorted.
    pub fn uris(&self) -> Vec<&str> {
        let mut uris: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        uris.sort_unstable();
        uris
    }

    /// Look up `uri` as a callable of kind `F`.
    ///
    /// Unknown or malformed uris are resolution errors; a uri naming a
    /// callable of another kind is a configuration error.
    pub fn lookup<F: CallableKind>(&self, uri: &str) -> Result<F> {
        match uri.split_once("::") {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => {}
            _ => {
                return Err(LoaderError::Resolution {
                    uri: uri.to_string(),
                    reason: "expected `<namespace>::<name>`".into(),
                })
            }
        }
        let callable = self.entries.get(uri).ok_or_else(|| LoaderError::Resolution {
            uri: uri.to_string(),
            reason: "no callable registered under this name".into(),
        })?;
        F::from_callable(callable).ok_or_else(|| {
            LoaderError::config(format!(
                "`{uri}` is a {}, not a {}",
                callable.kind(),
                F::KIND
            ))
        })
    }

    /// Resolve a specification to a callable plus its static args.
    pub fn resolve<F: CallableKind>(&self, spec: &CallableSpec<F>) -> Result<Resolved<F>> {
        match spec {
            CallableSpec::Direct { func, arg } => Ok(Resolved {
                id: DIRECT.to_string(),
                func: func.clone(),
                args: arg.clone(),
            }),
            CallableSpec::Registry { uri: Some(uri), arg } => Ok(Resolved {
                id: uri.clone(),
                func: self.lookup(uri)?,
                args: arg.clone(),
            }),
            CallableSpec::Registry { uri: None, .. } => Err(LoaderError::Resolution {
                uri: String::new(),
                reason: format!("{} specification has no uri", F::KIND),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let r = Registry::default();
        for uri in [CSV_READ, NPY_LOAD, PICKLE_LOAD, IMAGE_READ_DIR, TRAIN_TEST_SPLIT, SAVE_PICKLE] {
            assert!(r.contains(uri), "{uri} missing");
        }
    }

    #[test]
    fn unknown_uri_fails_closed() {
        let r = Registry::default();
        assert!(matches!(
            r.lookup::<Loader>("pandas::read_excel"),
            Err(LoaderError::Resolution { .. })
        ));
        assert!(matches!(
            r.lookup::<Loader>("read_csv"),
            Err(LoaderError::Resolution { .. })
        ));
    }

    #[test]
    fn wrong_kind_is_configuration_error() {
        let r = Registry::default();
        assert!(matches!(
            r.lookup::<Loader>(TRAIN_TEST_SPLIT),
            Err(LoaderError::Configuration(_))
        ));
    }

    #[test]
    fn register_replaces_builtin() {
        let mut r = Registry::default();
        let previous = r.register(CSV_READ, Loader::new(|_, _| anyhow::bail!("stub")));
        assert!(matches!(previous, Some(Callable::Loader(_))));

        let spec = CallableSpec::uri(CSV_READ);
        let resolved: Resolved<Loader> = r.resolve(&spec).unwrap();
        assert_eq!(resolved.id, CSV_READ);
        let source = Source::Path("x.csv".into());
        assert!(resolved.func.call(&source, &Args::new()).is_err());
    }

    #[test]
    fn direct_specs_resolve_without_lookup() {
        let r = Registry::empty();
        let spec = CallableSpec::direct(
            Transform::new(|data, _, _| Ok(data)),
            Args::new(),
        );
        assert_eq!(r.resolve(&spec).unwrap().id, DIRECT);
    }
}
