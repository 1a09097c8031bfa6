//! Configuration-driven data loading.
//!
//! A [`DataLoader`] reads a JSON-style configuration, loads the source it
//! names with a registered loader, runs it through a preprocessor, names and
//! splits the result, and shapes the final output.

pub mod config;
pub mod context;
pub mod data;
pub mod download;
pub mod error;
pub mod ops;
pub mod pipeline;
pub mod registry;

pub use config::{Args, CallableSpec, DataPars};
pub use context::{Context, Lookup};
pub use data::model::{Frame, Scalar, Source, Value};
pub use data::output::{Named, Output, Record};
pub use download::{Download, HttpDownloader};
pub use error::{LoaderError, Result};
pub use pipeline::split::SplitResult;
pub use pipeline::DataLoader;
pub use registry::Registry;
