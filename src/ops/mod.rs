//! Built-in preprocessors, output formatters and intermediate-output writers.
//!
//! Loaders and splitters live with the data layer in [`crate::data`].

pub mod format;
pub mod preprocess;
pub mod save;
