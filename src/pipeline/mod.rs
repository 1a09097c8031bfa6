//! The `DataLoader` orchestrator.
//!
//! ```text
//!   input_pars ──► interpret ──► source (resolve + load)
//!                                   │
//!                                   ▼
//!                  preprocessor ──► split_xy ──► names ──► context
//!                                                  │
//!                              ┌───────────────────┴──────────┐
//!                              ▼                              ▼
//!                       split (train/test/misc)     save_intermediate_output
//!                              │
//!                              ▼
//!                        shape (truncate, check, format)
//! ```

pub mod interpret;
pub mod shape;
pub mod source;
pub mod split;

use std::collections::HashSet;

use crate::config::{CallableSpec, DataPars};
use crate::context::{Context, Lookup};
use crate::data::output::{Named, Output};
use crate::download::{Download, HttpDownloader};
use crate::error::{LoaderError, Result};
use crate::registry::{Registry, PREPROCESS_IDENTITY};

use self::interpret::{interpret_input_pars, InputFields};
use self::split::SplitResult;

/// Everything a successful `compute()` publishes.
#[derive(Debug, Clone)]
struct Computed {
    intermediate: Output,
    split: Option<SplitResult>,
    final_output: Output,
}

/// Runs one configured load: resolve, load, preprocess, name, split, shape.
pub struct DataLoader {
    pars: DataPars,
    registry: Registry,
    downloader: Box<dyn Download>,
    context: Context,
    state: Option<Computed>,
}

impl DataLoader {
    /// A loader using the built-in registry and an HTTP downloader.
    pub fn new(pars: DataPars) -> Self {
        let context = Context::new(pars.raw.clone());
        DataLoader {
            pars,
            registry: Registry::default(),
            downloader: Box::new(HttpDownloader::new()),
            context,
            state: None,
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_downloader(mut self, downloader: impl Download + 'static) -> Self {
        self.downloader = Box::new(downloader);
        self
    }

    pub fn pars(&self) -> &DataPars {
        &self.pars
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run the whole pipeline. Previous results are discarded first, and
    /// nothing is published unless every phase succeeds.
    pub fn compute(&mut self) -> Result<()> {
        self.state = None;
        self.context = Context::new(self.pars.raw.clone());

        let fields = interpret_input_pars(&self.pars.input_pars)?;
        let loaded = source::load_data(
            &fields,
            &self.pars.loader,
            &self.registry,
            self.downloader.as_ref(),
        )?;
        log::debug!("loaded a {} with {} entries", loaded.case_name(), loaded.len());

        let mut intermediate = self.preprocess(loaded)?;

        if let Some(spec) = &self.pars.split_xy {
            let split_xy = self.registry.resolve(spec)?;
            intermediate = split_xy
                .func
                .call(intermediate, &self.context, &split_xy.args)
                .map_err(|e| LoaderError::callable("split_xy", &split_xy.id, e))?;
        }

        if let Some(names) = &fields.names {
            intermediate = name_outputs(names, intermediate)?;
            self.context = self.context.with_named(named_entries(&intermediate));
        }

        let split = split::split_data(&fields, &intermediate, &self.registry)?;

        if let Some(save) = &self.pars.save_intermediate_output {
            let saver = self.registry.resolve(&save.save_function)?;
            saver
                .func
                .call(&intermediate, &save.path, &self.context, &saver.args)
                .map_err(|e| LoaderError::callable("saver", &saver.id, e))?;
        }

        let (split, final_output) = self.shape(&fields, intermediate.clone(), split)?;
        log::info!(
            "computed {} with {} entries",
            final_output.case_name(),
            final_output.len()
        );

        self.state = Some(Computed {
            intermediate,
            split,
            final_output,
        });
        Ok(())
    }

    fn preprocess(&self, loaded: Output) -> Result<Output> {
        let default_spec = CallableSpec::uri(PREPROCESS_IDENTITY);
        let spec = self.pars.preprocessor.as_ref().unwrap_or(&default_spec);
        let factory = self.registry.resolve(spec)?;
        let wrap = |e| LoaderError::callable("preprocessor", &factory.id, e);

        let mut preprocessor = factory.func.build(&self.context, &factory.args).map_err(wrap)?;
        preprocessor.compute(loaded).map_err(wrap)?;
        preprocessor.get_data().map_err(wrap)
    }

    /// Shape train and test (misc stays as is), or the whole output.
    fn shape(
        &self,
        fields: &InputFields,
        intermediate: Output,
        split: Option<SplitResult>,
    ) -> Result<(Option<SplitResult>, Output)> {
        let shape_one = |data: Output| match &self.pars.output {
            Some(pars) => shape::shape_output(data, pars, &self.registry, &self.context),
            None => Ok(data),
        };

        match split {
            None => Ok((None, shape_one(intermediate)?)),
            Some(raw) => {
                let shaped = SplitResult {
                    train: shape_one(raw.train.clone())?,
                    test: shape_one(raw.test.clone())?,
                    misc: raw.misc.clone(),
                };
                let flat = flatten(&shaped)?;
                log::debug!(
                    "split `{}` into {} train, {} test and {} misc entries",
                    fields.path,
                    shaped.train.len(),
                    shaped.test.len(),
                    shaped.misc.len()
                );
                Ok((Some(raw), flat))
            }
        }
    }

    /// Published output.
    ///
    /// `intermediate = true` gives the unshaped data: the split partitions
    /// flattened in train, test, misc order when a split happened, else the
    /// values of a named output in order, else the output as it was.
    pub fn get_data(&self, intermediate: bool) -> Result<Output> {
        let state = self.state.as_ref().ok_or(LoaderError::NotComputed)?;
        if !intermediate {
            return Ok(state.final_output.clone());
        }
        if let Some(split) = &state.split {
            return flatten(split);
        }
        Ok(match &state.intermediate {
            Output::Map(named) => Output::Sequence(named.values().cloned().collect()),
            Output::MapOfMaps(named) => Output::SequenceOfMaps(named.values().cloned().collect()),
            other => other.clone(),
        })
    }

    /// The unshaped split partitions, if the last `compute()` split.
    pub fn split(&self) -> Option<&SplitResult> {
        self.state.as_ref().and_then(|s| s.split.as_ref())
    }

    /// Named outputs first, then top-level configuration keys.
    pub fn get(&self, key: &str) -> Option<Lookup<'_>> {
        self.context.get(key)
    }
}

fn flatten(split: &SplitResult) -> Result<Output> {
    Output::concat(split.parts()).ok_or_else(|| {
        LoaderError::Unsupported("split partitions mix values and mappings".into())
    })
}

/// Zip positional outputs with `names`; already-named outputs are re-keyed.
pub fn name_outputs(names: &[String], data: Output) -> Result<Output> {
    if data.len() != names.len() {
        return Err(LoaderError::Naming(format!(
            "{} names given for {} outputs",
            names.len(),
            data.len()
        )));
    }
    if let Some(dup) = first_duplicate(names) {
        return Err(LoaderError::Naming(format!("output name `{dup}` given twice")));
    }
    let names = names.iter().cloned();
    match data {
        Output::Single(_) => Err(LoaderError::Naming(
            "a single output has no positions to name".into(),
        )),
        Output::Sequence(values) => Ok(Output::Map(names.zip(values).collect())),
        Output::Map(named) => Ok(Output::Map(names.zip(named.into_values()).collect())),
        Output::SequenceOfMaps(records) => Ok(Output::MapOfMaps(names.zip(records).collect())),
        Output::MapOfMaps(named) => Ok(Output::MapOfMaps(names.zip(named.into_values()).collect())),
    }
}

/// First name that appears more than once.
pub(crate) fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .find(|name| !seen.insert(*name))
}

/// Context entries for a named output.
fn named_entries(data: &Output) -> Named<Output> {
    match data {
        Output::Map(named) => named
            .iter()
            .map(|(k, v)| (k.to_string(), Output::Single(v.clone())))
            .collect(),
        Output::MapOfMaps(named) => named
            .iter()
            .map(|(k, r)| (k.to_string(), Output::Map(r.clone())))
            .collect(),
        _ => Named::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Scalar, Value};
    use crate::data::output::Record;

    fn int(i: i64) -> Value {
        Value::Scalar(Scalar::Integer(i))
    }

    fn names(ns: &[&str]) -> Vec<String> {
        ns.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn names_zip_sequences_into_maps() {
        let out = name_outputs(&names(&["X", "Y"]), Output::Sequence(vec![int(1), int(2)])).unwrap();
        let Output::Map(named) = out else { panic!("expected map") };
        assert_eq!(named.get("Y"), Some(&int(2)));
    }

    #[test]
    fn names_rekey_existing_maps_positionally() {
        let named: Record = [("a".to_string(), int(1)), ("b".to_string(), int(2))]
            .into_iter()
            .collect();
        let out = name_outputs(&names(&["X", "Y"]), Output::Map(named)).unwrap();
        let Output::Map(named) = out else { panic!("expected map") };
        assert_eq!(named.keys().collect::<Vec<_>>(), vec!["X", "Y"]);
    }

    #[test]
    fn names_zip_records_into_map_of_maps() {
        let rec: Record = [("lr".to_string(), int(1))].into_iter().collect();
        let out = name_outputs(&names(&["params"]), Output::SequenceOfMaps(vec![rec])).unwrap();
        assert!(matches!(out, Output::MapOfMaps(_)));
    }

    #[test]
    fn naming_errors() {
        let err = name_outputs(&names(&["X", "Y", "Z"]), Output::Sequence(vec![int(1), int(2)]));
        assert!(matches!(err, Err(LoaderError::Naming(_))));
        let err = name_outputs(&names(&["X"]), Output::Single(int(1)));
        assert!(matches!(err, Err(LoaderError::Naming(_))));
    }

    #[test]
    fn repeated_names_are_rejected_not_merged() {
        let err = name_outputs(&names(&["X", "X"]), Output::Sequence(vec![int(1), int(2)]));
        assert!(matches!(err, Err(LoaderError::Naming(msg)) if msg.contains("`X`")));
    }

    #[test]
    fn get_data_before_compute_fails() {
        let loader = DataLoader::new(DataPars::default());
        assert!(matches!(loader.get_data(false), Err(LoaderError::NotComputed)));
        assert!(matches!(loader.get_data(true), Err(LoaderError::NotComputed)));
    }

    #[test]
    fn failed_compute_publishes_nothing() {
        let mut loader = DataLoader::new(DataPars::default());
        assert!(matches!(loader.compute(), Err(LoaderError::Configuration(_))));
        assert!(matches!(loader.get_data(false), Err(LoaderError::NotComputed)));
    }
}
