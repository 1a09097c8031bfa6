use anyhow::anyhow;

use super::interpret::InputFields;
use crate::data::model::Value;
use crate::data::output::{Output, Record};
use crate::error::{LoaderError, Result};
use crate::registry::Registry;

/// Partitions produced by the split engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    pub train: Output,
    pub test: Output,
    pub misc: Output,
}

impl SplitResult {
    pub fn parts(&self) -> [&Output; 3] {
        [&self.train, &self.test, &self.misc]
    }
}

/// Split `data` into train/test/misc, or `None` when no split is configured.
pub fn split_data(
    fields: &InputFields,
    data: &Output,
    registry: &Registry,
) -> Result<Option<SplitResult>> {
    if !fields.wants_split() {
        return Ok(None);
    }
    let keyed = fields.names.is_some() && matches!(data, Output::Map(_));

    let (names, selected) = select_fields(fields.split_outputs.as_deref(), data)?;
    let n = selected.len();

    let splitter = registry.resolve(&fields.split_function.spec)?;
    let mut args = splitter.args.clone();
    if let Some(size) = &fields.test_size {
        args.insert(fields.split_function.size_arg.clone(), size.clone());
    }

    let mut parts = splitter
        .func
        .call(selected, &args)
        .map_err(|e| LoaderError::callable("splitter", &splitter.id, e))?;
    if parts.len() != 2 * n {
        return Err(LoaderError::callable(
            "splitter",
            &splitter.id,
            anyhow!("returned {} partitions for {n} fields, expected {}", parts.len(), 2 * n),
        ));
    }
    let test = parts.split_off(n);
    let train = parts;

    log::info!(
        "split {n} field(s) with `{}`: {:?} train rows, {:?} test rows",
        splitter.id,
        train.first().and_then(Value::n_rows),
        test.first().and_then(Value::n_rows)
    );

    let (train, test) = if keyed {
        (
            Output::Map(suffixed(&names, "_train", train)),
            Output::Map(suffixed(&names, "_test", test)),
        )
    } else {
        (Output::Sequence(train), Output::Sequence(test))
    };

    let misc = match &fields.misc_outputs {
        None => Output::Sequence(Vec::new()),
        Some(misc_names) => select_misc(misc_names, data, keyed)?,
    };

    Ok(Some(SplitResult { train, test, misc }))
}

/// Names (empty when positional) and values of the fields to split.
fn select_fields(split_outputs: Option<&[String]>, data: &Output) -> Result<(Vec<String>, Vec<Value>)> {
    match (split_outputs, data) {
        (Some(wanted), Output::Map(named)) => {
            let mut values = Vec::with_capacity(wanted.len());
            for name in wanted {
                let value = named.get(name).ok_or_else(|| {
                    LoaderError::config(format!("split_outputs names unknown output `{name}`"))
                })?;
                values.push(value.clone());
            }
            Ok((wanted.to_vec(), values))
        }
        (Some(_), Output::Single(_) | Output::Sequence(_)) => Err(LoaderError::config(format!(
            "split_outputs needs named outputs, got a {}",
            data.case_name()
        ))),
        (None, Output::Single(v)) => Ok((Vec::new(), vec![v.clone()])),
        (None, Output::Sequence(vs)) => Ok((Vec::new(), vs.clone())),
        (None, Output::Map(named)) => Ok((
            named.keys().map(str::to_string).collect(),
            named.values().cloned().collect(),
        )),
        (_, Output::SequenceOfMaps(_) | Output::MapOfMaps(_)) => Err(LoaderError::Unsupported(
            format!("splitting a {}", data.case_name()),
        )),
    }
}

fn suffixed(names: &[String], suffix: &str, values: Vec<Value>) -> Record {
    names
        .iter()
        .map(|n| format!("{n}{suffix}"))
        .zip(values)
        .collect()
}

/// Unsplit entries, keeping the mapping shape only when outputs were named.
fn select_misc(misc_names: &[String], data: &Output, keyed: bool) -> Result<Output> {
    let Output::Map(named) = data else {
        return Err(LoaderError::config(format!(
            "misc_outputs needs named outputs, got a {}",
            data.case_name()
        )));
    };
    let mut picked = Record::new();
    for name in misc_names {
        let value = named.get(name).ok_or_else(|| {
            LoaderError::config(format!("misc_outputs names unknown output `{name}`"))
        })?;
        picked.insert(name.clone(), value.clone());
    }
    Ok(if keyed {
        Output::Map(picked)
    } else {
        Output::Sequence(picked.into_values())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::interpret::interpret_input_pars;
    use crate::registry::Splitter;
    use ndarray::Array;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> InputFields {
        interpret_input_pars(v.as_object().unwrap()).unwrap()
    }

    fn rows(n: usize, cols: usize) -> Value {
        Value::Array(Array::<f64, _>::zeros((n, cols)).into_dyn())
    }

    fn named(entries: &[(&str, Value)]) -> Output {
        Output::Map(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn no_test_size_means_no_split() {
        let f = fields(json!({"path": "x.csv", "path_type": "file"}));
        assert_eq!(split_data(&f, &Output::Single(rows(5, 1)), &Registry::default()).unwrap(), None);
    }

    #[test]
    fn named_outputs_are_rekeyed_and_misc_carried() {
        let f = fields(json!({
            "path": "x.csv", "path_type": "file", "test_size": 0.2,
            "names": ["X", "Y", "ids"],
            "split_outputs": ["X", "Y"], "misc_outputs": ["ids"]
        }));
        let data = named(&[("X", rows(10, 3)), ("Y", rows(10, 1)), ("ids", rows(4, 1))]);
        let split = split_data(&f, &data, &Registry::default()).unwrap().unwrap();

        let Output::Map(train) = &split.train else { panic!("train should be named") };
        assert_eq!(train.keys().collect::<Vec<_>>(), vec!["X_train", "Y_train"]);
        assert_eq!(train.get("X_train").and_then(Value::n_rows), Some(8));
        let Output::Map(test) = &split.test else { panic!("test should be named") };
        assert_eq!(test.keys().collect::<Vec<_>>(), vec!["X_test", "Y_test"]);
        let Output::Map(misc) = &split.misc else { panic!("misc should be named") };
        assert_eq!(misc.get("ids").and_then(Value::n_rows), Some(4));
    }

    #[test]
    fn positional_outputs_stay_sequences() {
        let f = fields(json!({"path": "x.csv", "path_type": "file", "test_size": 2}));
        let data = Output::Sequence(vec![rows(6, 2), rows(6, 1)]);
        let split = split_data(&f, &data, &Registry::default()).unwrap().unwrap();
        let Output::Sequence(test) = &split.test else { panic!("expected sequence") };
        assert_eq!(test.len(), 2);
        assert_eq!(test[0].n_rows(), Some(2));
        assert_eq!(split.misc, Output::Sequence(vec![]));
    }

    #[test]
    fn split_outputs_need_names() {
        let f = fields(json!({
            "path": "x.csv", "path_type": "file", "test_size": 0.5, "split_outputs": ["X"]
        }));
        let err = split_data(&f, &Output::Sequence(vec![rows(4, 1)]), &Registry::default());
        assert!(matches!(err, Err(LoaderError::Configuration(_))));
    }

    #[test]
    fn splitter_must_return_two_partitions_per_field() {
        let mut registry = Registry::default();
        registry.register("test::broken", Splitter::new(|fields, _| Ok(fields)));
        let f = fields(json!({
            "path": "x.csv", "path_type": "file", "test_size": 0.5,
            "split_function": [{"uri": "test::broken"}, "test_size"]
        }));
        let err = split_data(&f, &Output::Single(rows(4, 1)), &registry);
        assert!(matches!(err, Err(LoaderError::Callable { stage: "splitter", .. })));
    }

    #[test]
    fn size_argument_name_is_configurable() {
        let mut registry = Registry::default();
        registry.register(
            "test::by_fraction",
            Splitter::new(|fields, args| {
                assert_eq!(args.get("fraction"), Some(&json!(0.5)));
                assert_eq!(args.get("seed"), Some(&json!(3)));
                Ok(fields.iter().chain(fields.iter()).cloned().collect())
            }),
        );
        let f = fields(json!({
            "path": "x.csv", "path_type": "file", "test_size": 0.5,
            "split_function": [{"uri": "test::by_fraction", "arg": {"seed": 3}}, "fraction"]
        }));
        assert!(split_data(&f, &Output::Single(rows(4, 1)), &registry).unwrap().is_some());
    }
}
