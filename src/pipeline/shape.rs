use crate::config::{ExpectedShape, OutputPars};
use crate::context::Context;
use crate::data::model::Value;
use crate::data::output::Output;
use crate::error::{LoaderError, Result};
use crate::registry::Registry;

/// Run `attempt`; on failure log it and keep `original` unchanged.
pub fn attempt_or_keep<T: Clone>(
    original: &T,
    what: &str,
    attempt: impl FnOnce(&T) -> anyhow::Result<T>,
) -> T {
    match attempt(original) {
        Ok(next) => next,
        Err(e) => {
            log::debug!("{what} skipped: {e:#}");
            original.clone()
        }
    }
}

/// Truncate, validate and format one output according to `pars`.
pub fn shape_output(
    data: Output,
    pars: &OutputPars,
    registry: &Registry,
    context: &Context,
) -> Result<Output> {
    let mut data = data;

    if let Some(max_len) = pars.out_max_len {
        data = attempt_or_keep(&data, "out_max_len truncation", |d| {
            d.map_values(|v| v.truncate(max_len))
        });
    }

    if let Some(expected) = &pars.shape {
        check_shape(&data, expected)?;
    }

    if let Some(spec) = &pars.format {
        let formatter = registry.resolve(spec)?;
        data = formatter
            .func
            .call(data, context, &formatter.args)
            .map_err(|e| LoaderError::callable("formatter", &formatter.id, e))?;
    }
    Ok(data)
}

/// Compare trailing dimensions (`shape[1..]`) of every value.
pub fn check_shape(data: &Output, expected: &ExpectedShape) -> Result<()> {
    match (data, expected) {
        (Output::MapOfMaps(_), _) => Ok(()),
        (Output::SequenceOfMaps(_), _) => Err(LoaderError::Unsupported(
            "shape check on a sequence of mappings".into(),
        )),
        (Output::Single(_), ExpectedShape::PerEntry(_)) => Err(LoaderError::Unsupported(
            "per-entry shapes for a single value".into(),
        )),
        (_, ExpectedShape::One(dims)) => {
            for value in data.values().unwrap_or_default() {
                check_value(value, dims)?;
            }
            Ok(())
        }
        (_, ExpectedShape::PerEntry(per_entry)) => {
            let values = data.values().unwrap_or_default();
            if values.len() != per_entry.len() {
                return Err(LoaderError::Unsupported(format!(
                    "{} per-entry shapes for {} outputs",
                    per_entry.len(),
                    values.len()
                )));
            }
            for (value, dims) in values.into_iter().zip(per_entry) {
                check_value(value, dims)?;
            }
            Ok(())
        }
    }
}

fn check_value(value: &Value, expected: &[usize]) -> Result<()> {
    let Some(shape) = value.shape() else {
        return Ok(());
    };
    let trailing = shape.get(1..).unwrap_or_default();
    if trailing != expected {
        return Err(LoaderError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: trailing.to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Scalar, Source};
    use crate::data::output::Record;
    use crate::data::stream::Stream;
    use ndarray::Array;

    fn rows(n: usize, cols: usize) -> Value {
        Value::Array(Array::<f64, _>::zeros((n, cols)).into_dyn())
    }

    fn pars(out_max_len: Option<usize>, shape: Option<ExpectedShape>) -> OutputPars {
        OutputPars {
            out_max_len,
            shape,
            format: None,
        }
    }

    #[test]
    fn truncates_every_value() {
        let data = Output::Sequence(vec![rows(10, 2), rows(10, 1)]);
        let out = shape_output(data, &pars(Some(4), None), &Registry::default(), &Context::default())
            .unwrap();
        let Output::Sequence(vs) = out else { panic!("expected sequence") };
        assert!(vs.iter().all(|v| v.n_rows() == Some(4)));
    }

    #[test]
    fn zero_max_len_empties_every_value() {
        let data = Output::Sequence(vec![rows(10, 2), rows(3, 1)]);
        let out = shape_output(data, &pars(Some(0), None), &Registry::default(), &Context::default())
            .unwrap();
        let Output::Sequence(vs) = out else { panic!("expected sequence") };
        assert_eq!(vs.len(), 2);
        assert!(vs.iter().all(|v| v.n_rows() == Some(0)));
    }

    #[test]
    fn truncation_is_all_or_nothing() {
        let stream = Value::Stream(Stream::CsvChunks {
            source: Source::Path("x.csv".into()),
            chunksize: 2,
            delimiter: b',',
            has_headers: true,
        });
        let data = Output::Sequence(vec![rows(10, 2), stream]);
        let out = shape_output(data.clone(), &pars(Some(4), None), &Registry::default(), &Context::default())
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn flat_shape_checks_trailing_dims() {
        let data = Output::Single(rows(7, 3));
        assert!(check_shape(&data, &ExpectedShape::One(vec![3])).is_ok());
        match check_shape(&data, &ExpectedShape::One(vec![5])) {
            Err(LoaderError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, vec![5]);
                assert_eq!(actual, vec![3]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn per_entry_shapes_pair_positionally() {
        let named: Record = [("X".to_string(), rows(4, 3)), ("Y".to_string(), rows(4, 1))]
            .into_iter()
            .collect();
        let data = Output::Map(named);
        assert!(check_shape(&data, &ExpectedShape::PerEntry(vec![vec![3], vec![1]])).is_ok());
        assert!(matches!(
            check_shape(&data, &ExpectedShape::PerEntry(vec![vec![1], vec![3]])),
            Err(LoaderError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            check_shape(&data, &ExpectedShape::PerEntry(vec![vec![3]])),
            Err(LoaderError::Unsupported(_))
        ));
    }

    #[test]
    fn unsupported_combinations() {
        let single = Output::Single(rows(2, 2));
        assert!(matches!(
            check_shape(&single, &ExpectedShape::PerEntry(vec![vec![2]])),
            Err(LoaderError::Unsupported(_))
        ));
        let records = Output::SequenceOfMaps(vec![Record::new()]);
        assert!(matches!(
            check_shape(&records, &ExpectedShape::One(vec![2])),
            Err(LoaderError::Unsupported(_))
        ));
    }

    #[test]
    fn shapeless_values_are_skipped() {
        let data = Output::Sequence(vec![Value::Scalar(Scalar::Integer(3)), rows(2, 5)]);
        assert!(check_shape(&data, &ExpectedShape::One(vec![5])).is_ok());
    }

    #[test]
    fn format_replaces_output() {
        let data = Output::Sequence(vec![rows(3, 2)]);
        let mut p = pars(None, None);
        p.format = Some(crate::config::CallableSpec::uri(crate::registry::FORMAT_FIRST));
        let out = shape_output(data, &p, &Registry::default(), &Context::default()).unwrap();
        assert_eq!(out, Output::Single(rows(3, 2)));
    }
}
