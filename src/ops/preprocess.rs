use anyhow::{bail, Result};

use crate::config::Args;
use crate::context::Context;
use crate::data::model::Value;
use crate::data::output::Output;

/// Turns loaded data into model-ready data.
///
/// Built by a `PreprocessorFactory` with the pipeline context, fed once with
/// `compute`, then read back with `get_data`.
pub trait Preprocessor {
    fn compute(&mut self, data: Output) -> Result<()>;

    /// Processed data; fails if `compute` has not run.
    fn get_data(&self) -> Result<Output>;
}

// ---------------------------------------------------------------------------
// preprocess::identity
// ---------------------------------------------------------------------------

/// Hands loaded data through untouched. Used when no preprocessor is set.
#[derive(Debug, Default)]
pub struct Passthrough {
    data: Option<Output>,
}

impl Preprocessor for Passthrough {
    fn compute(&mut self, data: Output) -> Result<()> {
        self.data = Some(data);
        Ok(())
    }

    fn get_data(&self) -> Result<Output> {
        match &self.data {
            Some(d) => Ok(d.clone()),
            None => bail!("preprocessor has not been computed"),
        }
    }
}

pub fn identity(_context: &Context, _args: &Args) -> Result<Box<dyn Preprocessor>> {
    Ok(Box::new(Passthrough::default()))
}

// ---------------------------------------------------------------------------
// preprocess::to_array
// ---------------------------------------------------------------------------

/// Converts every frame to a numeric array. Arrays pass through; other
/// values are rejected unless `skip_non_numeric` is set.
#[derive(Debug, Default)]
pub struct ToArray {
    skip_non_numeric: bool,
    data: Option<Output>,
}

impl ToArray {
    fn convert(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Frame(f) => match f.to_array() {
                Ok(a) => Ok(Value::Array(a.into_dyn())),
                Err(_) if self.skip_non_numeric => Ok(value.clone()),
                Err(e) => Err(e),
            },
            Value::Array(_) => Ok(value.clone()),
            other if self.skip_non_numeric => Ok(other.clone()),
            other => bail!("cannot convert a {} value to an array", other.kind()),
        }
    }
}

impl Preprocessor for ToArray {
    fn compute(&mut self, data: Output) -> Result<()> {
        let converted = match &data {
            Output::SequenceOfMaps(records) => Output::SequenceOfMaps(
                records
                    .iter()
                    .map(|r| r.try_map(|v| self.convert(v)))
                    .collect::<Result<_>>()?,
            ),
            Output::MapOfMaps(named) => {
                Output::MapOfMaps(named.try_map(|r| r.try_map(|v| self.convert(v)))?)
            }
            other => other.map_values(|v| self.convert(v))?,
        };
        self.data = Some(converted);
        Ok(())
    }

    fn get_data(&self) -> Result<Output> {
        match &self.data {
            Some(d) => Ok(d.clone()),
            None => bail!("preprocessor has not been computed"),
        }
    }
}

pub fn to_array(_context: &Context, args: &Args) -> Result<Box<dyn Preprocessor>> {
    Ok(Box::new(ToArray {
        skip_non_numeric: crate::config::arg_bool(args, "skip_non_numeric")?.unwrap_or(false),
        data: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Frame, Scalar};

    fn frame() -> Value {
        Value::Frame(Frame::new(
            vec!["a".into()],
            vec![vec![Scalar::Integer(1)], vec![Scalar::Float(2.5)]],
        ))
    }

    #[test]
    fn passthrough_requires_compute() {
        let mut p = identity(&Context::default(), &Args::new()).unwrap();
        assert!(p.get_data().is_err());
        p.compute(Output::Single(frame())).unwrap();
        assert_eq!(p.get_data().unwrap(), Output::Single(frame()));
    }

    #[test]
    fn to_array_converts_frames() {
        let mut p = to_array(&Context::default(), &Args::new()).unwrap();
        p.compute(Output::Sequence(vec![frame(), frame()])).unwrap();
        let Output::Sequence(values) = p.get_data().unwrap() else {
            panic!("shape changed");
        };
        assert!(values.iter().all(|v| matches!(v, Value::Array(_))));
        assert_eq!(values[0].shape(), Some(vec![2, 1]));
    }

    #[test]
    fn to_array_rejects_text_unless_skipped() {
        let text = Value::Frame(Frame::new(
            vec!["s".into()],
            vec![vec![Scalar::String("x".into())]],
        ));
        let mut strict = to_array(&Context::default(), &Args::new()).unwrap();
        assert!(strict.compute(Output::Single(text.clone())).is_err());

        let mut args = Args::new();
        args.insert("skip_non_numeric".into(), true.into());
        let mut lenient = to_array(&Context::default(), &args).unwrap();
        lenient.compute(Output::Single(text.clone())).unwrap();
        assert_eq!(lenient.get_data().unwrap(), Output::Single(text));
    }
}
