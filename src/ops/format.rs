use anyhow::{bail, Result};

use crate::config::Args;
use crate::context::Context;
use crate::data::output::Output;

/// `format::to_array`: frames become numeric arrays, arrays pass through.
pub fn to_array(data: Output, _context: &Context, _args: &Args) -> Result<Output> {
    match data {
        Output::SequenceOfMaps(_) | Output::MapOfMaps(_) => {
            bail!("format::to_array does not apply to a {}", data.case_name())
        }
        other => other.map_values(|v| Ok(v.to_array()?.into())),
    }
}

/// `format::first`: unwrap a one-entry sequence or mapping into a single value.
pub fn first(data: Output, _context: &Context, _args: &Args) -> Result<Output> {
    match data {
        Output::Sequence(mut values) if values.len() == 1 => Ok(Output::Single(values.remove(0))),
        Output::Map(named) if named.len() == 1 => match named.into_values().pop() {
            Some(v) => Ok(Output::Single(v)),
            None => bail!("empty mapping"),
        },
        Output::Single(v) => Ok(Output::Single(v)),
        other => bail!(
            "format::first needs exactly one entry, got a {} with {}",
            other.case_name(),
            other.len()
        ),
    }
}
