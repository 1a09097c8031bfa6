use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use ndarray_npy::NpzWriter;

use crate::config::Args;
use crate::context::Context;
use crate::data::model::Value;
use crate::data::output::Output;

fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("creating {}", path.display()))
}

/// `save::pickle`: serialize the whole output; `pickle::load` reads it back.
///
/// Args: `pretty` (default `false`).
pub fn pickle(data: &Output, path: &Path, _context: &Context, args: &Args) -> Result<()> {
    let writer = BufWriter::new(create(path)?);
    if crate::config::arg_bool(args, "pretty")?.unwrap_or(false) {
        serde_json::to_writer_pretty(writer, data)?;
    } else {
        serde_json::to_writer(writer, data)?;
    }
    log::info!("saved intermediate output to {}", path.display());
    Ok(())
}

/// `save::npz`: write every value as an archive member.
///
/// Named outputs keep their names; positional ones become `arr_0`, `arr_1`, ..
/// Frames must be numeric.
pub fn npz(data: &Output, path: &Path, _context: &Context, _args: &Args) -> Result<()> {
    let members: Vec<(String, &Value)> = match data {
        Output::Single(v) => vec![("arr_0".to_string(), v)],
        Output::Sequence(vs) => vs
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("arr_{i}"), v))
            .collect(),
        Output::Map(named) => named.iter().map(|(k, v)| (k.to_string(), v)).collect(),
        other => bail!("save::npz cannot write a {}", other.case_name()),
    };

    let mut npz = NpzWriter::new(create(path)?);
    for (name, value) in members {
        let array = value
            .to_array()
            .with_context(|| format!("member `{name}`"))?;
        npz.add_array(name.as_str(), &array)
            .with_context(|| format!("writing member `{name}`"))?;
    }
    npz.finish().context("finishing npz archive")?;
    log::info!("saved intermediate output to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{load_npy, load_pickle};
    use crate::data::model::{Frame, Scalar, Source};
    use crate::data::output::Named;
    use ndarray::array;

    #[test]
    fn pickle_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.pkl");
        let mut named = Named::new();
        named.insert("X", Value::Array(array![[1.0, 2.0]].into_dyn()));
        named.insert(
            "meta",
            Value::Frame(Frame::new(vec!["k".into()], vec![vec![Scalar::String("v".into())]])),
        );
        let data = Output::Map(named);

        pickle(&data, &path, &Context::default(), &Args::new()).unwrap();
        let back = load_pickle(&Source::Path(path), &Args::new()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn npz_names_positional_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.npz");
        let data = Output::Sequence(vec![
            Value::Array(array![1.0, 2.0, 3.0].into_dyn()),
            Value::Array(array![[0.0], [1.0]].into_dyn()),
        ]);

        npz(&data, &path, &Context::default(), &Args::new()).unwrap();
        let Output::Map(members) = load_npy(&Source::Path(path), &Args::new()).unwrap() else {
            panic!("expected archive members");
        };
        assert_eq!(members.keys().collect::<Vec<_>>(), vec!["arr_0", "arr_1"]);
    }
}
