use serde_json::{json, Value as JsonValue};

use super::interpret::{InputFields, PathType, IMAGE_DIR};
use crate::config::{Args, CallableSpec, LoaderPars};
use crate::data::model::Source;
use crate::data::output::Output;
use crate::download::Download;
use crate::error::{LoaderError, Result};
use crate::registry::{self, Loader, Registry, Resolved};

// ---------------------------------------------------------------------------
// Default loader table
// ---------------------------------------------------------------------------

/// Built-in loader uri and static args for a file type, if there is one.
pub fn default_loader(file_type: &str) -> Option<(&'static str, Args)> {
    let (uri, args) = match file_type {
        ".csv" => (registry::CSV_READ, json!({})),
        ".npy" => (registry::NPY_LOAD, json!({})),
        ".npz" => (registry::NPY_LOAD, json!({"allow_pickle": true})),
        ".pkl" => (registry::PICKLE_LOAD, json!({})),
        ".parquet" | ".pq" => (registry::PARQUET_READ, json!({})),
        ".json" => (registry::JSON_READ, json!({})),
        IMAGE_DIR => (registry::IMAGE_READ_DIR, json!({})),
        _ => return None,
    };
    match args {
        JsonValue::Object(map) => Some((uri, map)),
        _ => None,
    }
}

/// Pick the loader: the configured one, else the default for `file_type`.
///
/// Args given alongside an uri-less spec are layered over the defaults.
pub fn resolve_loader(
    spec: Option<&CallableSpec<Loader>>,
    file_type: &str,
    registry: &Registry,
) -> Result<Resolved<Loader>> {
    let user_args = match spec {
        Some(CallableSpec::Registry { uri: None, arg }) => arg.clone(),
        Some(spec) => return registry.resolve(spec),
        None => Args::new(),
    };

    let (uri, mut args) = default_loader(file_type).ok_or_else(|| {
        LoaderError::config(format!(
            "no loader configured and none is known for file type `{file_type}`"
        ))
    })?;
    args.extend(user_args);
    Ok(Resolved {
        id: uri.to_string(),
        func: registry.lookup(uri)?,
        args,
    })
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Resolve the loader for `fields` and read the configured source.
pub fn load_data(
    fields: &InputFields,
    pars: &LoaderPars,
    registry: &Registry,
    downloader: &dyn Download,
) -> Result<Output> {
    let loader = resolve_loader(pars.data_loader.as_ref(), &fields.file_type, registry)?;
    let mut args = loader.args.clone();
    let is_csv_reader = loader.id == registry::CSV_READ && fields.file_type == ".csv";

    let source = match fields.path_type {
        PathType::File => {
            if fields.generator && is_csv_reader {
                let chunksize = pars.chunksize.or(fields.batch_size).unwrap_or(1);
                args.insert("chunksize".into(), json!(chunksize));
            }
            Source::Path(fields.path.clone().into())
        }
        PathType::Dir => Source::Path(fields.path.clone().into()),
        PathType::Url if is_csv_reader => Source::Url(fields.path.clone()),
        PathType::Url => {
            let local = downloader
                .download(&fields.path, &fields.download_path)
                .map_err(|source| LoaderError::DataLoad {
                    loader: loader.id.clone(),
                    source: source.context(format!("downloading {}", fields.path)),
                })?;
            Source::Path(local)
        }
    };

    log::info!("loading {source} with `{}`", loader.id);
    let data = loader
        .func
        .call(&source, &args)
        .map_err(|source| LoaderError::DataLoad {
            loader: loader.id.clone(),
            source,
        })?;

    // An .npz archive read by the array reader becomes its ordered members.
    match data {
        Output::Map(members) if fields.file_type == ".npz" && loader.id == registry::NPY_LOAD => {
            Ok(Output::Sequence(members.into_values()))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_builtin_extensions() {
        for (ext, uri) in [
            (".csv", registry::CSV_READ),
            (".npy", registry::NPY_LOAD),
            (".npz", registry::NPY_LOAD),
            (".pkl", registry::PICKLE_LOAD),
            (IMAGE_DIR, registry::IMAGE_READ_DIR),
        ] {
            assert_eq!(default_loader(ext).map(|(u, _)| u), Some(uri));
        }
        assert!(default_loader(".xlsx").is_none());
        let (_, npz_args) = default_loader(".npz").unwrap();
        assert_eq!(npz_args.get("allow_pickle"), Some(&json!(true)));
    }

    #[test]
    fn uriless_spec_args_override_defaults() {
        let mut arg = Args::new();
        arg.insert("allow_pickle".into(), json!(false));
        let spec = CallableSpec::Registry { uri: None, arg };
        let resolved = resolve_loader(Some(&spec), ".npz", &Registry::default()).unwrap();
        assert_eq!(resolved.id, registry::NPY_LOAD);
        assert_eq!(resolved.args.get("allow_pickle"), Some(&json!(false)));
    }

    #[test]
    fn unknown_file_type_without_loader_fails() {
        let err = resolve_loader(None, ".xlsx", &Registry::default()).unwrap_err();
        assert!(matches!(err, LoaderError::Configuration(_)));
    }

    #[test]
    fn explicit_uri_must_be_a_loader() {
        let spec = CallableSpec::uri(registry::SAVE_PICKLE);
        let err = resolve_loader(Some(&spec), ".csv", &Registry::default()).unwrap_err();
        assert!(matches!(err, LoaderError::Configuration(_)));

        let spec = CallableSpec::uri("pandas::read_csv");
        let err = resolve_loader(Some(&spec), ".csv", &Registry::default()).unwrap_err();
        assert!(matches!(err, LoaderError::Resolution { .. }));
    }
}
