use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

use crate::config::{arg_string_list, Args, CallableSpec};
use crate::error::{LoaderError, Result};
use crate::registry::{Splitter, TRAIN_TEST_SPLIT};

/// File-type sentinel for directories of class-labelled images.
pub const IMAGE_DIR: &str = "image_dir";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    File,
    Dir,
    Url,
}

impl PathType {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(PathType::File),
            "dir" | "directory" => Ok(PathType::Dir),
            "url" => Ok(PathType::Url),
            other => Err(LoaderError::config(format!(
                "unknown path_type `{other}`; expected file, dir or url"
            ))),
        }
    }
}

/// The split callable and the argument name that receives `test_size`.
#[derive(Debug, Clone)]
pub struct SplitFunction {
    pub spec: CallableSpec<Splitter>,
    pub size_arg: String,
}

impl Default for SplitFunction {
    fn default() -> Self {
        SplitFunction {
            spec: CallableSpec::uri(TRAIN_TEST_SPLIT),
            size_arg: "test_size".into(),
        }
    }
}

/// `input_pars` after interpretation.
#[derive(Debug, Clone)]
pub struct InputFields {
    pub path: String,
    pub path_type: PathType,
    /// Lower-case extension with its leading dot, or [`IMAGE_DIR`].
    pub file_type: String,
    pub download_path: PathBuf,
    pub test_size: Option<JsonValue>,
    pub generator: bool,
    pub batch_size: Option<usize>,
    pub names: Option<Vec<String>>,
    pub col_x: Option<Vec<String>>,
    pub col_y: Option<Vec<String>>,
    pub col_misc: Option<Vec<String>>,
    pub split_function: SplitFunction,
    pub split_outputs: Option<Vec<String>>,
    pub misc_outputs: Option<Vec<String>>,
}

impl InputFields {
    /// Whether a train/test split was asked for: `test_size` is positive.
    ///
    /// Non-numeric, non-empty values still count so that the splitter
    /// reports them instead of the split being skipped quietly.
    pub fn wants_split(&self) -> bool {
        match &self.test_size {
            None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => false,
            Some(JsonValue::Number(n)) => n.as_f64().map_or(false, |v| v > 0.0),
            Some(JsonValue::String(s)) => match s.trim() {
                "" => false,
                trimmed => trimmed.parse::<f64>().map_or(true, |v| v > 0.0),
            },
            Some(_) => true,
        }
    }
}

/// Validate and normalize `input_pars`. Touches the filesystem only to check
/// whether `path` is a file or a directory.
pub fn interpret_input_pars(input_pars: &Args) -> Result<InputFields> {
    let path = match input_pars.get("path") {
        Some(JsonValue::String(p)) if !p.is_empty() => p.clone(),
        Some(other) if !other.is_null() => {
            return Err(LoaderError::config(format!("path must be a string, got {other}")))
        }
        _ => return Err(LoaderError::config("missing `path` in input_pars")),
    };

    let path_type = match override_str(input_pars, "path_type")? {
        Some(explicit) => PathType::parse(explicit)?,
        None => detect_path_type(&path)?,
    };

    let file_type = match override_str(input_pars, "file_type")? {
        Some(explicit) => normalize_file_type(explicit),
        None => detect_file_type(&path, path_type)?,
    };

    let download_path = input_pars
        .get("download_path")
        .and_then(JsonValue::as_str)
        .map_or_else(|| PathBuf::from("./"), PathBuf::from);

    let generator = match input_pars.get("generator") {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(b)) => *b,
        Some(other) => {
            return Err(LoaderError::config(format!("generator must be a boolean, got {other}")))
        }
    };
    let batch_size = if generator {
        Some(parse_batch_size(input_pars.get("batch_size"))?)
    } else {
        None
    };

    let list = |key: &str| {
        arg_string_list(input_pars, key).map_err(|e| LoaderError::config(e.to_string()))
    };

    let split_function = match input_pars.get("split_function") {
        None | Some(JsonValue::Null) => SplitFunction::default(),
        Some(value) => parse_split_function(value)?,
    };

    let fields = InputFields {
        path,
        path_type,
        file_type,
        download_path,
        test_size: input_pars.get("test_size").cloned(),
        generator,
        batch_size,
        names: list("names")?,
        col_x: list("col_Xinput")?,
        col_y: list("col_Yinput")?,
        col_misc: list("col_miscinput")?,
        split_function,
        split_outputs: unique("split_outputs", list("split_outputs")?)?,
        misc_outputs: unique("misc_outputs", list("misc_outputs")?)?,
    };
    log::debug!(
        "interpreted source {} as {:?} with file type {}",
        fields.path,
        fields.path_type,
        fields.file_type
    );
    Ok(fields)
}

/// An explicit string override; absent or null means "detect".
fn override_str<'a>(input_pars: &'a Args, key: &str) -> Result<Option<&'a str>> {
    match input_pars.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(LoaderError::config(format!(
            "{key} must be a string, got {other}"
        ))),
    }
}

/// Output-name lists select entries by name, so repeats are ambiguous.
fn unique(key: &str, list: Option<Vec<String>>) -> Result<Option<Vec<String>>> {
    if let Some(dup) = list.as_deref().and_then(super::first_duplicate) {
        return Err(LoaderError::config(format!("{key} lists `{dup}` twice")));
    }
    Ok(list)
}

fn detect_path_type(path: &str) -> Result<PathType> {
    let local = Path::new(path);
    if local.is_file() {
        return Ok(PathType::File);
    }
    if local.is_dir() {
        return Ok(PathType::Dir);
    }
    // Single-letter schemes are Windows drive letters, not URLs.
    match reqwest::Url::parse(path) {
        Ok(url) if url.scheme().len() > 1 => Ok(PathType::Url),
        _ => Err(LoaderError::config(format!(
            "path type for {path} is undeterminable"
        ))),
    }
}

fn normalize_file_type(explicit: &str) -> String {
    let lower = explicit.to_ascii_lowercase();
    if lower == IMAGE_DIR || lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

fn detect_file_type(path: &str, path_type: PathType) -> Result<String> {
    let name = match path_type {
        PathType::Dir => return Ok(IMAGE_DIR.to_string()),
        PathType::File => path.to_string(),
        PathType::Url => {
            if path.ends_with('/') {
                return Err(LoaderError::config("URL must target a single file"));
            }
            crate::download::file_name(path).map_err(|e| LoaderError::config(e.to_string()))?
        }
    };
    Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .ok_or_else(|| LoaderError::config(format!("cannot determine file type of {path}")))
}

fn parse_batch_size(value: Option<&JsonValue>) -> Result<usize> {
    let parsed = match value {
        None | Some(JsonValue::Null) => Some(1),
        Some(JsonValue::Number(n)) => n.as_u64(),
        Some(JsonValue::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(LoaderError::config(format!(
            "batch size must be a positive integer, got {}",
            value.map_or_else(String::new, |v| v.to_string())
        ))),
    }
}

/// `[<callable spec>, "<size arg name>"]`, or a bare spec keyed by `test_size`.
fn parse_split_function(value: &JsonValue) -> Result<SplitFunction> {
    match value {
        JsonValue::Array(items) => match items.as_slice() {
            [spec, JsonValue::String(size_arg)] => Ok(SplitFunction {
                spec: CallableSpec::from_json(spec, "split_function")?,
                size_arg: size_arg.clone(),
            }),
            [spec] => Ok(SplitFunction {
                spec: CallableSpec::from_json(spec, "split_function")?,
                ..SplitFunction::default()
            }),
            _ => Err(LoaderError::config(
                "split_function must be [<callable spec>, <size argument name>]",
            )),
        },
        other => Ok(SplitFunction {
            spec: CallableSpec::from_json(other, "split_function")?,
            ..SplitFunction::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pars(v: JsonValue) -> Args {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn missing_path_fails() {
        let err = interpret_input_pars(&pars(json!({"file_type": "csv"}))).unwrap_err();
        assert!(matches!(err, LoaderError::Configuration(_)));
    }

    #[test]
    fn detects_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Data.CSV");
        std::fs::write(&file, "a\n1\n").unwrap();

        let f = interpret_input_pars(&pars(json!({"path": file.to_str().unwrap()}))).unwrap();
        assert_eq!(f.path_type, PathType::File);
        assert_eq!(f.file_type, ".csv");

        let d = interpret_input_pars(&pars(json!({"path": dir.path().to_str().unwrap()}))).unwrap();
        assert_eq!(d.path_type, PathType::Dir);
        assert_eq!(d.file_type, IMAGE_DIR);
    }

    #[test]
    fn detects_urls_and_their_extension() {
        let f = interpret_input_pars(&pars(json!({"path": "https://example.com/x/train.npz?raw=1"})))
            .unwrap();
        assert_eq!(f.path_type, PathType::Url);
        assert_eq!(f.file_type, ".npz");
    }

    #[test]
    fn url_directory_is_rejected() {
        let err = interpret_input_pars(&pars(json!({"path": "https://example.com/x/"})));
        assert!(matches!(err, Err(LoaderError::Configuration(_))));
    }

    #[test]
    fn undeterminable_path_type_fails() {
        let err = interpret_input_pars(&pars(json!({"path": "no/such/file.csv"})));
        assert!(matches!(err, Err(LoaderError::Configuration(_))));
    }

    #[test]
    fn explicit_overrides_win() {
        let f = interpret_input_pars(&pars(json!({
            "path": "anything", "path_type": "file", "file_type": "NPY"
        })))
        .unwrap();
        assert_eq!(f.path_type, PathType::File);
        assert_eq!(f.file_type, ".npy");

        let err = interpret_input_pars(&pars(json!({"path": "x", "path_type": "dropbox"})));
        assert!(matches!(err, Err(LoaderError::Configuration(_))));
    }

    #[test]
    fn non_string_overrides_are_rejected() {
        let err = interpret_input_pars(&pars(json!({
            "path": "https://example.com/a.csv", "path_type": 7
        })));
        assert!(matches!(err, Err(LoaderError::Configuration(_))));

        let err = interpret_input_pars(&pars(json!({
            "path": "https://example.com/a.csv", "file_type": 3
        })));
        assert!(matches!(err, Err(LoaderError::Configuration(_))));

        let f = interpret_input_pars(&pars(json!({
            "path": "https://example.com/a.csv", "path_type": null
        })))
        .unwrap();
        assert_eq!(f.path_type, PathType::Url);
    }

    #[test]
    fn repeated_output_selections_are_rejected() {
        for key in ["split_outputs", "misc_outputs"] {
            let mut p = pars(json!({"path": "x.csv", "path_type": "file"}));
            p.insert(key.into(), json!(["X", "y", "X"]));
            let err = interpret_input_pars(&p).unwrap_err();
            assert!(matches!(err, LoaderError::Configuration(msg) if msg.contains("`X`")));
        }
    }

    #[test]
    fn batch_size_parsing() {
        let base = json!({"path": "x.csv", "path_type": "file", "generator": true});
        let with = |b: JsonValue| {
            let mut p = pars(base.clone());
            p.insert("batch_size".into(), b);
            interpret_input_pars(&p)
        };
        assert_eq!(with(json!(16)).unwrap().batch_size, Some(16));
        assert_eq!(with(json!("8")).unwrap().batch_size, Some(8));
        assert!(matches!(with(json!("eight")), Err(LoaderError::Configuration(_))));
        assert!(matches!(with(json!(2.5)), Err(LoaderError::Configuration(_))));
        assert_eq!(interpret_input_pars(&pars(base)).unwrap().batch_size, Some(1));
    }

    #[test]
    fn split_function_defaults_and_overrides() {
        let f = interpret_input_pars(&pars(json!({"path": "x.csv", "path_type": "file"}))).unwrap();
        assert_eq!(f.split_function.size_arg, "test_size");
        assert!(!f.wants_split());

        let f = interpret_input_pars(&pars(json!({
            "path": "x.csv", "path_type": "file", "test_size": 0.25,
            "split_function": [{"uri": "my::split", "arg": {"seed": 1}}, "fraction"]
        })))
        .unwrap();
        assert_eq!(f.split_function.size_arg, "fraction");
        assert!(f.wants_split());
    }

    #[test]
    fn zero_test_size_means_no_split() {
        let f = interpret_input_pars(&pars(json!({"path": "x.csv", "path_type": "file", "test_size": 0})))
            .unwrap();
        assert!(!f.wants_split());
    }

    #[test]
    fn only_positive_test_sizes_split() {
        let wants = |size: JsonValue| {
            interpret_input_pars(&pars(json!({
                "path": "x.csv", "path_type": "file", "test_size": size
            })))
            .unwrap()
            .wants_split()
        };
        assert!(!wants(json!(-0.2)));
        assert!(!wants(json!("")));
        assert!(!wants(json!("0")));
        assert!(wants(json!("0.3")));
        assert!(wants(json!(5)));
        // Left for the splitter to reject.
        assert!(wants(json!("a fifth")));
    }
}
