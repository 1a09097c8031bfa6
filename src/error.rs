use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Every failure `DataLoader::compute` can surface.
///
/// Built-in callables report failures through `anyhow`; the orchestrator wraps
/// them here together with the identity of the callable that failed.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Malformed or incomplete configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A callable specification does not name anything in the registry.
    #[error("cannot resolve callable `{uri}`: {reason}")]
    Resolution { uri: String, reason: String },

    /// The resolved loader failed while reading the source.
    #[error("loader `{loader}` failed")]
    DataLoad {
        loader: String,
        #[source]
        source: anyhow::Error,
    },

    /// Output names do not line up with the outputs.
    #[error("cannot name outputs: {0}")]
    Naming(String),

    /// A loaded value does not have the declared trailing shape.
    #[error("expected shape {expected:?} does not match data shape {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A resolved preprocessor, transform, splitter or saver failed.
    #[error("{stage} `{id}` failed")]
    Callable {
        stage: &'static str,
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A combination of output shape and option with no defined behaviour.
    #[error("not implemented: {0}")]
    Unsupported(String),

    /// Output was requested before a successful `compute`.
    #[error("no output available: compute() has not completed successfully")]
    NotComputed,

    #[error("invalid configuration JSON")]
    Json(#[from] serde_json::Error),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        LoaderError::Configuration(msg.into())
    }

    pub(crate) fn callable(stage: &'static str, id: &str, source: anyhow::Error) -> Self {
        LoaderError::Callable {
            stage,
            id: id.to_string(),
            source,
        }
    }
}

pub type Result<T, E = LoaderError> = std::result::Result<T, E>;
