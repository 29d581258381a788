use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::stage::Stage;

#[derive(Debug, Error, Diagnostic)]
pub enum YamasError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("unknown data type: {0} (expected 16S, 18S or Shotgun)")]
    InvalidDataType(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("stage {stage} failed for dataset {dataset}")]
    #[diagnostic(help("completed stages are kept; run `yamas continue` to resume"))]
    Stage {
        stage: Stage,
        dataset: String,
        #[source]
        source: Box<YamasError>,
    },

    #[error("{program} exited with {status} (log: {log})")]
    ToolFailed {
        program: String,
        status: String,
        log: PathBuf,
    },

    #[error("expected output not produced: {0}")]
    MissingOutput(PathBuf),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("cannot resume: {0}")]
    Resumption(String),

    #[error("malformed table: {0}")]
    Format(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("run info request failed: {0}")]
    RunInfoHttp(String),

    #[error("run info service returned status {status}: {message}")]
    RunInfoStatus { status: u16, message: String },
}

impl YamasError {
    /// Unwraps the stage wrapper, returning the error raised inside the stage.
    pub fn root_cause(&self) -> &YamasError {
        match self {
            YamasError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
