//! Error taxonomy for the scan pipeline.
//!
//! A non-zero exit from the instrumented build is deliberately not a
//! variant here: build failure is a warning and the pipeline continues
//! to the analysis stage.

use thiserror::Error;

/// Everything that can reject a request or end a scan early.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Bad or missing request fields; surfaced before a job exists.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A required external tool is not resolvable on the search path.
    #[error("required tool not found: {0}")]
    Setup(String),

    /// An external process could not be spawned at all.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The clone command exited non-zero.
    #[error("clone failed with exit code {0}")]
    Clone(i32),

    /// The analysis scanner exited non-zero.
    #[error("analysis failed with exit code {0}")]
    Analysis(i32),

    /// Filesystem fault during orchestration.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Exit code carried by command-failure variants.
    ///
    /// `Clone` and `Analysis` take the job to `failed` with this code;
    /// every other variant takes it to `error` with no code.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Clone(code) | Self::Analysis(code) => Some(*code),
            _ => None,
        }
    }
}
