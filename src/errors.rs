use std::path::PathBuf;

/// Errors that abort a run.
///
/// Empty contigs or contig pairs are not errors; they are logged and skipped by the caller.
#[derive(Debug, thiserror::Error)]
pub enum SvError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl SvError {
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    /// Process exit code matching the error class
    pub fn exit_code(&self) -> exitcode::ExitCode {
        match self {
            SvError::Configuration(_) => exitcode::CONFIG,
            SvError::Input(_) => exitcode::DATAERR,
            SvError::Io { .. } => exitcode::IOERR,
        }
    }
}
