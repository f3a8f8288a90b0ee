use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures of a comparison run.
///
/// Failures local to a single file pair (a file that cannot be opened or read
/// during a content comparison) never surface here; they are logged and the
/// pair is reported as differing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Internal consistency failure, e.g. entry lists that are not sorted.
    #[error("logic error: {0}")]
    Logic(String),

    #[error("cannot compare content of different file types at {}", path.display())]
    TypeMismatch { path: PathBuf },

    /// A single-path lookup named something outside the roots.
    #[error("path must stay below the roots: {}", path.display())]
    InvalidPath { path: PathBuf },

    /// Raised internally to unwind a cancelled run; `compare_dirs` turns it
    /// into `Outcome::Cancelled` and it is never returned to callers.
    #[doc(hidden)]
    #[error("comparison cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
