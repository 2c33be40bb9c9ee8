use std::io;
use std::path::PathBuf;

/// Failures surfaced to callers of the manager.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable at {}", path.display())]
    StoreUnavailable { path: PathBuf },

    #[error("app {0} is not installed")]
    AppNotInstalled(String),

    #[error("app {0} is not available")]
    AppNotAvailable(String),

    #[error("app {0} is already installed")]
    AlreadyInstalled(String),

    #[error("an action for app {0} is already running")]
    ActionInProgress(String),

    #[error("transfer failed for app {id}")]
    TransferFailure {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("could not launch app {id}")]
    LaunchFailed {
        id: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
