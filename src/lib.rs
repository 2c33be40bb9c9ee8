//! Local app store manager: a catalogue of installable apps, simulated chunked
//! downloads, and an install/remove/start lifecycle that can run in the
//! background while callers poll progress.

pub mod action;
pub mod config;
pub mod core;
pub mod error;
pub mod manager;
pub mod tasks;
pub mod transfer;
pub mod types;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use manager::AppManager;
pub use types::{App, AppStatus, ConnectOutcome, ProgressSnapshot, ProgressUpdate, TaskKind};
