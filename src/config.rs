//! Construction-time settings for the manager.

use std::path::{Path, PathBuf};
use std::time::Duration;

use home::home_dir;

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub store_root: PathBuf,
    pub local_root: PathBuf,
    /// Entry point relative to an app's directory.
    pub entry_point: PathBuf,
    /// Program the entry point is handed to; `None` runs it directly.
    pub launcher: Option<String>,
    pub manifest_file: String,
    pub default_author: String,
    pub default_version: String,
    pub connect_delay: Duration,
    pub chunk_delay: Duration,
    /// Total simulated time for install and remove.
    pub work_duration: Duration,
}

impl StoreConfig {
    pub fn new(store_root: impl Into<PathBuf>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            store_root: store_root.into(),
            local_root: local_root.into(),
            entry_point: PathBuf::from("main.py"),
            launcher: Some("python3".into()),
            manifest_file: "app.plist".into(),
            default_author: "Enthought".into(),
            default_version: "1.0".into(),
            connect_delay: Duration::from_secs(4),
            chunk_delay: Duration::from_millis(100),
            work_duration: Duration::from_secs(2),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<PathBuf>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_launcher(mut self, launcher: Option<String>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Zero every simulated delay (tests, `--fast`).
    pub fn without_delays(mut self) -> Self {
        self.connect_delay = Duration::ZERO;
        self.chunk_delay = Duration::ZERO;
        self.work_duration = Duration::ZERO;
        self
    }

    /// Path of an app's entry point under `root`.
    pub fn entry_path(&self, root: &Path, id: &str) -> PathBuf {
        root.join(id).join(&self.entry_point)
    }
}

/// Roots under ~/.app_store
impl Default for StoreConfig {
    fn default() -> Self {
        let base = home_dir()
            .map(|h| h.join(".app_store"))
            .unwrap_or_else(|| PathBuf::from(".app_store"));
        Self::new(base.join("store"), base.join("local"))
    }
}
