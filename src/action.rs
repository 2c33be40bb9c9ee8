//! Units of work that move one app through its lifecycle.
//!
//! Actions never touch an `App` directly. They hold the app's id and ask an
//! [`ActionHost`] (the manager) to read or change its status, so the catalogue
//! keeps a single writer. Every action leaves the app in a terminal status
//! before `execute` returns, whether it succeeds or fails.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::core::{artifact_size, launch, remove_app_dir};
use crate::error::{Result, StoreError};
use crate::transfer::TransferSimulator;
use crate::types::{AppStatus, TaskKind};

/// Number of increments install and remove report.
const WORK_STEPS: u8 = 10;

/// Owner of app status, as seen from a running action.
pub trait ActionHost: Send + Sync {
    fn status(&self, id: &str) -> Option<AppStatus>;
    fn update_status(&self, id: &str, kind: TaskKind, status: AppStatus);
    fn report_progress(&self, _kind: TaskKind, _id: &str, _progress: u8) {}
}

/// State every action carries: which app, where files come from and go to,
/// and how far along it is.
#[derive(Debug)]
pub struct ActionState {
    app_id: String,
    store_root: PathBuf,
    local_root: PathBuf,
    progress: AtomicU8,
}

impl ActionState {
    fn new(app_id: &str, config: &StoreConfig) -> Self {
        Self {
            app_id: app_id.to_string(),
            store_root: config.store_root.clone(),
            local_root: config.local_root.clone(),
            progress: AtomicU8::new(0),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    fn reset(&self, host: &dyn ActionHost, kind: TaskKind) {
        self.progress.store(0, Ordering::Release);
        host.report_progress(kind, &self.app_id, 0);
    }

    /// Never moves backwards and never exceeds 100.
    fn advance_to(&self, host: &dyn ActionHost, kind: TaskKind, progress: u8) {
        let progress = progress.min(100);
        let prev = self.progress.fetch_max(progress, Ordering::AcqRel);
        if progress > prev {
            host.report_progress(kind, &self.app_id, progress);
        }
    }

    /// Fixed-increment busy work spread over `duration`. Stops one step short
    /// of 100; the caller finishes once the real work has succeeded.
    fn simulate_work(&self, host: &dyn ActionHost, kind: TaskKind, duration: Duration) {
        let pause = duration / u32::from(WORK_STEPS);
        for i in 1..=WORK_STEPS {
            if !pause.is_zero() {
                thread::sleep(pause);
            }
            if i < WORK_STEPS {
                self.advance_to(host, kind, i * (100 / WORK_STEPS));
            }
        }
    }
}

pub trait AppAction: Send + Sync {
    fn kind(&self) -> TaskKind;
    fn state(&self) -> &ActionState;
    fn execute(&self, host: &dyn ActionHost) -> Result<()>;

    fn app_id(&self) -> &str {
        self.state().app_id()
    }

    fn progress(&self) -> u8 {
        self.state().progress()
    }
}

/// Copies the entry point from the store into the local root.
pub struct FetchAction {
    state: ActionState,
    entry_point: PathBuf,
    chunk_delay: Duration,
}

impl FetchAction {
    pub fn new(app_id: &str, config: &StoreConfig) -> Self {
        Self {
            state: ActionState::new(app_id, config),
            entry_point: config.entry_point.clone(),
            chunk_delay: config.chunk_delay,
        }
    }

    fn transfer(&self, host: &dyn ActionHost, dest: &Path) -> Result<()> {
        let id = self.state.app_id();
        let src = self.state.store_root.join(id).join(&self.entry_point);

        let unavailable = |_| StoreError::StoreUnavailable { path: src.clone() };
        let total = artifact_size(&src).map_err(unavailable)?;
        let reader = File::open(&src).map_err(unavailable)?;

        let failure = |source| StoreError::TransferFailure {
            id: id.to_string(),
            source,
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(failure)?;
        }
        let writer = File::create(dest).map_err(failure)?;

        let sim = TransferSimulator::new(total).with_delay(self.chunk_delay);
        debug!(app = id, total, chunk = sim.chunk_size(), "fetch started");
        sim.run(reader, writer, |progress, written| {
            debug!(app = id, written, progress, "chunk written");
            self.state.advance_to(host, TaskKind::Fetch, progress);
        })
        .map_err(failure)?;
        Ok(())
    }

    /// Drop a partial download so it is not mistaken for an install later.
    fn discard_partial(&self, dest: &Path) {
        if let Err(e) = fs::remove_file(dest) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %dest.display(), error = %e, "could not discard partial fetch");
            }
        }
        if let Some(parent) = dest.parent() {
            // only succeeds when empty
            let _ = fs::remove_dir(parent);
        }
    }
}

impl AppAction for FetchAction {
    fn kind(&self) -> TaskKind {
        TaskKind::Fetch
    }

    fn state(&self) -> &ActionState {
        &self.state
    }

    fn execute(&self, host: &dyn ActionHost) -> Result<()> {
        let id = self.state.app_id();
        let dest = self.state.local_root.join(id).join(&self.entry_point);
        host.update_status(id, TaskKind::Fetch, AppStatus::Fetching);
        self.state.reset(host, TaskKind::Fetch);

        match self.transfer(host, &dest) {
            Ok(()) => {
                host.update_status(id, TaskKind::Fetch, AppStatus::Fetched);
                info!(app = id, "fetched");
                Ok(())
            }
            Err(e) => {
                warn!(app = id, error = %e, progress = self.state.progress(), "fetch failed, rolling back");
                self.discard_partial(&dest);
                host.update_status(id, TaskKind::Fetch, AppStatus::None);
                Err(e)
            }
        }
    }
}

/// Simulated install step over an already fetched app.
pub struct InstallAction {
    state: ActionState,
    entry_point: PathBuf,
    work_duration: Duration,
}

impl InstallAction {
    pub fn new(app_id: &str, config: &StoreConfig) -> Self {
        Self {
            state: ActionState::new(app_id, config),
            entry_point: config.entry_point.clone(),
            work_duration: config.work_duration,
        }
    }
}

impl AppAction for InstallAction {
    fn kind(&self) -> TaskKind {
        TaskKind::Install
    }

    fn state(&self) -> &ActionState {
        &self.state
    }

    fn execute(&self, host: &dyn ActionHost) -> Result<()> {
        let id = self.state.app_id();
        let entry = self.state.local_root.join(id).join(&self.entry_point);
        if !entry.is_file() {
            return Err(StoreError::TransferFailure {
                id: id.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} has not been fetched", entry.display()),
                ),
            });
        }

        host.update_status(id, TaskKind::Install, AppStatus::Installing);
        self.state.reset(host, TaskKind::Install);
        self.state
            .simulate_work(host, TaskKind::Install, self.work_duration);
        self.state.advance_to(host, TaskKind::Install, 100);
        host.update_status(id, TaskKind::Install, AppStatus::Installed);
        info!(app = id, "installed");
        Ok(())
    }
}

/// Deletes an installed app's directory.
pub struct RemoveAction {
    state: ActionState,
    work_duration: Duration,
}

impl RemoveAction {
    pub fn new(app_id: &str, config: &StoreConfig) -> Self {
        Self {
            state: ActionState::new(app_id, config),
            work_duration: config.work_duration,
        }
    }
}

impl AppAction for RemoveAction {
    fn kind(&self) -> TaskKind {
        TaskKind::Remove
    }

    fn state(&self) -> &ActionState {
        &self.state
    }

    fn execute(&self, host: &dyn ActionHost) -> Result<()> {
        let id = self.state.app_id();
        let before = host.status(id).unwrap_or_default();
        host.update_status(id, TaskKind::Remove, AppStatus::Removing);
        self.state.reset(host, TaskKind::Remove);
        self.state
            .simulate_work(host, TaskKind::Remove, self.work_duration);

        let dir = self.state.local_root.join(id);
        match remove_app_dir(&dir) {
            Ok(existed) => {
                if !existed {
                    debug!(app = id, "artifact already absent");
                }
                self.state.advance_to(host, TaskKind::Remove, 100);
                host.update_status(id, TaskKind::Remove, AppStatus::None);
                info!(app = id, "removed");
                Ok(())
            }
            Err(source) => {
                warn!(app = id, error = %source, progress = self.state.progress(), "remove failed, rolling back");
                host.update_status(id, TaskKind::Remove, before);
                Err(StoreError::TransferFailure {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }
}

/// Launches an installed app and forgets about it.
pub struct StartAction {
    state: ActionState,
    entry_point: PathBuf,
    launcher: Option<String>,
    pid: OnceLock<u32>,
}

impl StartAction {
    pub fn new(app_id: &str, config: &StoreConfig) -> Self {
        Self {
            state: ActionState::new(app_id, config),
            entry_point: config.entry_point.clone(),
            launcher: config.launcher.clone(),
            pid: OnceLock::new(),
        }
    }

    /// Pid of the launched process, once started.
    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }
}

impl AppAction for StartAction {
    fn kind(&self) -> TaskKind {
        TaskKind::Start
    }

    fn state(&self) -> &ActionState {
        &self.state
    }

    fn execute(&self, host: &dyn ActionHost) -> Result<()> {
        let id = self.state.app_id();
        let entry = self.state.local_root.join(id).join(&self.entry_point);
        if host.status(id) != Some(AppStatus::Installed) || !entry.is_file() {
            return Err(StoreError::AppNotInstalled(id.to_string()));
        }

        self.state.reset(host, TaskKind::Start);
        let pid = launch(self.launcher.as_deref(), &entry).map_err(|source| {
            StoreError::LaunchFailed {
                id: id.to_string(),
                source,
            }
        })?;
        let _ = self.pid.set(pid);
        self.state.advance_to(host, TaskKind::Start, 100);
        info!(app = id, pid, "started");
        Ok(())
    }
}
