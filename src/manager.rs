//! The catalogue of available and installed apps, and the operations the
//! outside world drives it with.
//!
//! All catalogue state lives behind one mutex. Running actions only ever touch
//! it through [`ActionHost`], and membership changes happen after an action has
//! returned, so an observer polling [`AppManager::progress`] always sees a
//! consistent status.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;

use anyhow::{Context, Result as AnyResult};
use tracing::{debug, info, warn};

use crate::action::{
    ActionHost, AppAction, FetchAction, InstallAction, RemoveAction, StartAction,
};
use crate::config::StoreConfig;
use crate::core::{is_app_running_simple, read_manifest, scan_app_dirs};
use crate::error::{Result, StoreError};
use crate::types::{App, AppStatus, ConnectOutcome, ProgressSnapshot, ProgressUpdate, TaskKind};

#[derive(Default)]
struct Catalogue {
    apps: HashMap<String, App>,
    available: Vec<String>,
    installed: Vec<String>,
    connected: bool,
    actions: HashMap<String, Arc<dyn AppAction>>,
    busy: HashSet<String>,
}

impl Catalogue {
    fn collect(&self, ids: &[String]) -> Vec<App> {
        ids.iter().filter_map(|id| self.apps.get(id).cloned()).collect()
    }
}

pub struct AppManager {
    config: StoreConfig,
    catalogue: Mutex<Catalogue>,
    progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

/// Marks an app busy for as long as it lives.
struct BusyGuard<'a> {
    manager: &'a AppManager,
    id: String,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.manager.catalogue().busy.remove(&self.id);
    }
}

impl AppManager {
    /// Create the manager and pick up whatever is already installed under the
    /// local root (created if missing).
    pub fn new(config: StoreConfig) -> AnyResult<Self> {
        std::fs::create_dir_all(&config.local_root)
            .with_context(|| format!("Create local root {:?}", config.local_root))?;

        let mut catalogue = Catalogue::default();
        for id in scan_app_dirs(&config.local_root)? {
            if !config.entry_path(&config.local_root, &id).is_file() {
                debug!(app = %id, "skipping local directory without entry point");
                continue;
            }
            let app = describe(&config, &config.local_root, &id).with_status(AppStatus::Installed);
            catalogue.installed.push(id.clone());
            catalogue.apps.insert(id, app);
        }
        info!(
            local = %config.local_root.display(),
            installed = catalogue.installed.len(),
            "app manager ready"
        );

        Ok(Self {
            config,
            catalogue: Mutex::new(catalogue),
            progress_tx: None,
        })
    }

    /// Send status and progress updates to `tx`.
    pub fn with_progress_channel(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.catalogue().connected
    }

    pub fn available_apps(&self) -> Vec<App> {
        let c = self.catalogue();
        c.collect(&c.available)
    }

    pub fn installed_apps(&self) -> Vec<App> {
        let c = self.catalogue();
        c.collect(&c.installed)
    }

    pub fn app(&self, id: &str) -> Option<App> {
        self.catalogue().apps.get(id).cloned()
    }

    /// Latest action's progress for `id`, with the app's current status.
    pub fn progress(&self, id: &str) -> Option<ProgressSnapshot> {
        let c = self.catalogue();
        let action = c.actions.get(id)?;
        let app = c.apps.get(id)?;
        Some(ProgressSnapshot {
            kind: action.kind(),
            progress: action.progress(),
            status: app.status,
        })
    }

    /// Reach the store and list what it offers. Unreachable is an outcome,
    /// not an error.
    pub fn connect(&self) -> ConnectOutcome {
        if self.is_connected() {
            info!("already connected");
            return ConnectOutcome::AlreadyConnected;
        }

        let store = &self.config.store_root;
        info!(store = %store.display(), "trying to connect to the remote store");
        if !self.config.connect_delay.is_zero() {
            thread::sleep(self.config.connect_delay);
        }

        if !store.is_dir() {
            warn!(store = %store.display(), "store unreachable");
            return ConnectOutcome::Unreachable;
        }
        let ids = match scan_app_dirs(store) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(store = %store.display(), error = ?e, "store unreachable");
                return ConnectOutcome::Unreachable;
            }
        };
        let found: Vec<App> = ids.iter().map(|id| describe(&self.config, store, id)).collect();

        let mut c = self.catalogue();
        if c.connected {
            return ConnectOutcome::AlreadyConnected;
        }
        for app in found {
            let id = app.id.clone();
            // an app installed locally keeps its identity and status
            c.apps.entry(id.clone()).or_insert(app);
            if !c.available.contains(&id) {
                c.available.push(id);
            }
        }
        c.connected = true;
        info!(available = c.available.len(), "connected");
        ConnectOutcome::Connected
    }

    /// Fetch then install; the app joins `installed_apps` only if both succeed.
    pub fn install_app(&self, id: &str) -> Result<()> {
        let _guard = self.begin(id, |c| {
            if !c.available.iter().any(|a| a == id) {
                return Err(StoreError::AppNotAvailable(id.to_string()));
            }
            if c.installed.iter().any(|a| a == id) {
                return Err(StoreError::AlreadyInstalled(id.to_string()));
            }
            Ok(())
        })?;

        self.perform(Arc::new(FetchAction::new(id, &self.config)))?;
        self.perform(Arc::new(InstallAction::new(id, &self.config)))?;

        let mut c = self.catalogue();
        if !c.installed.iter().any(|a| a == id) {
            c.installed.push(id.to_string());
        }
        Ok(())
    }

    /// Remove an installed app's files and drop it from `installed_apps`.
    pub fn remove_app(&self, id: &str) -> Result<()> {
        let _guard = self.begin(id, |c| {
            if c.installed.iter().any(|a| a == id) {
                Ok(())
            } else {
                Err(StoreError::AppNotAvailable(id.to_string()))
            }
        })?;

        self.perform(Arc::new(RemoveAction::new(id, &self.config)))?;

        self.catalogue().installed.retain(|a| a != id);
        Ok(())
    }

    /// Launch an installed app; returns the child's pid.
    pub fn start_app(&self, id: &str) -> Result<u32> {
        let _guard = self.begin(id, |c| {
            if c.apps.contains_key(id) {
                Ok(())
            } else {
                Err(StoreError::AppNotAvailable(id.to_string()))
            }
        })?;

        let action = self.perform(Arc::new(StartAction::new(id, &self.config)))?;
        action
            .pid()
            .ok_or_else(|| StoreError::AppNotInstalled(id.to_string()))
    }

    /// Whether a process launched from the app's installed entry point is alive.
    pub fn is_running(&self, id: &str) -> bool {
        let entry = self.config.entry_path(&self.config.local_root, id);
        is_app_running_simple(&entry)
    }

    pub(crate) fn emit(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(update);
        }
    }

    fn catalogue(&self) -> MutexGuard<'_, Catalogue> {
        self.catalogue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check preconditions and claim `id` in one step.
    fn begin(
        &self,
        id: &str,
        check: impl FnOnce(&Catalogue) -> Result<()>,
    ) -> Result<BusyGuard<'_>> {
        let mut c = self.catalogue();
        if c.busy.contains(id) {
            return Err(StoreError::ActionInProgress(id.to_string()));
        }
        check(&*c)?;
        c.busy.insert(id.to_string());
        Ok(BusyGuard {
            manager: self,
            id: id.to_string(),
        })
    }

    /// Record `action` as the app's latest before running it.
    fn perform<A: AppAction + 'static>(&self, action: Arc<A>) -> Result<Arc<A>> {
        let id = action.app_id().to_string();
        self.catalogue()
            .actions
            .insert(id.clone(), action.clone() as Arc<dyn AppAction>);
        debug!(app = %id, kind = ?action.kind(), "dispatching action");
        action.execute(self)?;
        Ok(action)
    }
}

impl ActionHost for AppManager {
    fn status(&self, id: &str) -> Option<AppStatus> {
        self.catalogue().apps.get(id).map(|a| a.status)
    }

    fn update_status(&self, id: &str, kind: TaskKind, status: AppStatus) {
        if let Some(app) = self.catalogue().apps.get_mut(id) {
            app.status = status;
        }
        debug!(app = id, ?kind, %status, "status changed");

        let mut update = ProgressUpdate::new(kind, Some(id), format!("{} is {}", id, status));
        update.status = Some(status);
        update.progress = self.progress(id).map(|p| p.progress).unwrap_or(0);
        self.emit(update);
    }

    fn report_progress(&self, kind: TaskKind, id: &str, progress: u8) {
        let mut update = ProgressUpdate::new(kind, Some(id), format!("{:?} {}: {}%", kind, id, progress));
        update.progress = progress;
        self.emit(update);
    }
}

/// Build an app from its directory, falling back to configured metadata.
fn describe(config: &StoreConfig, root: &Path, id: &str) -> App {
    let manifest = root.join(id).join(&config.manifest_file);
    let (author, version) = read_manifest(&manifest).unwrap_or_else(|e| {
        warn!(app = id, error = ?e, "ignoring unreadable manifest");
        (None, None)
    });
    App::new(
        id,
        author.unwrap_or_else(|| config.default_author.clone()),
        version.unwrap_or_else(|| config.default_version.clone()),
    )
}
