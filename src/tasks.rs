//! Background tasks used by callers (a UI, the CLI) to run manager operations
//! without blocking their own thread.
//!
//! Every task runs on a fresh worker thread, sends a start and a finish
//! `ProgressUpdate`, hands its result to a completion callback and finally
//! resolves its `TaskHandle`. The manager's catalogue is already updated by the
//! time the callback runs.

use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::Result;
use crate::manager::AppManager;
use crate::types::{ConnectOutcome, ProgressUpdate, TaskKind};

/// Handle to an operation running in the background.
pub struct TaskHandle<T> {
    kind: TaskKind,
    app_id: Option<String>,
    handle: JoinHandle<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the task is done. A panic in the worker is re-raised here.
    pub fn join(self) -> Result<T> {
        match self.handle.join() {
            Ok(res) => res,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

/// Spawn a background connect to the remote store.
pub fn spawn_connect(
    manager: Arc<AppManager>,
    on_done: impl FnOnce(&Result<ConnectOutcome>) + Send + 'static,
) -> TaskHandle<ConnectOutcome> {
    spawn_task(manager, TaskKind::Connect, None, |m, _| Ok(m.connect()), connect_failure, on_done)
}

/// Spawn a background fetch + install of `id`.
pub fn spawn_install(
    manager: Arc<AppManager>,
    id: &str,
    on_done: impl FnOnce(&Result<()>) + Send + 'static,
) -> TaskHandle<()> {
    spawn_task(manager, TaskKind::Install, Some(id), |m, id| m.install_app(id), |_| None, on_done)
}

/// Spawn a background removal of `id`.
pub fn spawn_remove(
    manager: Arc<AppManager>,
    id: &str,
    on_done: impl FnOnce(&Result<()>) + Send + 'static,
) -> TaskHandle<()> {
    spawn_task(manager, TaskKind::Remove, Some(id), |m, id| m.remove_app(id), |_| None, on_done)
}

/// Spawn a background launch of `id`; resolves to the child's pid.
pub fn spawn_start(
    manager: Arc<AppManager>,
    id: &str,
    on_done: impl FnOnce(&Result<u32>) + Send + 'static,
) -> TaskHandle<u32> {
    spawn_task(manager, TaskKind::Start, Some(id), |m, id| m.start_app(id), |_| None, on_done)
}

/// Connect never raises; an unreachable store is still worth an error message.
fn connect_failure(outcome: &ConnectOutcome) -> Option<&'static str> {
    (*outcome == ConnectOutcome::Unreachable).then_some("store unreachable")
}

fn spawn_task<T, F, C>(
    manager: Arc<AppManager>,
    kind: TaskKind,
    app_id: Option<&str>,
    op: F,
    reported: fn(&T) -> Option<&'static str>,
    on_done: C,
) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&AppManager, &str) -> Result<T> + Send + 'static,
    C: FnOnce(&Result<T>) + Send + 'static,
{
    let app_id = app_id.map(str::to_string);
    let id = app_id.clone().unwrap_or_default();

    let handle = thread::spawn(move || {
        let subject = if id.is_empty() { "store" } else { id.as_str() };
        let target = (!id.is_empty()).then_some(id.as_str());

        // send start
        manager.emit(ProgressUpdate::new(
            kind,
            target,
            format!("{:?} {} started", kind, subject),
        ));
        debug!(?kind, subject, "background task started");

        let result = op(manager.as_ref(), id.as_str());

        let mut done = ProgressUpdate::new(kind, target, format!("{:?} {} finished", kind, subject));
        done.finished = true;
        match &result {
            Ok(_) => done.progress = 100,
            Err(e) => {
                done.message = format!("{:?} {} failed", kind, subject);
                done.error = Some(e.to_string());
            }
        }
        if let Some(reason) = result.as_ref().ok().and_then(reported) {
            done.message = format!("{:?} {} failed", kind, subject);
            done.error = Some(reason.to_string());
            done.progress = 0;
        }
        manager.emit(done);

        on_done(&result);
        result
    });

    TaskHandle {
        kind,
        app_id,
        handle,
    }
}
