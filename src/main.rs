use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use app_store::tasks::{self, TaskHandle};
use app_store::{App, AppManager, AppStatus, ConnectOutcome, ProgressUpdate, StoreConfig};

#[derive(Parser)]
#[command(name = "app_store", version, about = "Install, remove and start apps from a local store")]
struct Cli {
    /// Store root (defaults to ~/.app_store/store)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Local install root (defaults to ~/.app_store/local)
    #[arg(long)]
    local: Option<PathBuf>,

    /// Program used to run an app's entry point
    #[arg(long, conflicts_with = "direct")]
    launcher: Option<String>,

    /// Execute the entry point itself instead of passing it to a launcher
    #[arg(long)]
    direct: bool,

    /// Skip the simulated network and work delays
    #[arg(long)]
    fast: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show installed and available apps
    List,
    /// Fetch and install an app
    Install { id: String },
    /// Remove an installed app
    Remove { id: String },
    /// Start an installed app
    Start { id: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = StoreConfig::default();
    if let Some(store) = cli.store {
        config.store_root = store;
    }
    if let Some(local) = cli.local {
        config.local_root = local;
    }
    if cli.direct {
        config = config.with_launcher(None);
    } else if let Some(launcher) = cli.launcher {
        config = config.with_launcher(Some(launcher));
    }
    if cli.fast {
        config = config.without_delays();
    }

    let (tx, rx) = mpsc::channel();
    let manager = Arc::new(AppManager::new(config)?.with_progress_channel(tx));

    match cli.command {
        Command::List => {
            connect(&manager, &rx)?;
            print_apps(&manager, "Installed", &manager.installed_apps());
            print_apps(&manager, "Available", &manager.available_apps());
        }
        Command::Install { id } => {
            connect(&manager, &rx)?;
            wait(tasks::spawn_install(manager.clone(), &id, |_| {}), &rx)?;
            println!("{} installed", id);
        }
        Command::Remove { id } => {
            wait(tasks::spawn_remove(manager.clone(), &id, |_| {}), &rx)?;
            println!("{} removed", id);
        }
        Command::Start { id } => {
            let pid = wait(tasks::spawn_start(manager.clone(), &id, |_| {}), &rx)?;
            println!("{} started (pid {})", id, pid);
        }
    }
    Ok(())
}

fn connect(manager: &Arc<AppManager>, rx: &mpsc::Receiver<ProgressUpdate>) -> Result<()> {
    match wait(tasks::spawn_connect(manager.clone(), |_| {}), rx)? {
        ConnectOutcome::Unreachable => bail!(
            "store at {} is unreachable",
            manager.config().store_root.display()
        ),
        ConnectOutcome::Connected | ConnectOutcome::AlreadyConnected => Ok(()),
    }
}

/// Print updates until the task resolves.
fn wait<T>(handle: TaskHandle<T>, rx: &mpsc::Receiver<ProgressUpdate>) -> app_store::Result<T> {
    while !handle.is_finished() {
        if let Ok(update) = rx.recv_timeout(Duration::from_millis(50)) {
            print_update(&update);
        }
    }
    // pull whatever is left (non-blocking)
    while let Ok(update) = rx.try_recv() {
        print_update(&update);
    }
    handle.join()
}

fn print_update(update: &ProgressUpdate) {
    if let Some(err) = &update.error {
        eprintln!("Error: {}", err);
    } else if update.status.is_some() || update.finished {
        println!("{}", update.message);
    } else {
        println!("  [{:>3}%] {}", update.progress, update.message);
    }
}

fn print_apps(manager: &AppManager, title: &str, apps: &[App]) {
    println!("{} ({}):", title, apps.len());
    for app in apps {
        let running = app.status == AppStatus::Installed && manager.is_running(&app.id);
        println!(
            "  {:<20} {:<24} v{:<8} {:<12} {}{}",
            app.id,
            app.name,
            app.version,
            app.status,
            app.author,
            if running { "  • running" } else { "" }
        );
    }
}
