use anyhow::{Context, Result};
use plist::Value;
use std::{
    ffi::OsString,
    fs, io,
    path::{self, Path, PathBuf},
    process::{Command, Stdio},
    thread,
};
use sysinfo::System;
use walkdir::WalkDir;

// Filesystem and process helpers: scanning app directories, reading manifests,
// removing installed artifacts, launching entry points and checking running processes.

/// List the app directories directly under `root`, sorted by name.
pub fn scan_app_dirs(root: &Path) -> Result<Vec<String>> {
    let mut res = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let ent = entry.with_context(|| format!("Read dir {:?}", root))?;
        if !ent.file_type().is_dir() {
            continue;
        }
        if let Some(id) = ent.file_name().to_str() {
            res.push(id.to_string());
        }
    }
    Ok(res)
}

/// Read `Author` and `Version` from an app's manifest plist, if present.
pub fn read_manifest(path: &Path) -> Result<(Option<String>, Option<String>)> {
    if !path.exists() {
        return Ok((None, None));
    }
    let v = Value::from_file(path).with_context(|| format!("Read manifest {:?}", path))?;
    let dict = v.as_dictionary();
    let field = |key: &str| {
        dict.and_then(|d| d.get(key))
            .and_then(|v| v.as_string())
            .map(|s| s.to_string())
    };
    Ok((field("Author"), field("Version")))
}

/// Size in bytes of a single artifact file.
pub fn artifact_size(path: &Path) -> io::Result<u64> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a file", path.display()),
        ));
    }
    Ok(meta.len())
}

/// Recursively remove an app directory. Returns false when it was already gone.
pub fn remove_app_dir(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Resolve `entry` against the current directory without touching the filesystem.
pub fn absolute_entry(entry: &Path) -> io::Result<PathBuf> {
    path::absolute(entry)
}

/// Launch an entry point as a detached child and return its pid.
///
/// The child runs from the app's directory, so a relative entry is resolved
/// first. It is reaped on a throwaway thread; its exit status is not reported.
pub fn launch(launcher: Option<&str>, entry: &Path) -> io::Result<u32> {
    let entry = absolute_entry(entry)?;
    let entry = entry.as_path();
    let mut cmd = match launcher {
        Some(program) => {
            let mut c = Command::new(program);
            c.arg(entry);
            c
        }
        None => Command::new(entry),
    };
    if let Some(dir) = entry.parent() {
        cmd.current_dir(dir);
    }
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let pid = child.id();
    thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(pid)
}

/// Whether any process in the snapshot refers to `entry`.
pub fn is_app_running(sys: &System, entry: &Path) -> bool {
    sys.processes()
        .values()
        .any(|proc_| process_mentions(proc_.cmd(), proc_.exe(), entry))
}

/// Simpler runtime check (fresh System inside)
pub fn is_app_running_simple(entry: &Path) -> bool {
    let entry = absolute_entry(entry).unwrap_or_else(|_| entry.to_path_buf());
    let mut sys = System::new_all();
    sys.refresh_all();
    is_app_running(&sys, &entry)
}

fn process_mentions(cmd: &[OsString], exe: Option<&Path>, entry: &Path) -> bool {
    if exe == Some(entry) {
        return true;
    }
    let needle = entry.to_string_lossy();
    cmd.iter().any(|arg| arg.to_string_lossy() == needle)
}
