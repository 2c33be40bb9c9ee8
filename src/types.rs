//! Core data types shared across the store manager.

use std::fmt;

/// Lifecycle status of an app, as driven by actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AppStatus {
    #[default]
    None,
    Fetching,
    Fetched,
    Installing,
    Installed,
    Removing,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::None => "none",
            AppStatus::Fetching => "fetching",
            AppStatus::Fetched => "fetched",
            AppStatus::Installing => "installing",
            AppStatus::Installed => "installed",
            AppStatus::Removing => "removing",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One installable application known to the catalogue.
#[derive(Clone, Debug)]
pub struct App {
    pub id: String,
    pub name: String,
    pub author: String,
    pub version: String,
    pub status: AppStatus,
}

impl App {
    pub fn new(id: impl Into<String>, author: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: prettify(&id),
            id,
            author: author.into(),
            version: version.into(),
            status: AppStatus::None,
        }
    }

    pub fn with_status(mut self, status: AppStatus) -> Self {
        self.status = status;
        self
    }
}

/// Catalogue membership is by id.
impl PartialEq for App {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for App {}

/// "text_editor" -> "Text editor"
pub fn prettify(id: &str) -> String {
    let spaced = id.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Kind of work an update or action refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Connect,
    Fetch,
    Install,
    Remove,
    Start,
}

/// Progress update message sent from running actions and background tasks.
#[derive(Clone, Debug)]
pub struct ProgressUpdate {
    pub kind: TaskKind,
    pub app_id: Option<String>,
    pub progress: u8,              // 0 ..= 100
    pub status: Option<AppStatus>, // set when the app's status changed
    pub message: String,
    pub finished: bool,
    pub error: Option<String>,
}

impl ProgressUpdate {
    pub fn new(kind: TaskKind, app_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            app_id: app_id.map(str::to_string),
            progress: 0,
            status: None,
            message: message.into(),
            finished: false,
            error: None,
        }
    }
}

/// What an observer sees when polling an app's latest action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub kind: TaskKind,
    pub progress: u8,
    pub status: AppStatus,
}

/// Result of `AppManager::connect`. Unreachable is reported, not raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
    Unreachable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_derived_from_id() {
        assert_eq!(prettify("text_editor"), "Text editor");
        assert_eq!(prettify("calculator"), "Calculator");
        assert_eq!(prettify("MY_APP"), "My app");
        assert_eq!(prettify(""), "");

        let app = App::new("image_viewer", "someone", "2.1");
        assert_eq!(app.name, "Image viewer");
        assert_eq!(app.status, AppStatus::None);
    }

    #[test]
    fn apps_compare_by_id() {
        let a = App::new("calc", "a", "1");
        let b = App::new("calc", "b", "2").with_status(AppStatus::Installed);
        assert_eq!(a, b);
        assert_ne!(a, App::new("other", "a", "1"));
    }

    #[test]
    fn status_strings() {
        assert_eq!(AppStatus::default().to_string(), "none");
        assert_eq!(AppStatus::Installing.as_str(), "installing");
    }
}
