//! Interactive capabilities a conversion may need: choosing files and telling the
//! operator about warnings. Front ends supply implementations; the engine only sees
//! the traits.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Open,
    Save,
}

/// What the caller wants the operator to pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub mode: FileMode,
    pub title: String,
    /// Acceptable extensions without the dot; empty means any.
    pub extensions: Vec<String>,
}

impl FileRequest {
    pub fn open(title: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            mode: FileMode::Open,
            title: title.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn save(title: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            mode: FileMode::Save,
            title: title.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NoticeKind::Info => "info",
            NoticeKind::Warning => "warning",
            NoticeKind::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("File dialog failed: {0}")]
pub struct DialogError(pub String);

pub trait FileChooser {
    /// Asks for a file. `Ok(None)` means the operator cancelled.
    fn choose_file(&self, request: &FileRequest) -> Result<Option<PathBuf>, DialogError>;
}

pub trait Notifier {
    fn notify(&self, message: &str, kind: NoticeKind);
}

/// Scripted dialogs for tests: answers file requests from a queue and records every
/// request and notice.
#[derive(Debug, Default)]
pub struct RecordingDialogs {
    answers: Mutex<Vec<Option<PathBuf>>>,
    requests: Mutex<Vec<FileRequest>>,
    notices: Mutex<Vec<(NoticeKind, String)>>,
}

impl RecordingDialogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues answers, consumed first to last. An exhausted queue cancels.
    pub fn with_answers(answers: impl IntoIterator<Item = Option<PathBuf>>) -> Self {
        let mut queued: Vec<_> = answers.into_iter().collect();
        queued.reverse();
        Self {
            answers: Mutex::new(queued),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<FileRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn notices(&self) -> Vec<(NoticeKind, String)> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl FileChooser for RecordingDialogs {
    fn choose_file(&self, request: &FileRequest) -> Result<Option<PathBuf>, DialogError> {
        self.requests
            .lock()
            .map_err(|e| DialogError(e.to_string()))?
            .push(request.clone());
        let mut answers = self.answers.lock().map_err(|e| DialogError(e.to_string()))?;
        Ok(answers.pop().flatten())
    }
}

impl Notifier for RecordingDialogs {
    fn notify(&self, message: &str, kind: NoticeKind) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((kind, message.to_string()));
        }
    }
}

/// Discards notices; for runs without an operator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _message: &str, _kind: NoticeKind) {}
}
