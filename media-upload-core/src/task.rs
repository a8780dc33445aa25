//! Per-file upload task and its state machine.
//!
//! `Queued -> InProgress -> {Succeeded | Cancelled | Failed}`. Terminal states
//! are absorbing; the cancellation handle only lives while `InProgress`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::cancel::{CancelSignal, CancellationHandle};
use crate::file::{FileDescriptor, FileIdentity, FileKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Queued,
    InProgress,
    Succeeded,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "uploading",
            TaskStatus::Succeeded => "done",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Converts a byte count into a whole percentage.
///
/// Unknown or zero totals give 0. A ratio that would round up to 100 while
/// bytes are still outstanding is held at 99.
pub fn percent(sent: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            if sent >= total {
                100
            } else {
                let pct = ((sent as f64 / total as f64) * 100.0).round();
                (pct.clamp(0.0, 99.0)) as u8
            }
        }
        _ => 0,
    }
}

/// One admitted file and its observable upload state.
#[derive(Debug)]
pub struct UploadTask {
    id: TaskId,
    file: Arc<FileDescriptor>,
    status: TaskStatus,
    progress: u8,
    cancel: Option<CancellationHandle>,
    error_detail: Option<String>,
}

impl UploadTask {
    pub fn new(file: Arc<FileDescriptor>) -> Self {
        Self {
            id: TaskId::new(),
            file,
            status: TaskStatus::Queued,
            progress: 0,
            cancel: None,
            error_detail: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn file(&self) -> &Arc<FileDescriptor> {
        &self.file
    }

    pub fn identity(&self) -> FileIdentity {
        self.file.identity()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// A handle is live while the task is in progress and nobody has invoked it yet.
    pub fn has_live_handle(&self) -> bool {
        self.cancel.as_ref().is_some_and(|h| !h.is_cancelled())
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.as_ref().is_some_and(|h| h.is_cancelled())
    }

    /// `Queued -> InProgress`, acquiring a fresh handle. Returns the signal
    /// for the transport, or `None` if the task was not queued.
    pub fn start(&mut self) -> Option<CancelSignal> {
        if self.status != TaskStatus::Queued {
            return None;
        }
        let handle = CancellationHandle::new();
        let signal = handle.signal();
        self.cancel = Some(handle);
        self.status = TaskStatus::InProgress;
        Some(signal)
    }

    /// Invokes the handle if it is live. No state change happens here; the
    /// transition follows when the transport reports back.
    pub fn request_cancel(&self, reason: &str) -> bool {
        match &self.cancel {
            Some(handle) if self.status == TaskStatus::InProgress => handle.cancel(reason),
            _ => false,
        }
    }

    /// Raises progress to `max(current, pct)`. Returns `true` if it changed.
    /// Ignored unless in progress and not being cancelled.
    pub fn advance(&mut self, pct: u8) -> bool {
        if self.status != TaskStatus::InProgress || self.cancel_requested() {
            return false;
        }
        let pct = pct.min(100);
        if pct <= self.progress {
            return false;
        }
        self.progress = pct;
        true
    }

    /// `InProgress -> Succeeded`, only once progress has reached 100.
    pub fn succeed(&mut self) -> bool {
        if self.status != TaskStatus::InProgress || self.progress != 100 {
            return false;
        }
        self.status = TaskStatus::Succeeded;
        self.cancel = None;
        true
    }

    /// `InProgress -> Cancelled`, only after the handle was invoked.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.status != TaskStatus::InProgress || !self.cancel_requested() {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.cancel = None;
        true
    }

    /// `InProgress -> Failed` with a human-readable cause.
    pub fn fail(&mut self, detail: impl Into<String>) -> bool {
        if self.status != TaskStatus::InProgress {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error_detail = Some(detail.into());
        self.cancel = None;
        true
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id,
            name: self.file.name.clone(),
            size: self.file.size(),
            kind: self.file.kind(),
            last_modified_ms: self.file.last_modified_ms,
            status: self.status,
            progress: self.progress,
            error_detail: self.error_detail.clone(),
        }
    }
}

/// Read-only copy of a task for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub name: String,
    pub size: u64,
    pub kind: FileKind,
    pub last_modified_ms: u64,
    pub status: TaskStatus,
    pub progress: u8,
    pub error_detail: Option<String>,
}
