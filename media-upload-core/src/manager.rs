//! Upload manager: admits files, drives each through a [`Transport`] and
//! exposes per-task state to observers.
//!
//! # Partitions
//! - `in_flight`: tasks the user sees as uploading (and, in multi-file mode,
//!   cancelled or failed tasks until they are removed).
//! - `completed`: successful uploads. One slot under
//!   [`CompletionPartitioning::ReplaceInPlace`], a list otherwise.
//! - `detached`: tasks pushed out of view by supersession or removal whose
//!   transport has not reported back yet. They still reach exactly one
//!   terminal state; they are dropped as soon as they do.
//!
//! # Observation
//! [`UploadManager::subscribe`] yields a `watch` receiver of [`UploadSnapshot`];
//! [`UploadManager::transitions`] yields a `broadcast` receiver with one
//! [`Transition`] per status change, including detached tasks.
//!
//! All mutation goes through this module. Transport callbacks only carry a
//! [`TaskId`] back in; a task that no longer exists or is already terminal
//! ignores them.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelSignal;
use crate::config::{AdmissionPolicy, CompletionPartitioning, UploadPolicy};
use crate::contract::{ProgressSink, Transport, TransportError, UploadRequest};
use crate::file::FileDescriptor;
use crate::task::{percent, TaskId, TaskStatus, TaskView, UploadTask};

pub const SUPERSEDED_REASON: &str = "superseded by new file";
pub const CANCELLED_REASON: &str = "Upload cancelled";
pub const REMOVED_REASON: &str = "Upload removed";

const TRANSITION_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Cancelled,
    Error,
}

/// Most recent terminal outcome, shown until dismissed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusNotice {
    pub kind: NoticeKind,
    pub message: String,
    pub task: TaskId,
}

/// Terminal transitions counted since the manager was created, detached
/// tasks included. Unlike the transition stream this never drops entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub cancelled: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadSnapshot {
    pub in_flight: Vec<TaskView>,
    pub completed: Vec<TaskView>,
    pub notice: Option<StatusNotice>,
    /// Tasks not yet terminal, visible or detached.
    pub active: usize,
    pub outcomes: OutcomeCounts,
}

impl UploadSnapshot {
    pub fn find(&self, id: TaskId) -> Option<&TaskView> {
        self.in_flight
            .iter()
            .chain(self.completed.iter())
            .find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub id: TaskId,
    pub file_name: String,
    pub status: TaskStatus,
    pub progress: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetachCause {
    Superseded,
    Removed,
}

struct Detached {
    task: UploadTask,
    cause: DetachCause,
}

#[derive(Default)]
struct ManagerState {
    in_flight: Vec<UploadTask>,
    completed: Vec<TaskView>,
    detached: Vec<Detached>,
    notice: Option<StatusNotice>,
    outcomes: OutcomeCounts,
}

enum Slot {
    InFlight(usize),
    Detached(usize),
}

impl ManagerState {
    fn locate(&self, id: TaskId) -> Option<Slot> {
        if let Some(i) = self.in_flight.iter().position(|t| t.id() == id) {
            return Some(Slot::InFlight(i));
        }
        self.detached
            .iter()
            .position(|d| d.task.id() == id)
            .map(Slot::Detached)
    }

    fn task_mut(&mut self, slot: &Slot) -> &mut UploadTask {
        match *slot {
            Slot::InFlight(i) => &mut self.in_flight[i],
            Slot::Detached(i) => &mut self.detached[i].task,
        }
    }

    fn active(&self) -> usize {
        self.in_flight
            .iter()
            .filter(|t| !t.status().is_terminal())
            .count()
            + self
                .detached
                .iter()
                .filter(|d| !d.task.status().is_terminal())
                .count()
    }

    fn snapshot(&self) -> UploadSnapshot {
        UploadSnapshot {
            in_flight: self.in_flight.iter().map(UploadTask::view).collect(),
            completed: self.completed.clone(),
            notice: self.notice.clone(),
            active: self.active(),
            outcomes: self.outcomes,
        }
    }
}

struct Shared {
    policy: UploadPolicy,
    state: Mutex<ManagerState>,
    snapshot_tx: watch::Sender<UploadSnapshot>,
    transitions_tx: broadcast::Sender<Transition>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &ManagerState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn emit(&self, task: &UploadTask) {
        // No receivers is fine.
        let _ = self.transitions_tx.send(Transition {
            id: task.id(),
            file_name: task.file().name.clone(),
            status: task.status(),
            progress: task.progress(),
        });
    }

    fn on_progress(&self, id: TaskId, sent: u64, total: Option<u64>) {
        let pct = percent(sent, total);
        let mut state = self.lock();
        if self.apply_progress(&mut state, id, pct) {
            debug!(task_id = %id, progress = pct, sent, ?total, "[UPLOAD] Progress");
            self.publish(&state);
        }
    }

    /// Raises a visible task's progress; at 100 the task completes. Returns
    /// `true` if anything changed. Detached tasks always have their handle
    /// invoked, so they never advance.
    fn apply_progress(&self, state: &mut ManagerState, id: TaskId, pct: u8) -> bool {
        let Some(i) = state.in_flight.iter().position(|t| t.id() == id) else {
            debug!(task_id = %id, "[UPLOAD] Progress for unknown or detached task ignored");
            return false;
        };
        if !state.in_flight[i].advance(pct) {
            return false;
        }
        if pct == 100 {
            self.complete(state, i);
        }
        true
    }

    /// Progress reached 100: the only path into `Succeeded`.
    fn complete(&self, state: &mut ManagerState, i: usize) {
        let mut task = state.in_flight.remove(i);
        if !task.succeed() {
            state.in_flight.insert(i, task);
            return;
        }

        state.outcomes.succeeded += 1;
        info!(task_id = %task.id(), file = %task.file().name, "[UPLOAD] Upload succeeded");
        self.emit(&task);
        state.notice = Some(StatusNotice {
            kind: NoticeKind::Success,
            message: format!("Successfully uploaded {}", task.file().name),
            task: task.id(),
        });
        match self.policy.completion {
            CompletionPartitioning::ReplaceInPlace => {
                state.completed.clear();
                state.completed.push(task.view());
            }
            CompletionPartitioning::AppendToCompletedList => {
                state.completed.push(task.view());
            }
        }
    }

    fn on_outcome(&self, id: TaskId, outcome: Result<(), TransportError>) {
        let mut state = self.lock();
        let Some(slot) = state.locate(id) else {
            debug!(task_id = %id, "[UPLOAD] Outcome for unknown task ignored");
            return;
        };
        let task = state.task_mut(&slot);
        if task.status().is_terminal() {
            return;
        }

        let cancelled = task.cancel_requested() || matches!(&outcome, Err(e) if e.is_cancellation());
        match outcome {
            Ok(()) if !cancelled => {
                // The transport's own success event stands in for the 100% report,
                // which also covers uploads whose total was never known.
                self.apply_progress(&mut state, id, 100);
            }
            _ if cancelled => {
                if !task.cancel_requested() {
                    // Aborted by the transport itself; recorded as the task's own cancellation.
                    task.request_cancel(CANCELLED_REASON);
                }
                task.mark_cancelled();
                self.emit(task);
                warn!(task_id = %id, file = %task.file().name, "[UPLOAD] Upload cancelled");
                state.outcomes.cancelled += 1;
                self.settle_cancelled(&mut state, slot);
            }
            Err(e) => {
                let detail = e.to_string();
                task.fail(detail.clone());
                self.emit(task);
                error!(task_id = %id, file = %task.file().name, error = %detail, "[UPLOAD] Upload failed");
                state.outcomes.failed += 1;
                self.settle_failed(&mut state, slot, id, detail);
            }
            Ok(()) => {}
        }
        self.publish(&state);
    }

    fn settle_cancelled(&self, state: &mut ManagerState, slot: Slot) {
        match slot {
            Slot::InFlight(i) => {
                let id = state.in_flight[i].id();
                state.notice = Some(StatusNotice {
                    kind: NoticeKind::Cancelled,
                    message: "Upload cancelled!".to_string(),
                    task: id,
                });
                if self.policy.admission == AdmissionPolicy::Single {
                    state.in_flight.remove(i);
                }
            }
            Slot::Detached(i) => {
                let detached = state.detached.remove(i);
                if detached.cause == DetachCause::Superseded {
                    state.notice = Some(StatusNotice {
                        kind: NoticeKind::Cancelled,
                        message: "Upload cancelled!".to_string(),
                        task: detached.task.id(),
                    });
                }
            }
        }
    }

    fn settle_failed(&self, state: &mut ManagerState, slot: Slot, id: TaskId, detail: String) {
        let visible = match slot {
            Slot::InFlight(i) => {
                if self.policy.admission == AdmissionPolicy::Single {
                    state.in_flight.remove(i);
                }
                true
            }
            Slot::Detached(i) => {
                let detached = state.detached.remove(i);
                detached.cause == DetachCause::Superseded
            }
        };
        if visible {
            state.notice = Some(StatusNotice {
                kind: NoticeKind::Error,
                message: format!("Error uploading file: {detail}"),
                task: id,
            });
        }
    }
}

/// Tracks uploads for one upload surface. Create it when the surface appears,
/// drop it when it goes away; there is no global instance.
///
/// Operations that start uploads spawn tokio tasks and must run inside a runtime.
pub struct UploadManager {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
}

impl UploadManager {
    pub fn new(transport: Arc<dyn Transport>, policy: UploadPolicy) -> Self {
        let (snapshot_tx, _) = watch::channel(UploadSnapshot::default());
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CAPACITY);
        info!(admission = ?policy.admission, completion = ?policy.completion, "[UPLOAD] Upload manager created");
        Self {
            transport,
            shared: Arc::new(Shared {
                policy,
                state: Mutex::new(ManagerState::default()),
                snapshot_tx,
                transitions_tx,
            }),
        }
    }

    pub fn policy(&self) -> UploadPolicy {
        self.shared.policy
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn transitions(&self) -> broadcast::Receiver<Transition> {
        self.shared.transitions_tx.subscribe()
    }

    /// Accepts files from the file source and starts uploading them.
    ///
    /// Single-file mode takes the first file, superseding whatever is in flight.
    /// Multi-file mode appends every file and uploads them all concurrently.
    pub fn admit(&self, files: Vec<FileDescriptor>) {
        if files.is_empty() {
            debug!("[UPLOAD] Nothing to admit");
            return;
        }

        let mut files = files;
        if self.shared.policy.admission == AdmissionPolicy::Single && files.len() > 1 {
            warn!(
                count = files.len(),
                "[UPLOAD] Single-file mode received several files; keeping the first"
            );
            files.truncate(1);
        }

        let mut started = Vec::with_capacity(files.len());
        {
            let mut state = self.shared.lock();
            state.notice = None;

            if self.shared.policy.admission == AdmissionPolicy::Single {
                self.detach_all(&mut state);
            }

            for file in files {
                let file = Arc::new(file);
                if self.shared.policy.admission == AdmissionPolicy::Multiple {
                    self.detach_same_identity(&mut state, &file);
                }

                let mut task = UploadTask::new(Arc::clone(&file));
                info!(
                    task_id = %task.id(),
                    file = %file.name,
                    size = file.size(),
                    kind = file.kind().as_str(),
                    "[UPLOAD] Task admitted"
                );
                self.shared.emit(&task);

                let Some(signal) = task.start() else {
                    continue;
                };
                self.shared.emit(&task);
                started.push((task.id(), file, signal));
                state.in_flight.push(task);
            }
            self.shared.publish(&state);
        }

        for (id, file, signal) in started {
            self.begin_upload(id, file, signal);
        }
    }

    /// Hands one task to the transport on its own tokio task.
    fn begin_upload(&self, id: TaskId, file: Arc<FileDescriptor>, signal: CancelSignal) {
        let transport = Arc::clone(&self.transport);
        let shared = Arc::clone(&self.shared);
        let sink: ProgressSink = {
            let shared = Arc::clone(&self.shared);
            Arc::new(move |sent, total| shared.on_progress(id, sent, total))
        };
        let request = UploadRequest { task_id: id, file };

        debug!(task_id = %id, "[UPLOAD] Starting transport request");
        tokio::spawn(async move {
            let outcome = transport.upload(request, sink, signal).await;
            shared.on_outcome(id, outcome);
        });
    }

    /// Single-file mode: the slot is replaced wholesale.
    fn detach_all(&self, state: &mut ManagerState) {
        for task in std::mem::take(&mut state.in_flight) {
            self.detach(state, task, DetachCause::Superseded, SUPERSEDED_REASON);
        }
    }

    /// Multi-file mode: only a live task for the same file is replaced.
    fn detach_same_identity(&self, state: &mut ManagerState, file: &FileDescriptor) {
        let identity = file.identity();
        if let Some(i) = state
            .in_flight
            .iter()
            .position(|t| t.has_live_handle() && t.identity() == identity)
        {
            let task = state.in_flight.remove(i);
            self.detach(state, task, DetachCause::Superseded, SUPERSEDED_REASON);
        }
    }

    fn detach(&self, state: &mut ManagerState, task: UploadTask, cause: DetachCause, reason: &str) {
        if task.status().is_terminal() {
            return;
        }
        if task.request_cancel(reason) {
            info!(task_id = %task.id(), file = %task.file().name, reason, "[UPLOAD] Cancelling displaced task");
        }
        state.detached.push(Detached { task, cause });
    }

    /// Invokes the task's cancellation handle. The transition to `Cancelled`
    /// follows once the transport reports back. No-op without a live handle.
    pub fn cancel(&self, id: TaskId) -> bool {
        let state = self.shared.lock();
        let requested = match state.locate(id) {
            Some(Slot::InFlight(i)) => state.in_flight[i].request_cancel(CANCELLED_REASON),
            Some(Slot::Detached(i)) => state.detached[i].task.request_cancel(CANCELLED_REASON),
            None => false,
        };
        if requested {
            info!(task_id = %id, "[UPLOAD] Cancellation requested");
        } else {
            debug!(task_id = %id, "[UPLOAD] Cancel ignored: no live handle");
        }
        requested
    }

    /// Cancels every task that still has a live handle.
    pub fn cancel_all(&self) -> usize {
        let state = self.shared.lock();
        let mut count = 0;
        for task in state.in_flight.iter().chain(state.detached.iter().map(|d| &d.task)) {
            if task.request_cancel(CANCELLED_REASON) {
                count += 1;
            }
        }
        info!(count, "[UPLOAD] Cancelled all live uploads");
        count
    }

    /// Drops a task from whichever partition holds it, cancelling it first if
    /// it is still uploading, and clears its notice.
    pub fn remove(&self, id: TaskId) -> bool {
        let mut state = self.shared.lock();
        let removed = if let Some(i) = state.in_flight.iter().position(|t| t.id() == id) {
            let task = state.in_flight.remove(i);
            self.detach(&mut state, task, DetachCause::Removed, REMOVED_REASON);
            true
        } else if let Some(i) = state.completed.iter().position(|t| t.id == id) {
            state.completed.remove(i);
            true
        } else if let Some(d) = state.detached.iter_mut().find(|d| d.task.id() == id) {
            d.cause = DetachCause::Removed;
            true
        } else {
            false
        };

        if state.notice.as_ref().is_some_and(|n| n.task == id) {
            state.notice = None;
        }
        if removed {
            info!(task_id = %id, "[UPLOAD] Task removed");
            self.shared.publish(&state);
        }
        removed
    }

    pub fn dismiss_notice(&self) {
        let mut state = self.shared.lock();
        if state.notice.take().is_some() {
            self.shared.publish(&state);
        }
    }
}
