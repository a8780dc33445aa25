#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use media_upload_core::cancel::CancelSignal;
use media_upload_core::contract::{ProgressSink, Transport, TransportError, UploadRequest};
use media_upload_core::file::FileDescriptor;
use media_upload_core::manager::{Transition, UploadSnapshot};
use media_upload_core::task::TaskStatus;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// One request parked inside [`ScriptedTransport`], driven by the test.
pub struct PendingUpload {
    pub request: UploadRequest,
    pub progress: ProgressSink,
    pub cancel: CancelSignal,
    finish: oneshot::Sender<Result<(), TransportError>>,
}

impl PendingUpload {
    pub fn name(&self) -> &str {
        &self.request.file.name
    }

    pub fn report(&self, sent: u64, total: Option<u64>) {
        (self.progress)(sent, total)
    }

    pub fn finish(self, outcome: Result<(), TransportError>) {
        let _ = self.finish.send(outcome);
    }
}

/// Transport that hands every request to the test and waits for a verdict,
/// rejecting with `Cancelled` as soon as the signal fires.
pub struct ScriptedTransport {
    calls: mpsc::UnboundedSender<PendingUpload>,
}

impl ScriptedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PendingUpload>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { calls }), rx)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn upload(
        &self,
        request: UploadRequest,
        progress: ProgressSink,
        cancel: CancelSignal,
    ) -> Result<(), TransportError> {
        let (finish, verdict) = oneshot::channel();
        let pending = PendingUpload {
            request,
            progress,
            cancel: cancel.clone(),
            finish,
        };
        if self.calls.send(pending).is_err() {
            return Err(TransportError::Network("test harness gone".into()));
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled(cancel.reason().unwrap_or_default())),
            verdict = verdict => verdict.unwrap_or_else(|_| Err(TransportError::Network("verdict dropped".into()))),
        }
    }
}

pub fn file(name: &str, size: usize, last_modified_ms: u64) -> FileDescriptor {
    FileDescriptor::new(name, "video/mp4", last_modified_ms, vec![7u8; size])
}

pub async fn next_call(rx: &mut mpsc::UnboundedReceiver<PendingUpload>) -> PendingUpload {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("transport was not called in time")
        .expect("transport channel closed")
}

pub async fn wait_for_snapshot<F>(rx: &mut watch::Receiver<UploadSnapshot>, mut predicate: F) -> UploadSnapshot
where
    F: FnMut(&UploadSnapshot) -> bool,
{
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
        .await
        .expect("snapshot condition not reached in time")
        .expect("manager dropped");
    snapshot.clone()
}

/// Reads transitions until one for `name` reaches `status`.
pub async fn wait_for_transition(
    rx: &mut broadcast::Receiver<Transition>,
    name: &str,
    status: TaskStatus,
) -> Transition {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let transition = rx.recv().await.expect("transition stream closed");
            if transition.file_name == name && transition.status == status {
                return transition;
            }
        }
    })
    .await
    .expect("transition not observed in time")
}

/// Every transition currently buffered.
pub fn drain(rx: &mut broadcast::Receiver<Transition>) -> Vec<Transition> {
    let mut out = Vec::new();
    while let Ok(t) = rx.try_recv() {
        out.push(t);
    }
    out
}

/// Reads transitions until `stop` matches, returning everything seen (inclusive).
pub async fn collect_until<F>(rx: &mut broadcast::Receiver<Transition>, mut stop: F) -> Vec<Transition>
where
    F: FnMut(&Transition) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        loop {
            let transition = rx.recv().await.expect("transition stream closed");
            let done = stop(&transition);
            seen.push(transition);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("transition not observed in time")
}
