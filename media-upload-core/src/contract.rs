#![allow(unused)]

//! # contract: interface between the upload manager and a transport
//!
//! A transport moves one file to the remote endpoint. The manager hands it an
//! [`UploadRequest`], a [`ProgressSink`] and a [`CancelSignal`], and expects:
//!
//! - cumulative byte counts through the sink, with `sent == total` reported
//!   only once the endpoint has accepted the upload;
//! - `Ok(())` on success;
//! - `Err(TransportError::Cancelled(_))` once the signal fires, and no further
//!   progress after that;
//! - any other [`TransportError`] for network, server or request failures.
//!
//! ## Mocking & Testing
//! The trait is annotated for `mockall`, so consumers get `MockTransport` for
//! deterministic tests (enabled by the `test-export-mocks` feature).

use std::sync::Arc;

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::cancel::CancelSignal;
use crate::file::FileDescriptor;
use crate::task::TaskId;

/// Receives `(bytes_sent, bytes_total)`; the total is `None` when unknown.
pub type ProgressSink = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// One file to send.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub task_id: TaskId,
    pub file: Arc<FileDescriptor>,
}

/// Why a transport gave up on a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("upload cancelled: {0}")]
    Cancelled(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server rejected upload with status {status}")]
    Status { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Cancelled(_))
    }
}

/// Sends one file as `multipart/form-data` and reports progress.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn upload(
        &self,
        request: UploadRequest,
        progress: ProgressSink,
        cancel: CancelSignal,
    ) -> Result<(), TransportError>;
}
