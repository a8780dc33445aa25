#![doc = "HTTP transport: sends one file as multipart/form-data to the configured upload endpoint."]
//
//! # HTTP Transport
//!
//! Implements [`media_upload_core::contract::Transport`] on top of `reqwest`.
//!
//! - The file travels in a part named `file`, streamed in fixed-size chunks.
//!   Each chunk the client pulls is reported as cumulative bytes sent.
//! - The final `sent == total` report is held back until the endpoint answers
//!   with a 2xx status, so 100% always means the upload was accepted.
//! - Cancellation drops the in-flight request and returns `Cancelled`.
//! - Non-2xx answers, timeouts and network faults map to the other
//!   [`TransportError`] variants.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use media_upload_core::cancel::CancelSignal;
use media_upload_core::contract::{ProgressSink, Transport, TransportError, UploadRequest};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};

/// Name of the multipart part carrying the file.
pub const FILE_FIELD: &str = "file";

/// Size of each streamed body chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Connection details for the upload endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    pub endpoint: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
    pub timeout: Option<Duration>,
    /// Extra text parts, e.g. an upload preset required by a media host.
    pub form_fields: BTreeMap<String, String>,
}

pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            tracing::error!(error = ?e, "Failed to build HTTP client");
            TransportError::Request(e.to_string())
        })?;
        tracing::info!(
            endpoint = %config.endpoint,
            auth = config.auth_token.is_some(),
            timeout_secs = config.timeout.map(|t| t.as_secs()),
            extra_fields = config.form_fields.len(),
            "Initialised HTTP transport"
        );
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn build_form(&self, request: &UploadRequest, progress: ProgressSink) -> Result<Form, TransportError> {
        let file = Arc::clone(&request.file);
        let total = file.size();

        let chunks = stream::unfold(0usize, move |offset| {
            let file = Arc::clone(&file);
            let progress = Arc::clone(&progress);
            async move {
                if offset >= file.content.len() {
                    return None;
                }
                let end = (offset + CHUNK_SIZE).min(file.content.len());
                let chunk = file.content[offset..end].to_vec();
                let sent = end as u64;
                // Completion is reported only after the server accepted the body.
                if sent < total {
                    progress(sent, Some(total));
                }
                Some((Ok::<Vec<u8>, std::io::Error>(chunk), end))
            }
        });

        let mut part = Part::stream_with_length(Body::wrap_stream(chunks), total)
            .file_name(request.file.name.clone());
        if !request.file.mime.is_empty() {
            part = part
                .mime_str(&request.file.mime)
                .map_err(|e| TransportError::Request(format!("invalid MIME type: {e}")))?;
        }

        let mut form = Form::new();
        for (name, value) in &self.config.form_fields {
            form = form.text(name.clone(), value.clone());
        }
        Ok(form.part(FILE_FIELD, part))
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_builder() {
        TransportError::Request(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload(
        &self,
        request: UploadRequest,
        progress: ProgressSink,
        cancel: CancelSignal,
    ) -> Result<(), TransportError> {
        let total = request.file.size();
        tracing::info!(
            task_id = %request.task_id,
            file = %request.file.name,
            size = total,
            endpoint = %self.config.endpoint,
            "Uploading file"
        );

        let form = self.build_form(&request, Arc::clone(&progress))?;
        let mut builder = self.client.post(&self.config.endpoint).multipart(form);
        if let Some(token) = &self.config.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                let reason = cancel.reason().unwrap_or_default();
                tracing::warn!(task_id = %request.task_id, reason = %reason, "Upload request aborted");
                return Err(TransportError::Cancelled(reason));
            }
            result = builder.send() => result.map_err(|e| {
                tracing::error!(task_id = %request.task_id, error = ?e, "Upload request failed");
                classify(e)
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            tracing::error!(task_id = %request.task_id, status = status.as_u16(), "Upload rejected by server");
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled(cancel.reason().unwrap_or_default()));
        }
        progress(total, Some(total));
        tracing::info!(task_id = %request.task_id, status = status.as_u16(), "Upload accepted by server");
        Ok(())
    }
}
