#![doc = "media-upload-core: upload manager, task model and transport contract for media-upload."]

//! This crate holds everything about an upload except the HTTP client.
//! The CLI crate provides the real transport; tests use the `mockall` mock
//! exported from [`contract`] or a scripted transport of their own.
//!
//! # Usage
//! Build an [`manager::UploadManager`] with a [`contract::Transport`] and an
//! [`config::UploadPolicy`], feed it files selected through [`source::FileSource`],
//! and observe the state through `snapshot()`, `subscribe()` or `transitions()`.

pub mod cancel;
pub mod config;
pub mod contract;
pub mod file;
pub mod manager;
pub mod source;
pub mod task;
