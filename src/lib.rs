//! media-upload: command-line uploader built on [`media_upload_core`].
//!
//! - [`transport`]: reqwest-based multipart transport.
//! - [`load_config`]: YAML config plus environment overrides.
//! - [`cli`]: argument parsing and the `run` entrypoint.

pub mod cli;
pub mod load_config;
pub mod transport;
