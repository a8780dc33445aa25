use crate::transport::TransportConfig;
use anyhow::Result;
use media_upload_core::config::{AdmissionPolicy, CompletionPartitioning, UploadPolicy};
use media_upload_core::source::SourcePolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub const ENDPOINT_ENV: &str = "UPLOAD_ENDPOINT";
pub const AUTH_TOKEN_ENV: &str = "UPLOAD_AUTH_TOKEN";

/// Everything a run needs: where to send files, how the manager behaves and
/// which files the source lets through.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub transport: TransportConfig,
    pub policy: UploadPolicy,
    /// `completion` as written in the config file, if it was set.
    pub completion: Option<CompletionPartitioning>,
    pub source: SourcePolicy,
}

impl UploadConfig {
    /// Switches admission mode, keeping the source policy consistent with it.
    /// An explicit `completion` from the file survives the switch.
    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.policy = UploadPolicy::for_admission(admission);
        if let Some(completion) = self.completion {
            self.policy.completion = completion;
        }
        self.source.max_files = match admission {
            AdmissionPolicy::Single => Some(1),
            AdmissionPolicy::Multiple => None,
        };
        self
    }
}

#[derive(Deserialize)]
struct StaticConfig {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default = "default_mode")]
    mode: AdmissionPolicy,
    #[serde(default)]
    completion: Option<CompletionPartitioning>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    form_fields: BTreeMap<String, String>,
    #[serde(default)]
    source: SourceSection,
}

#[derive(Deserialize, Default)]
struct SourceSection {
    #[serde(default)]
    max_file_bytes: Option<u64>,
    #[serde(default)]
    accept: Vec<String>,
}

fn default_mode() -> AdmissionPolicy {
    AdmissionPolicy::Single
}

/// Loads a static YAML config file (no secrets) and injects the endpoint
/// override and auth token from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<UploadConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let endpoint = match std::env::var(ENDPOINT_ENV) {
        Ok(var) if !var.trim().is_empty() => {
            info!(endpoint = %var, "{ENDPOINT_ENV} found in env, overriding config file");
            var
        }
        _ => match static_conf.endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => endpoint,
            _ => {
                error!("No upload endpoint in config file or environment");
                anyhow::bail!(
                    "No upload endpoint configured: set `endpoint` in the config file or {ENDPOINT_ENV}"
                );
            }
        },
    };

    if let Err(e) = reqwest::Url::parse(&endpoint) {
        error!(error = ?e, endpoint = %endpoint, "Upload endpoint is not a valid URL");
        anyhow::bail!("Upload endpoint is not a valid URL ({endpoint}): {e}");
    }

    let auth_token = match std::env::var(AUTH_TOKEN_ENV) {
        Ok(token) if !token.is_empty() => {
            info!("{AUTH_TOKEN_ENV} found in env");
            Some(token)
        }
        _ => {
            info!("{AUTH_TOKEN_ENV} not set, uploading without authorization header");
            None
        }
    };

    let mut policy = UploadPolicy::for_admission(static_conf.mode);
    if let Some(completion) = static_conf.completion {
        policy.completion = completion;
    }
    policy.trace_loaded();

    let source = SourcePolicy {
        max_files: match static_conf.mode {
            AdmissionPolicy::Single => Some(1),
            AdmissionPolicy::Multiple => None,
        },
        max_file_bytes: static_conf.source.max_file_bytes,
        accept: static_conf.source.accept,
    };

    let transport = TransportConfig {
        endpoint,
        auth_token,
        timeout: static_conf.timeout_secs.map(Duration::from_secs),
        form_fields: static_conf.form_fields,
    };

    info!(
        endpoint = %transport.endpoint,
        mode = ?policy.admission,
        max_file_bytes = ?source.max_file_bytes,
        accept = source.accept.len(),
        "Config loaded and merged successfully"
    );

    Ok(UploadConfig {
        transport,
        policy,
        completion: static_conf.completion,
        source,
    })
}
