use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How many files one interaction may admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    Single,
    Multiple,
}

/// Where finished uploads go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPartitioning {
    /// One in-flight slot and one completed slot; a success replaces the previous one.
    ReplaceInPlace,
    /// Successes move from the in-flight list to a growing completed list.
    AppendToCompletedList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub admission: AdmissionPolicy,
    pub completion: CompletionPartitioning,
}

impl UploadPolicy {
    pub fn single() -> Self {
        Self {
            admission: AdmissionPolicy::Single,
            completion: CompletionPartitioning::ReplaceInPlace,
        }
    }

    pub fn multiple() -> Self {
        Self {
            admission: AdmissionPolicy::Multiple,
            completion: CompletionPartitioning::AppendToCompletedList,
        }
    }

    pub fn for_admission(admission: AdmissionPolicy) -> Self {
        match admission {
            AdmissionPolicy::Single => Self::single(),
            AdmissionPolicy::Multiple => Self::multiple(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            admission = ?self.admission,
            completion = ?self.completion,
            "Loaded UploadPolicy"
        );
        debug!(?self, "UploadPolicy loaded (full debug)");
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::single()
    }
}
