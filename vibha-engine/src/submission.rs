//! The external submission collaborator.
//!
//! Form data leaves the engine through the [`Submitter`] trait. The engine
//! never retries on its own: a failed call surfaces as a `Failed` wizard
//! state and the user decides whether to retry.

use crate::config::SubmissionConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Payload of an admission enquiry. Serialized with the form's field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub parent_name: String,
    pub phone: String,
    pub email: String,
    pub child_name: String,
    pub child_age: String,
    pub grade: String,
    pub tour_date: String,
    pub tour_time: String,
    pub message: String,
}

/// Everything the site sends to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Submission {
    Newsletter { email: String },
    Admission(AdmissionRequest),
}

impl Submission {
    pub fn kind(&self) -> &'static str {
        match self {
            Submission::Newsletter { .. } => "newsletter",
            Submission::Admission(_) => "admission",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Proof that the collaborator accepted a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub reference: String,
    pub accepted_at: DateTime<Utc>,
}

/// The collaborator rejected or could not process a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("submission failed: {reason}")]
pub struct SubmitError {
    pub reason: String,
}

impl SubmitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type SubmitFuture<'a> = Pin<Box<dyn Future<Output = Result<Receipt, SubmitError>> + Send + 'a>>;

/// An external system that accepts form submissions.
pub trait Submitter: Send + Sync {
    fn submit<'a>(&'a self, submission: &'a Submission) -> SubmitFuture<'a>;
}

/// Stands in for the real backend: waits a fixed delay, then accepts, or
/// rejects when configured to fail.
pub struct SimulatedSubmitter {
    delay: Duration,
    fail_with: Option<String>,
    sequence: AtomicU64,
}

impl SimulatedSubmitter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_with: None,
            sequence: AtomicU64::new(0),
        }
    }

    /// Makes every submission fail with `reason`.
    pub fn failing(delay: Duration, reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::new(delay)
        }
    }

    pub fn from_config(config: &SubmissionConfig) -> Self {
        match &config.fail_with {
            Some(reason) => Self::failing(config.delay(), reason.clone()),
            None => Self::new(config.delay()),
        }
    }

    /// Number of submissions accepted so far.
    pub fn accepted(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Submitter for SimulatedSubmitter {
    fn submit<'a>(&'a self, submission: &'a Submission) -> SubmitFuture<'a> {
        Box::pin(async move {
            debug!(kind = submission.kind(), delay = ?self.delay, "Simulating submission.");
            tokio::time::sleep(self.delay).await;

            if let Some(reason) = &self.fail_with {
                warn!(kind = submission.kind(), %reason, "Simulated submission rejected.");
                return Err(SubmitError::new(reason.clone()));
            }

            let number = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(Receipt {
                reference: format!("VIBHA-{number:06}"),
                accepted_at: Utc::now(),
            })
        })
    }
}
