use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{Step, StepResult, Submission, SubmissionStatus};

/// Longest caller-supplied submission id accepted
pub const MAX_SUBMISSION_ID_LEN: usize = 128;

/// Submission records keyed by id.
///
/// Records live in memory; with a data directory each record is also
/// mirrored to `<id>.json` and lookups fall back to those files.
#[derive(Clone)]
pub struct SubmissionService {
    records: Arc<DashMap<String, Submission>>,
    data_dir: Option<Arc<PathBuf>>,
}

impl SubmissionService {
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            data_dir: None,
        }
    }

    pub async fn with_data_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create submissions dir {}", dir.display()))?;
        let records = load_records(&dir).await?;
        info!(
            "Submission records persisted to {} ({} loaded)",
            dir.display(),
            records.len()
        );

        Ok(Self {
            records: Arc::new(records),
            data_dir: Some(Arc::new(dir)),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.data_dir.is_some()
    }

    /// Open a pending submission for a step.
    ///
    /// An existing id is reset to pending with the new step and inputs; an
    /// unknown id (or none) creates a fresh record.
    pub async fn start(
        &self,
        id: Option<&str>,
        step: Step,
        inputs: Map<String, Value>,
    ) -> Submission {
        let submission = match id {
            Some(id) => {
                let existing = self.get(id).await;
                let now = Utc::now();
                let mut submission = existing.unwrap_or_else(|| {
                    let mut fresh = Submission::new(step, Map::new());
                    fresh.id = id.to_string();
                    fresh
                });
                submission.step = step;
                submission.inputs = inputs;
                submission.status = SubmissionStatus::Pending;
                submission.payload = None;
                submission.error = None;
                submission.updated_at = now;
                submission
            }
            None => Submission::new(step, inputs),
        };

        debug!(submission_id = %submission.id, step = %step, "Submission started");
        self.records
            .insert(submission.id.clone(), submission.clone());
        self.persist(&submission).await;
        submission
    }

    /// Store a step result; the submission status follows the result status.
    pub async fn complete(&self, id: &str, result: &StepResult) -> Option<Submission> {
        self.update(id, |submission| {
            submission.status = result.status.into();
            submission.payload = Some(result.payload.clone());
            submission.error = None;
        })
        .await
    }

    pub async fn fail(&self, id: &str, message: impl Into<String>) -> Option<Submission> {
        let message = message.into();
        self.update(id, |submission| {
            submission.status = SubmissionStatus::Failed;
            submission.error = Some(message);
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Option<Submission> {
        if let Some(record) = self.records.get(id) {
            return Some(record.clone());
        }

        let path = self.record_path(id)?;
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice::<Submission>(&bytes) {
            Ok(submission) => {
                self.records.insert(id.to_string(), submission.clone());
                Some(submission)
            }
            Err(e) => {
                warn!("Ignoring unreadable submission file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// In-memory records, newest first
    pub fn list(&self) -> Vec<Submission> {
        let mut submissions: Vec<Submission> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        submissions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        submissions
    }

    async fn update<F>(&self, id: &str, apply: F) -> Option<Submission>
    where
        F: FnOnce(&mut Submission),
    {
        // pull file-backed records into memory first
        self.get(id).await?;

        let updated = {
            let mut entry = self.records.get_mut(id)?;
            apply(entry.value_mut());
            entry.updated_at = Utc::now();
            entry.clone()
        };

        self.persist(&updated).await;
        Some(updated)
    }

    async fn persist(&self, submission: &Submission) {
        let Some(path) = self.record_path(&submission.id) else {
            return;
        };

        let bytes = match serde_json::to_vec_pretty(submission) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize submission {}: {}", submission.id, e);
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&path, bytes).await {
            warn!("Failed to write submission file {}: {}", path.display(), e);
        }
    }

    fn record_path(&self, id: &str) -> Option<PathBuf> {
        let dir = self.data_dir.as_deref()?;
        is_valid_submission_id(id).then(|| record_file(dir, id))
    }
}

/// Read every `<id>.json` in `dir`; unreadable files are skipped with a warning.
async fn load_records(dir: &Path) -> Result<DashMap<String, Submission>> {
    let records = DashMap::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read submissions dir {}", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        let parsed = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Submission>(&bytes).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(submission) if is_valid_submission_id(&submission.id) => {
                records.insert(submission.id.clone(), submission);
            }
            Ok(submission) => {
                warn!(
                    "Ignoring submission file {} with invalid id {:?}",
                    path.display(),
                    submission.id
                );
            }
            Err(e) => warn!("Ignoring unreadable submission file {}: {}", path.display(), e),
        }
    }

    Ok(records)
}

fn record_file(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", id))
}

/// Ids are used as file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn is_valid_submission_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SUBMISSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
