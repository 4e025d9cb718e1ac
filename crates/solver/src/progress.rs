//! Persisted progress of a deployment plan.
//!
//! The solver itself keeps no state between runs. This module records which
//! steps completed, keyed by a hash of the declarations, so a later run can
//! resume with [`crate::Solver::resume`].

use std::{
    collections::BTreeSet,
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{DeploymentPlan, NodeId};

/// Default file name for stored progress.
pub const PROGRESS_FILENAME: &str = ".linkplan-progress.json";

/// SHA-256 of the raw declarations, hex encoded.
///
/// The declarations are serialized to JSON first. Object keys come out sorted,
/// so the hash does not depend on key order in the descriptor.
pub fn declarations_hash(raw: &[Value]) -> String {
    let mut hasher = Sha256::new();
    for declaration in raw {
        hasher.update(declaration.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Completed steps of a plan, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanProgress {
    /// Hash of the declarations the plan was solved from.
    pub declarations_hash: String,
    /// Nodes whose deployment completed.
    pub completed: BTreeSet<NodeId>,
    /// Unix timestamp of the last update.
    pub updated_at: i64,
    /// Version of linkplan that wrote the file.
    pub linkplan_version: String,
}

impl PlanProgress {
    /// Capture the completed steps of `plan`.
    pub fn from_plan(declarations_hash: String, plan: &DeploymentPlan) -> Self {
        Self {
            declarations_hash,
            completed: plan.completed_nodes(),
            updated_at: chrono::Utc::now().timestamp(),
            linkplan_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Whether this progress was recorded for the given declarations.
    pub fn matches(&self, declarations_hash: &str) -> bool {
        self.declarations_hash == declarations_hash
    }

    /// Save as formatted JSON, holding an exclusive lock on the file while writing.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize progress")?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open progress file {}", path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock progress file {}", path.display()))?;

        let written = file
            .set_len(0)
            .and_then(|()| file.write_all(json.as_bytes()))
            .and_then(|()| file.sync_all());

        FileExt::unlock(&file)
            .with_context(|| format!("Failed to unlock progress file {}", path.display()))?;
        written.with_context(|| format!("Failed to write progress to {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            completed = self.completed.len(),
            "Progress saved"
        );
        Ok(())
    }

    /// Load progress from a file.
    ///
    /// Returns an error if the file doesn't exist, is malformed, or cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Progress file does not exist: {}", path.display());
        }

        let mut file = File::open(path)
            .with_context(|| format!("Failed to open progress file {}", path.display()))?;
        file.lock_shared()
            .with_context(|| format!("Failed to lock progress file {}", path.display()))?;

        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        FileExt::unlock(&file)
            .with_context(|| format!("Failed to unlock progress file {}", path.display()))?;
        read.with_context(|| format!("Failed to read progress from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse progress JSON")
    }

    /// Mark `node` as completed.
    pub fn record(&mut self, node: NodeId) {
        self.completed.insert(node);
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// Completed nodes stored for `declarations_hash`, or nothing if the file is
    /// missing or belongs to other declarations.
    pub fn load_completed(path: &Path, declarations_hash: &str) -> Result<BTreeSet<NodeId>> {
        if !path.exists() {
            return Ok(BTreeSet::new());
        }

        let progress = Self::load_from_file(path)?;
        if !progress.matches(declarations_hash) {
            tracing::warn!(
                path = %path.display(),
                "Stored progress belongs to different declarations, starting over"
            );
            return Ok(BTreeSet::new());
        }

        Ok(progress.completed)
    }
}

/// Writes progress to disk after every completed step.
///
/// Meant to be plugged into [`crate::PlanRunner::on_step_completed`] so that an
/// interrupted run keeps every step that finished before the interruption.
#[derive(Debug)]
pub struct ProgressRecorder {
    path: PathBuf,
    progress: Mutex<PlanProgress>,
}

impl ProgressRecorder {
    pub fn new(path: impl Into<PathBuf>, progress: PlanProgress) -> Self {
        Self {
            path: path.into(),
            progress: Mutex::new(progress),
        }
    }

    /// Record `node` as completed and save immediately.
    pub fn record(&self, node: &NodeId) -> Result<()> {
        let mut progress = self
            .progress
            .lock()
            .map_err(|_| anyhow::anyhow!("Progress lock poisoned"))?;
        progress.record(node.clone());
        progress.save_to_file(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempdir::TempDir;

    use super::*;
    use crate::Solver;

    fn raw() -> Vec<Value> {
        vec![json!({
            "dev": [
                { "contractName": "Token" },
                { "contractName": "Vault", "links": ["Token"] }
            ]
        })]
    }

    #[test]
    fn test_hash_determinism() {
        let hash1 = declarations_hash(&raw());
        let hash2 = declarations_hash(&raw());

        assert_eq!(hash1, hash2, "Hash should be deterministic");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let a = vec![json!({ "dev": [{ "contractName": "A", "args": [1] }] })];
        let b = vec![json!({ "dev": [{ "args": [1], "contractName": "A" }] })];
        assert_eq!(declarations_hash(&a), declarations_hash(&b));
    }

    #[test]
    fn test_hash_changes_with_links() {
        let mut changed = raw();
        changed[0]["dev"][1]["links"] = json!([]);
        assert_ne!(
            declarations_hash(&raw()),
            declarations_hash(&changed),
            "Hash should change when links change"
        );
    }

    #[test]
    fn test_hash_depends_on_declaration_boundaries() {
        let split = vec![json!({ "dev": [] }), json!({ "live": [] })];
        let merged = vec![json!({ "dev": [], "live": [] })];
        assert_ne!(declarations_hash(&split), declarations_hash(&merged));
    }

    #[test]
    fn test_progress_save_and_load() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(PROGRESS_FILENAME);

        let mut plan = Solver::solve(&raw()).expect("plan");
        if let Some(step) = plan.step_mut(&NodeId::new("dev", "Token")) {
            step.begin().expect("begin");
            step.complete().expect("complete");
        }

        let hash = declarations_hash(&raw());
        let progress = PlanProgress::from_plan(hash.clone(), &plan);
        progress.save_to_file(&path).expect("Failed to save progress");

        let loaded = PlanProgress::load_from_file(&path).expect("Failed to load progress");
        assert_eq!(loaded, progress, "Loaded progress should match original");
        assert_eq!(
            PlanProgress::load_completed(&path, &hash).expect("completed"),
            [NodeId::new("dev", "Token")].into_iter().collect()
        );
    }

    #[test]
    fn test_save_overwrites_longer_content() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(PROGRESS_FILENAME);
        std::fs::write(&path, "x".repeat(4096)).expect("Failed to write filler");

        let plan = Solver::solve(&raw()).expect("plan");
        let progress = PlanProgress::from_plan(declarations_hash(&raw()), &plan);
        progress.save_to_file(&path).expect("Failed to save progress");

        assert_eq!(
            PlanProgress::load_from_file(&path).expect("Failed to load progress"),
            progress
        );
    }

    #[test]
    fn test_load_completed_ignores_other_declarations() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(PROGRESS_FILENAME);

        let progress = PlanProgress {
            declarations_hash: "0".repeat(64),
            completed: [NodeId::new("dev", "Token")].into_iter().collect(),
            updated_at: 1_737_316_800,
            linkplan_version: "0.1.0".to_string(),
        };
        progress.save_to_file(&path).expect("Failed to save progress");

        let completed =
            PlanProgress::load_completed(&path, &declarations_hash(&raw())).expect("completed");
        assert!(completed.is_empty());
    }

    #[test]
    fn test_recorder_saves_every_completion() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(PROGRESS_FILENAME);
        let hash = declarations_hash(&raw());

        let plan = Solver::solve(&raw()).expect("plan");
        let recorder = ProgressRecorder::new(&path, PlanProgress::from_plan(hash.clone(), &plan));

        recorder
            .record(&NodeId::new("dev", "Token"))
            .expect("Failed to record progress");
        assert_eq!(
            PlanProgress::load_completed(&path, &hash).expect("completed"),
            [NodeId::new("dev", "Token")].into_iter().collect()
        );

        recorder
            .record(&NodeId::new("dev", "Vault"))
            .expect("Failed to record progress");
        assert_eq!(
            PlanProgress::load_completed(&path, &hash)
                .expect("completed")
                .len(),
            2
        );
    }

    #[test]
    fn test_load_completed_missing_file_is_empty() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let completed = PlanProgress::load_completed(&temp_dir.path().join("none.json"), "abc")
            .expect("completed");
        assert!(completed.is_empty());
    }

    #[test]
    fn test_load_corrupted_file() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(PROGRESS_FILENAME);
        std::fs::write(&path, "{ invalid json }").expect("Failed to write corrupted file");

        assert!(
            PlanProgress::load_from_file(&path).is_err(),
            "Loading corrupted file should return error"
        );
    }
}
