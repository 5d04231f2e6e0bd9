// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk persistence for the job/skill/binding tables: each is a single
//! JSON array written with a temp-file-then-rename so a crash mid-write
//! never leaves a truncated file behind. No write-ahead log: the explicit
//! non-goal covering inbound channel events doesn't cover scheduler state,
//! but a periodic snapshot is sufficient given jobs/skills are re-derived
//! entirely from their own table on every tick.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use warden_core::{ChannelBinding, Job, Skill};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error at {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("malformed JSON at {path}: {source}")]
    Json { path: String, source: serde_json::Error },
}

fn load_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistenceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&text).map_err(|e| json_err(path, e))
}

fn save_array<T: Serialize>(path: &Path, items: &[T]) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(items).map_err(|e| json_err(path, e))?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(|e| io_err(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io { path: path.display().to_string(), source }
}

fn json_err(path: &Path, source: serde_json::Error) -> PersistenceError {
    PersistenceError::Json { path: path.display().to_string(), source }
}

pub fn load_jobs(path: &Path) -> Result<Vec<Job>, PersistenceError> {
    load_array(path)
}

pub fn save_jobs(path: &Path, jobs: &[Job]) -> Result<(), PersistenceError> {
    save_array(path, jobs)
}

pub fn load_skills(path: &Path) -> Result<Vec<Skill>, PersistenceError> {
    load_array(path)
}

pub fn save_skills(path: &Path, skills: &[Skill]) -> Result<(), PersistenceError> {
    save_array(path, skills)
}

pub fn load_bindings(path: &Path) -> Result<Vec<ChannelBinding>, PersistenceError> {
    load_array(path)
}

pub fn save_bindings(path: &Path, bindings: &[ChannelBinding]) -> Result<(), PersistenceError> {
    save_array(path, bindings)
}

/// Last-modified time of `path`, in epoch milliseconds, used to derive the
/// snapshot's `saved_at` rather than persisting it as its own field.
pub fn saved_at_epoch_ms(path: &Path) -> Option<u64> {
    let metadata = std::fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    modified.duration_since(std::time::UNIX_EPOCH).ok().map(|d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{JobAction, JobId, JobType};

    fn sample_job() -> Job {
        Job {
            id: JobId::new("j1"),
            name: "nightly".into(),
            job_type: JobType::Cron,
            cron_expression: Some("0 9 * * *".into()),
            timezone: Some("UTC".into()),
            scheduled_at: None,
            action: JobAction::ToolCall { tool_name: "fs_cleanup".into(), parameters: serde_json::Value::Null },
            enabled: true,
            run_count: 0,
            max_runs: None,
            expires_at: None,
            last_run_at: None,
        }
    }

    #[test]
    fn load_from_missing_path_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = load_jobs(&dir.path().join("jobs.json")).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        save_jobs(&path, &[sample_job()]).unwrap();
        let loaded = load_jobs(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "nightly");
    }

    #[test]
    fn save_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        save_jobs(&path, &[sample_job()]).unwrap();
        assert!(!dir.path().join("jobs.json.tmp").exists());
    }

    #[test]
    fn malformed_json_surfaces_as_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(load_jobs(&path), Err(PersistenceError::Json { .. })));
    }
}
