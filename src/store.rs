//! Progression store: per-learner `LearningPath` records with optimistic concurrency.
//!
//! Every write is a compare-and-swap on `version`. A mutation runs against a private
//! snapshot with no lock held; the write lock is only taken for the final
//! version check + swap, so slow callers never block each other.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::{LearningPath, Level};
use crate::error::{EngineError, PathViolation};

/// Uniqueness key: one path per `(owner, topic, level)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub owner_id: String,
    pub topic: String,
    pub level: Level,
}

impl PathKey {
    pub fn new(owner_id: &str, topic: &str, level: Level) -> Self {
        Self { owner_id: owner_id.to_string(), topic: topic.to_string(), level }
    }

    pub fn of(path: &LearningPath) -> Self {
        Self::new(&path.owner_id, &path.topic, path.level)
    }
}

#[derive(Default)]
struct Shelf {
    paths: HashMap<String, LearningPath>,
    keys: HashMap<PathKey, String>,
}

#[derive(Default)]
pub struct ProgressionStore {
    shelf: RwLock<Shelf>,
}

impl ProgressionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path_id: &str) -> Result<LearningPath, EngineError> {
        self.shelf
            .read()
            .await
            .paths
            .get(path_id)
            .cloned()
            .ok_or_else(|| EngineError::PathNotFound(path_id.to_string()))
    }

    pub async fn find_by_key(&self, key: &PathKey) -> Option<LearningPath> {
        let shelf = self.shelf.read().await;
        shelf.keys.get(key).and_then(|id| shelf.paths.get(id)).cloned()
    }

    pub async fn list_by_owner(&self, owner_id: &str) -> Vec<LearningPath> {
        let shelf = self.shelf.read().await;
        let mut out: Vec<LearningPath> = shelf.paths.values().filter(|p| p.owner_id == owner_id).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Insert a freshly built path. If another request already stored a path for the
    /// same key, that one wins and is returned with `false`.
    #[instrument(level = "debug", skip(self, path), fields(path_id = %path.id))]
    pub async fn insert(&self, path: LearningPath) -> (LearningPath, bool) {
        let key = PathKey::of(&path);
        let mut shelf = self.shelf.write().await;
        if let Some(existing) = shelf.keys.get(&key).and_then(|id| shelf.paths.get(id)) {
            debug!(target: "pathway", existing = %existing.id, "Path for key already stored");
            return (existing.clone(), false);
        }
        shelf.keys.insert(key, path.id.clone());
        shelf.paths.insert(path.id.clone(), path.clone());
        (path, true)
    }

    /// Apply `mutate` to a snapshot and commit iff the stored version is still `expected`.
    ///
    /// On success the version goes up by exactly one and `updated_at` is refreshed.
    /// A mutation that leaves the path unchanged is not written and keeps the version.
    /// Rejections and conflicts carry the pre-failure state.
    pub async fn update<R, F>(&self, path_id: &str, expected: u64, mutate: F) -> Result<(LearningPath, R), EngineError>
    where
        F: FnOnce(&mut LearningPath) -> Result<R, PathViolation>,
    {
        let snapshot = self.get(path_id).await?;
        if snapshot.version != expected {
            return Err(conflict(path_id, expected, snapshot));
        }

        let mut next = snapshot.clone();
        let out = match mutate(&mut next) {
            Ok(out) => out,
            Err(violation) => return Err(violation.with_state(snapshot)),
        };
        if next == snapshot {
            return Ok((snapshot, out));
        }
        next.version = expected + 1;
        next.updated_at = Utc::now();

        let mut shelf = self.shelf.write().await;
        match shelf.paths.get_mut(path_id) {
            None => Err(EngineError::PathNotFound(path_id.to_string())),
            Some(stored) if stored.version != expected => Err(conflict(path_id, expected, stored.clone())),
            Some(stored) => {
                *stored = next.clone();
                debug!(target: "pathway", %path_id, version = next.version, "Committed path update");
                Ok((next, out))
            }
        }
    }

    /// Like `update`, but against whatever version is current, retrying the
    /// compare-and-swap up to `max_attempts` times before giving up with `StaleState`.
    pub async fn update_latest<R, F>(&self, path_id: &str, max_attempts: u32, mut mutate: F) -> Result<(LearningPath, R), EngineError>
    where
        F: FnMut(&mut LearningPath) -> Result<R, PathViolation>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get(path_id).await?;
            match self.update(path_id, current.version, &mut mutate).await {
                Err(err) => retry_or_give_up(path_id, attempt, max_attempts, err)?,
                ok => return ok,
            }
        }
    }

    /// Like `remove`, but against whatever version is current, with the same retry bound.
    pub async fn remove_latest(&self, path_id: &str, max_attempts: u32) -> Result<LearningPath, EngineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get(path_id).await?;
            match self.remove(path_id, current.version).await {
                Err(err) => retry_or_give_up(path_id, attempt, max_attempts, err)?,
                ok => return ok,
            }
        }
    }

    /// Remove a path (and with it, its branches) iff the stored version is still `expected`.
    pub async fn remove(&self, path_id: &str, expected: u64) -> Result<LearningPath, EngineError> {
        let mut shelf = self.shelf.write().await;
        let stored = shelf
            .paths
            .get(path_id)
            .cloned()
            .ok_or_else(|| EngineError::PathNotFound(path_id.to_string()))?;
        if stored.version != expected {
            return Err(conflict(path_id, expected, stored));
        }
        shelf.paths.remove(path_id);
        shelf.keys.remove(&PathKey::of(&stored));
        Ok(stored)
    }

    pub async fn len(&self) -> usize {
        self.shelf.read().await.paths.len()
    }
}

/// `Ok` when a retrying writer should try again; otherwise the error to surface.
/// Only conflicts are retried, and only while `attempt < max_attempts`.
fn retry_or_give_up(path_id: &str, attempt: u32, max_attempts: u32, err: EngineError) -> Result<(), EngineError> {
    let attempts = max_attempts.max(1);
    match err {
        EngineError::Conflict { current, .. } if attempt >= attempts => {
            warn!(target: "pathway", %path_id, attempts, "Giving up on contended path write");
            Err(EngineError::StaleState { path_id: path_id.to_string(), attempts, current })
        }
        EngineError::Conflict { .. } => {
            warn!(target: "pathway", %path_id, attempt, "Path changed underneath write; retrying");
            Ok(())
        }
        other => Err(other),
    }
}

fn conflict(path_id: &str, expected: u64, current: LearningPath) -> EngineError {
    EngineError::Conflict {
        path_id: path_id.to_string(),
        expected,
        actual: current.version,
        current: Box::new(current),
    }
}
