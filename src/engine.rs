//! The path engine: the operations clients drive, on top of the progression store.
//!
//! Path creation is the only slow operation (content generation) and is all-or-nothing:
//! nothing is stored unless every topic's content arrived within the timeout. Every
//! other operation is a single compare-and-swap write. With an explicit expected
//! version a mismatch fails immediately; without one the write is retried against
//! the latest version a bounded number of times.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adaptation::{apply, assess, plan, AdaptationOutcome, PerformanceSignal};
use crate::branching::{self, BranchTrack};
use crate::builder::{build_sequence, BuildOptions, StepDraft, TopicPart};
use crate::checkpoint::record_attempt;
use crate::config::EngineConfig;
use crate::domain::{Answers, Attempt, BranchOrigin, LearningPath, Level};
use crate::error::{EngineError, PathViolation};
use crate::generator::{ContentGenerator, GeneratedContent};
use crate::prerequisites::{resolve, PrerequisiteCatalog};
use crate::progress;
use crate::seeds::template_content;
use crate::store::{PathKey, ProgressionStore};

pub struct PathEngine {
    store: ProgressionStore,
    generator: Arc<dyn ContentGenerator>,
    catalog: Arc<dyn PrerequisiteCatalog>,
    config: EngineConfig,
}

impl PathEngine {
    pub fn new(generator: Arc<dyn ContentGenerator>, catalog: Arc<dyn PrerequisiteCatalog>, config: EngineConfig) -> Self {
        Self { store: ProgressionStore::new(), generator, catalog, config }
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    /// Build and store a path for `(owner, topic, level)`, or return the one already stored.
    /// The flag is `true` when a new path was created.
    #[instrument(level = "info", skip(self), fields(%level))]
    pub async fn create_path(&self, owner_id: &str, topic: &str, level: Level) -> Result<(LearningPath, bool), EngineError> {
        let owner_id = owner_id.trim();
        let topic = topic.trim();
        if owner_id.is_empty() {
            return Err(EngineError::Validation("ownerId must not be empty".into()));
        }
        if topic.is_empty() {
            return Err(EngineError::Validation("topic must not be empty".into()));
        }
        if let Some(existing) = self.store.find_by_key(&PathKey::new(owner_id, topic, level)).await {
            info!(target: "pathway", path_id = %existing.id, "Path already exists; returning it");
            return Ok((existing, false));
        }

        let prerequisites = resolve(self.catalog.as_ref(), topic, level)?;
        let topics: Vec<&str> = prerequisites.order.iter().map(String::as_str).chain(std::iter::once(topic)).collect();

        let timeout = self.config.generation_timeout();
        let generation = async {
            let mut contents = Vec::with_capacity(topics.len());
            for t in &topics {
                contents.push(self.generator.generate(t, level).await?);
            }
            Ok::<_, String>(contents)
        };
        let contents = match tokio::time::timeout(timeout, generation).await {
            Ok(Ok(contents)) => contents,
            Ok(Err(e)) => {
                warn!(target: "pathway", %topic, error = %e, "Content generation failed; nothing stored");
                return Err(EngineError::Generation(e));
            }
            Err(_) => {
                warn!(target: "pathway", %topic, ?timeout, "Content generation timed out; nothing stored");
                return Err(EngineError::GenerationTimeout(timeout));
            }
        };

        let parts: Vec<TopicPart<'_>> = topics
            .iter()
            .zip(contents.iter())
            .map(|(t, content)| TopicPart {
                topic: t,
                depends_on: prerequisites.dependencies_of(t),
                content,
                is_prerequisite: *t != topic,
            })
            .collect();
        let opts = BuildOptions {
            checkpoint_interval: self.config.checkpoint_interval,
            passing_score: self.config.default_passing_score,
            level,
        };
        let built = build_sequence(&parts, &opts);

        let now = Utc::now();
        let path = LearningPath {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            topic: topic.to_string(),
            level,
            version: 1,
            steps: built.steps,
            checkpoints: built.checkpoints,
            branches: Vec::new(),
            active_branch_id: None,
            created_at: now,
            updated_at: now,
        };
        let (path, created) = self.store.insert(path).await;
        info!(
            target: "pathway",
            path_id = %path.id,
            created,
            steps = path.steps.len(),
            checkpoints = path.checkpoints.len(),
            prerequisites = prerequisites.order.len(),
            "Learning path ready"
        );
        Ok((path, created))
    }

    pub async fn get_path(&self, path_id: &str) -> Result<LearningPath, EngineError> {
        self.store.get(path_id).await
    }

    pub async fn list_paths(&self, owner_id: &str) -> Vec<LearningPath> {
        self.store.list_by_owner(owner_id).await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn delete_path(&self, path_id: &str, expected: Option<u64>) -> Result<LearningPath, EngineError> {
        let removed = match expected {
            Some(version) => self.store.remove(path_id, version).await?,
            None => self.store.remove_latest(path_id, self.config.max_update_attempts).await?,
        };
        info!(target: "pathway", %path_id, version = removed.version, "Learning path deleted");
        Ok(removed)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn complete_step(&self, path_id: &str, step_id: &str, expected: Option<u64>) -> Result<LearningPath, EngineError> {
        let (path, step) = self.mutate(path_id, expected, |p| progress::complete_step(p, step_id, Utc::now())).await?;
        info!(target: "pathway", %path_id, %step_id, order = step.order, version = path.version, "Step completed");
        Ok(path)
    }

    /// Record a checkpoint attempt. With `auto_adapt` on, the recorded history then feeds
    /// a separate adaptation write whose failure never undoes the attempt.
    #[instrument(level = "info", skip(self, answers), fields(answered = answers.len()))]
    pub async fn take_checkpoint(
        &self,
        path_id: &str,
        checkpoint_id: &str,
        answers: &Answers,
        expected: Option<u64>,
    ) -> Result<(LearningPath, Attempt), EngineError> {
        let (path, attempt) = self
            .mutate(path_id, expected, |p| record_attempt(p, checkpoint_id, answers, Utc::now()))
            .await?;
        info!(target: "pathway", %path_id, %checkpoint_id, score = attempt.score, passed = attempt.passed, version = path.version, "Checkpoint taken");

        if self.config.auto_adapt {
            match self.adapt_path(path_id, &PerformanceSignal::Recorded, None).await {
                Ok((adapted, _)) => return Ok((adapted, attempt)),
                Err(e) => warn!(target: "pathway", %path_id, error = %e, "Automatic adaptation failed; attempt kept"),
            }
        }
        Ok((path, attempt))
    }

    /// Fork a branch off a completed main step; it becomes the active sequence.
    /// Without `initial_steps` the branch starts as a fresh copy of the parent's tail.
    #[instrument(level = "info", skip(self, initial_steps), fields(custom_steps = initial_steps.as_ref().map(Vec::len)))]
    pub async fn create_branch(
        &self,
        path_id: &str,
        fork_at_step_order: u32,
        branch_name: &str,
        initial_steps: Option<Vec<StepDraft>>,
        expected: Option<u64>,
    ) -> Result<(LearningPath, String), EngineError> {
        let track = match initial_steps {
            Some(drafts) => BranchTrack::Drafts(drafts),
            None => BranchTrack::CopyTail,
        };
        let max_branches = self.config.max_branches;
        self.mutate(path_id, expected, |p| {
            branching::create_branch(p, fork_at_step_order, branch_name, track.clone(), BranchOrigin::User, max_branches, Utc::now())
        })
        .await
    }

    /// Point the path at a branch, or back at the main sequence with `None`.
    #[instrument(level = "info", skip(self))]
    pub async fn switch_branch(&self, path_id: &str, branch_id: Option<&str>, expected: Option<u64>) -> Result<LearningPath, EngineError> {
        let (path, ()) = self.mutate(path_id, expected, |p| branching::switch_branch(p, branch_id)).await?;
        info!(target: "pathway", %path_id, active_branch = ?path.active_branch_id, version = path.version, "Active sequence switched");
        Ok(path)
    }

    /// Apply at most one notch of adaptation to the uncompleted tail.
    ///
    /// Content for the chosen plan is fetched before the write (falling back to
    /// templates on failure or timeout). The plan is re-derived from the state the
    /// write actually lands on; if it differs, template content is used instead.
    #[instrument(level = "info", skip(self, signal))]
    pub async fn adapt_path(
        &self,
        path_id: &str,
        signal: &PerformanceSignal,
        expected: Option<u64>,
    ) -> Result<(LearningPath, AdaptationOutcome), EngineError> {
        let cfg = &self.config;

        let snapshot = self.store.get(path_id).await?;
        let trend = match assess(&snapshot, signal, cfg) {
            Ok(trend) => trend,
            Err(violation) => return Err(violation.with_state(snapshot)),
        };
        let planned = plan(&snapshot, trend, cfg);
        let request = planned.content_request();
        let content = match &request {
            Some((topic, level)) => Some(self.generate_or_template(topic, *level).await),
            None => None,
        };

        let (path, outcome) = self
            .mutate(path_id, expected, |p| -> Result<AdaptationOutcome, PathViolation> {
                let fresh = plan(p, assess(p, signal, cfg)?, cfg);
                let content = if fresh.content_request() == request { content.as_ref() } else { None };
                apply(p, &fresh, content, cfg, Utc::now())
            })
            .await?;
        info!(target: "pathway", %path_id, ?trend, ?outcome, version = path.version, "Adaptation evaluated");
        Ok((path, outcome))
    }

    async fn generate_or_template(&self, topic: &str, level: Level) -> GeneratedContent {
        let timeout = self.config.generation_timeout();
        match tokio::time::timeout(timeout, self.generator.generate(topic, level)).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                warn!(target: "pathway", %topic, %level, error = %e, "Adaptation content unavailable; using template");
                template_content(topic, level)
            }
            Err(_) => {
                warn!(target: "pathway", %topic, %level, ?timeout, "Adaptation content timed out; using template");
                template_content(topic, level)
            }
        }
    }

    async fn mutate<R, F>(&self, path_id: &str, expected: Option<u64>, f: F) -> Result<(LearningPath, R), EngineError>
    where
        F: FnMut(&mut LearningPath) -> Result<R, PathViolation>,
    {
        match expected {
            Some(version) => self.store.update(path_id, version, f).await,
            None => self.store.update_latest(path_id, self.config.max_update_attempts, f).await,
        }
    }
}
