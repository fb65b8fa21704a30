//! Error taxonomy for the path engine.
//!
//! `PathViolation` is what a mutation rejects with; the store attaches the
//! pre-failure path to it, producing `EngineError::Rejected`.

use std::time::Duration;

use crate::domain::{LearningPath, TopicId};

/// A rule broken by the requested mutation. Carries no state of its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathViolation {
  #[error("step {0} is not part of the active sequence")]
  StepNotFound(String),

  #[error("checkpoint {0} is not part of the active sequence")]
  CheckpointNotFound(String),

  #[error("branch {0} not found")]
  BranchNotFound(String),

  #[error("step {step_id} is locked: {reason}")]
  StepLocked { step_id: String, reason: String },

  #[error("step {0} is already completed")]
  AlreadyCompleted(String),

  #[error("checkpoint {checkpoint_id} is not reached yet: complete step {after_step_order} first")]
  CheckpointNotReached { checkpoint_id: String, after_step_order: u32 },

  #[error("invalid answer: {0}")]
  InvalidAnswer(String),

  #[error("invalid fork point {order}: {reason}")]
  InvalidForkPoint { order: u32, reason: String },

  #[error("invalid branch: {0}")]
  InvalidBranch(String),

  #[error("invalid performance signal: {0}")]
  InvalidSignal(String),
}

impl PathViolation {
  pub fn code(&self) -> &'static str {
    match self {
      PathViolation::StepNotFound(_) => "STEP_NOT_FOUND",
      PathViolation::CheckpointNotFound(_) => "CHECKPOINT_NOT_FOUND",
      PathViolation::BranchNotFound(_) => "BRANCH_NOT_FOUND",
      PathViolation::StepLocked { .. } => "STEP_LOCKED",
      PathViolation::AlreadyCompleted(_) => "ALREADY_COMPLETED",
      PathViolation::CheckpointNotReached { .. } => "CHECKPOINT_NOT_REACHED",
      PathViolation::InvalidAnswer(_) => "INVALID_ANSWER",
      PathViolation::InvalidForkPoint { .. } => "INVALID_FORK_POINT",
      PathViolation::InvalidBranch(_) => "INVALID_BRANCH",
      PathViolation::InvalidSignal(_) => "INVALID_SIGNAL",
    }
  }

  pub fn with_state(self, current: LearningPath) -> EngineError {
    EngineError::Rejected { violation: self, current: Box::new(current) }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("learning path {0} not found")]
  PathNotFound(String),

  #[error("version conflict on path {path_id}: expected {expected}, stored {actual}")]
  Conflict { path_id: String, expected: u64, actual: u64, current: Box<LearningPath> },

  #[error("path {path_id} kept changing; gave up after {attempts} attempts")]
  StaleState { path_id: String, attempts: u32, current: Box<LearningPath> },

  #[error("cyclic prerequisites: {}", .cycle.join(" -> "))]
  CyclicPrerequisite { cycle: Vec<TopicId> },

  #[error("content generation timed out after {0:?}")]
  GenerationTimeout(Duration),

  #[error("content generation failed: {0}")]
  Generation(String),

  #[error("{violation}")]
  Rejected {
    #[source]
    violation: PathViolation,
    current: Box<LearningPath>,
  },

  #[error("invalid request: {0}")]
  Validation(String),
}

impl EngineError {
  /// Pre-failure state, when the error concerns an existing path.
  pub fn current(&self) -> Option<&LearningPath> {
    match self {
      EngineError::Conflict { current, .. }
      | EngineError::StaleState { current, .. }
      | EngineError::Rejected { current, .. } => Some(current.as_ref()),
      _ => None,
    }
  }

  pub fn violation(&self) -> Option<&PathViolation> {
    match self {
      EngineError::Rejected { violation, .. } => Some(violation),
      _ => None,
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      EngineError::PathNotFound(_) => "PATH_NOT_FOUND",
      EngineError::Conflict { .. } => "CONFLICT",
      EngineError::StaleState { .. } => "STALE_STATE",
      EngineError::CyclicPrerequisite { .. } => "CYCLIC_PREREQUISITE",
      EngineError::GenerationTimeout(_) => "GENERATION_TIMEOUT",
      EngineError::Generation(_) => "GENERATION_FAILED",
      EngineError::Rejected { violation, .. } => violation.code(),
      EngineError::Validation(_) => "VALIDATION_ERROR",
    }
  }
}
