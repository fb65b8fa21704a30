//! Branch management: fork an alternate track off a completed step of the main sequence.
//!
//! Forking never touches the main sequence. The new branch numbers its steps from 0
//! and becomes the active sequence; switching between tracks afterwards only moves
//! the `active_branch_id` pointer.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::builder::{steps_from_drafts, BuiltSequence, StepDraft};
use crate::domain::{Branch, BranchOrigin, Checkpoint, LearningPath, Step};
use crate::error::PathViolation;

/// Maximum allowed length for a branch name.
pub const MAX_BRANCH_NAME_LENGTH: usize = 100;

/// Where the steps of a new branch come from.
#[derive(Clone, Debug)]
pub enum BranchTrack {
  /// Caller-supplied steps.
  Drafts(Vec<StepDraft>),
  /// A sequence assembled by the path builder (adaptation uses this).
  Built(BuiltSequence),
  /// Fresh copy of the parent's steps after the fork point.
  CopyTail,
}

pub fn validate_branch_name(name: &str, existing: &[Branch]) -> Result<(), PathViolation> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(PathViolation::InvalidBranch("branch name must not be empty".into()));
  }
  if trimmed.len() != name.len() {
    return Err(PathViolation::InvalidBranch("branch name must not have leading or trailing whitespace".into()));
  }
  if name.chars().count() > MAX_BRANCH_NAME_LENGTH {
    return Err(PathViolation::InvalidBranch(format!(
      "branch name must not exceed {MAX_BRANCH_NAME_LENGTH} characters"
    )));
  }
  if existing.iter().any(|b| b.branch_name == name) {
    return Err(PathViolation::InvalidBranch(format!("a branch named '{name}' already exists")));
  }
  Ok(())
}

/// The fork point must be a completed step of the main sequence.
pub fn validate_fork_point(path: &LearningPath, fork_at: u32) -> Result<(), PathViolation> {
  match path.main_sequence().step_at(fork_at) {
    None => Err(PathViolation::InvalidForkPoint { order: fork_at, reason: "no step with that order".into() }),
    Some(step) if !step.completed => Err(PathViolation::InvalidForkPoint {
      order: fork_at,
      reason: format!("step '{}' is not completed yet", step.label),
    }),
    Some(_) => Ok(()),
  }
}

/// Create a branch and make it the active sequence. Returns the branch id.
pub fn create_branch(
  path: &mut LearningPath,
  fork_at: u32,
  name: &str,
  track: BranchTrack,
  origin: BranchOrigin,
  max_branches: usize,
  now: DateTime<Utc>,
) -> Result<String, PathViolation> {
  validate_fork_point(path, fork_at)?;
  validate_branch_name(name, &path.branches)?;
  if path.branches.len() >= max_branches {
    return Err(PathViolation::InvalidBranch(format!(
      "path already has the maximum of {max_branches} branches"
    )));
  }

  let (steps, checkpoints) = match track {
    BranchTrack::Drafts(drafts) => (steps_from_drafts(&drafts, &path.topic), Vec::new()),
    BranchTrack::Built(built) => (built.steps, built.checkpoints),
    BranchTrack::CopyTail => copy_tail(path, fork_at),
  };
  if steps.is_empty() {
    return Err(PathViolation::InvalidBranch("a branch needs at least one step".into()));
  }

  let branch = Branch {
    id: Uuid::new_v4().to_string(),
    parent_path_id: path.id.clone(),
    fork_at_step_order: fork_at,
    branch_name: name.to_string(),
    origin,
    steps,
    checkpoints,
    created_at: now,
  };
  let id = branch.id.clone();
  info!(target: "pathway", path_id = %path.id, branch_id = %id, fork_at, ?origin, steps = branch.steps.len(), "Branch created");
  path.branches.push(branch);
  path.active_branch_id = Some(id.clone());
  Ok(id)
}

/// Uncompleted copies of the main steps after `fork_at`, renumbered from 0, with the
/// checkpoints that sit between them.
fn copy_tail(path: &LearningPath, fork_at: u32) -> (Vec<Step>, Vec<Checkpoint>) {
  let mut steps: Vec<Step> = path
    .steps
    .iter()
    .filter(|s| s.order > fork_at)
    .map(|s| Step {
      id: Uuid::new_v4().to_string(),
      order: s.order - fork_at - 1,
      completed: false,
      completed_at: None,
      ..s.clone()
    })
    .collect();
  steps.sort_by_key(|s| s.order);

  let checkpoints = path
    .checkpoints
    .iter()
    .filter(|c| c.after_step_order > fork_at)
    .map(|c| Checkpoint {
      id: Uuid::new_v4().to_string(),
      after_step_order: c.after_step_order - fork_at - 1,
      attempts: Vec::new(),
      ..c.clone()
    })
    .collect();
  (steps, checkpoints)
}

/// Point the learner at a branch, or back at the main sequence with `None`.
pub fn switch_branch(path: &mut LearningPath, branch_id: Option<&str>) -> Result<(), PathViolation> {
  match branch_id {
    Some(id) if path.branch(id).is_none() => Err(PathViolation::BranchNotFound(id.to_string())),
    Some(id) => {
      path.active_branch_id = Some(id.to_string());
      Ok(())
    }
    None => {
      path.active_branch_id = None;
      Ok(())
    }
  }
}
