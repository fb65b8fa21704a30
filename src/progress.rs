//! Step gating and completion.
//!
//! A step can be completed only when every lower-ordered step of its sequence is
//! completed and every checkpoint placed before it has a passing attempt. Branch
//! sequences gate against themselves only; their fork point was already reached.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{LearningPath, Sequence, Step};
use crate::error::PathViolation;

/// Why the step at `order` can't be completed yet; `None` when it can.
pub fn lock_reason(seq: Sequence<'_>, order: u32) -> Option<String> {
  if let Some(blocking) = seq.steps.iter().filter(|s| s.order < order && !s.completed).min_by_key(|s| s.order) {
    return Some(format!("step {} ('{}') is not completed", blocking.order, blocking.label));
  }
  seq
    .checkpoints
    .iter()
    .filter(|c| c.after_step_order < order && !c.is_passed())
    .min_by_key(|c| c.after_step_order)
    .map(|c| format!("checkpoint {} after step {} has no passing attempt", c.id, c.after_step_order))
}

/// Whether `step_id` in the active sequence could be completed right now.
pub fn is_completable(path: &LearningPath, step_id: &str) -> bool {
  let seq = path.active_sequence();
  match seq.step(step_id) {
    Some(step) => !step.completed && lock_reason(seq, step.order).is_none(),
    None => false,
  }
}

/// Mark a step of the active sequence completed, enforcing gating.
pub fn complete_step(path: &mut LearningPath, step_id: &str, now: DateTime<Utc>) -> Result<Step, PathViolation> {
  let mut seq = path.active_sequence_mut();
  let (order, completed) = match seq.view().step(step_id) {
    Some(step) => (step.order, step.completed),
    None => return Err(PathViolation::StepNotFound(step_id.to_string())),
  };
  if completed {
    return Err(PathViolation::AlreadyCompleted(step_id.to_string()));
  }
  if let Some(reason) = lock_reason(seq.view(), order) {
    return Err(PathViolation::StepLocked { step_id: step_id.to_string(), reason });
  }

  let step = seq
    .steps
    .iter_mut()
    .find(|s| s.id == step_id)
    .ok_or_else(|| PathViolation::StepNotFound(step_id.to_string()))?;
  step.completed = true;
  step.completed_at = Some(now);
  debug!(target: "pathway", %step_id, order, "Step completed");
  Ok(step.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::checkpoint::record_attempt;
  use crate::test_support::{answers_scoring, complete_through, sample_path};
  use assert_matches::assert_matches;

  #[test]
  fn steps_complete_strictly_in_order() {
    let mut path = sample_path(4, &[], 70);
    assert_matches!(complete_step(&mut path, "step-1", Utc::now()), Err(PathViolation::StepLocked { .. }));
    complete_step(&mut path, "step-0", Utc::now()).unwrap();
    let done = complete_step(&mut path, "step-1", Utc::now()).unwrap();
    assert!(done.completed && done.completed_at.is_some());
  }

  #[test]
  fn completing_twice_is_rejected() {
    let mut path = sample_path(2, &[], 70);
    complete_step(&mut path, "step-0", Utc::now()).unwrap();
    assert_matches!(complete_step(&mut path, "step-0", Utc::now()), Err(PathViolation::AlreadyCompleted(_)));
  }

  #[test]
  fn unknown_step_is_reported() {
    let mut path = sample_path(2, &[], 70);
    assert_matches!(complete_step(&mut path, "nope", Utc::now()), Err(PathViolation::StepNotFound(_)));
  }

  #[test]
  fn checkpoint_gates_following_steps_until_a_passing_attempt() {
    // 6 steps, checkpoint after the third step (order 2), passing score 70.
    let mut path = sample_path(6, &[2], 70);
    for id in ["step-0", "step-1", "step-2"] {
      complete_step(&mut path, id, Utc::now()).unwrap();
    }
    assert!(!is_completable(&path, "step-3"));

    let failing = answers_scoring(&path.checkpoints[0], 5);
    let attempt = record_attempt(&mut path, "cp-2", &failing, Utc::now()).unwrap();
    assert_eq!(attempt.score, 50.0);
    assert!(!attempt.passed);
    assert!(!is_completable(&path, "step-3"));
    assert_matches!(complete_step(&mut path, "step-3", Utc::now()), Err(PathViolation::StepLocked { .. }));

    let passing = answers_scoring(&path.checkpoints[0], 8);
    let attempt = record_attempt(&mut path, "cp-2", &passing, Utc::now()).unwrap();
    assert_eq!(attempt.score, 80.0);
    assert!(attempt.passed);
    assert!(is_completable(&path, "step-3"));
    complete_step(&mut path, "step-3", Utc::now()).unwrap();
  }

  #[test]
  fn checkpoint_after_a_step_does_not_gate_that_step() {
    let mut path = sample_path(3, &[1], 70);
    complete_through(&mut path, 0);
    assert!(is_completable(&path, "step-1"));
    assert!(lock_reason(path.active_sequence(), 2).is_some());
  }
}
