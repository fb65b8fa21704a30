//! Checkpoint evaluation: validate submitted answers, score them, append the attempt.
//!
//! A question is correct iff the selected option set equals its correct set, which
//! covers single-choice and multi-select alike. Wrong answers are not errors; only
//! malformed submissions are.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::{Answers, Attempt, Checkpoint, LearningPath};
use crate::error::PathViolation;

pub fn validate_answers(checkpoint: &Checkpoint, answers: &Answers) -> Result<(), PathViolation> {
  if answers.is_empty() {
    return Err(PathViolation::InvalidAnswer("no answers submitted".into()));
  }
  if checkpoint.questions.is_empty() {
    return Err(PathViolation::InvalidAnswer(format!("checkpoint {} has no questions", checkpoint.id)));
  }
  for (question_id, selected) in answers {
    let question = checkpoint
      .questions
      .iter()
      .find(|q| &q.id == question_id)
      .ok_or_else(|| PathViolation::InvalidAnswer(format!("unknown question id '{question_id}'")))?;
    if let Some(option) = selected.iter().find(|o| !question.has_option(o)) {
      return Err(PathViolation::InvalidAnswer(format!(
        "option '{option}' does not belong to question '{question_id}'"
      )));
    }
  }
  Ok(())
}

/// `100 * correct / total`. Unanswered questions count as wrong.
pub fn score_answers(checkpoint: &Checkpoint, answers: &Answers) -> f32 {
  let total = checkpoint.questions.len();
  if total == 0 {
    return 0.0;
  }
  let correct = checkpoint
    .questions
    .iter()
    .filter(|q| answers.get(&q.id).is_some_and(|selected| *selected == q.correct_answers))
    .count();
  100.0 * correct as f32 / total as f32
}

/// Score a submission against a checkpoint of the active sequence and append the attempt.
/// The checkpoint must have been reached: every step up to its position completed.
pub fn record_attempt(
  path: &mut LearningPath,
  checkpoint_id: &str,
  answers: &Answers,
  now: DateTime<Utc>,
) -> Result<Attempt, PathViolation> {
  let mut seq = path.active_sequence_mut();
  let view = seq.view();
  let checkpoint = view
    .checkpoint(checkpoint_id)
    .ok_or_else(|| PathViolation::CheckpointNotFound(checkpoint_id.to_string()))?;
  if view.steps.iter().any(|s| s.order <= checkpoint.after_step_order && !s.completed) {
    return Err(PathViolation::CheckpointNotReached {
      checkpoint_id: checkpoint_id.to_string(),
      after_step_order: checkpoint.after_step_order,
    });
  }
  validate_answers(checkpoint, answers)?;

  let score = score_answers(checkpoint, answers);
  let attempt = Attempt {
    checkpoint_id: checkpoint_id.to_string(),
    answers: answers.clone(),
    score,
    passed: score >= f32::from(checkpoint.passing_score),
    taken_at: now,
  };
  let passing_score = checkpoint.passing_score;

  if let Some(cp) = seq.checkpoints.iter_mut().find(|c| c.id == checkpoint_id) {
    cp.attempts.push(attempt.clone());
  }
  info!(target: "pathway", %checkpoint_id, score, passing_score, passed = attempt.passed, "Checkpoint attempt recorded");
  Ok(attempt)
}
