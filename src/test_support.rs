//! Fixtures shared by the unit tests.

use std::collections::BTreeSet;

use chrono::Utc;

use crate::domain::{AnswerOption, Answers, Checkpoint, LearningPath, Level, Question, QuestionKind, Step, StepKind};

pub const QUESTIONS_PER_CHECKPOINT: usize = 10;

pub fn sample_step(order: u32) -> Step {
  Step {
    id: format!("step-{order}"),
    label: format!("Step {order}"),
    body: format!("Body of step {order}"),
    order,
    topic: "ownership".into(),
    prerequisite_topic_ids: BTreeSet::new(),
    kind: StepKind::Lesson,
    completed: false,
    completed_at: None,
  }
}

/// Ten single-choice questions, option "a" is always right.
pub fn sample_checkpoint(id: &str, after_step_order: u32, passing_score: u8) -> Checkpoint {
  let questions = (0..QUESTIONS_PER_CHECKPOINT)
    .map(|i| Question {
      id: format!("{id}-q{i}"),
      prompt: format!("Question {i}"),
      kind: QuestionKind::SingleChoice,
      options: vec![
        AnswerOption { id: "a".into(), text: "right".into() },
        AnswerOption { id: "b".into(), text: "wrong".into() },
      ],
      correct_answers: BTreeSet::from(["a".to_string()]),
    })
    .collect();
  Checkpoint {
    id: id.to_string(),
    after_step_order,
    questions,
    passing_score,
    level: Level::Beginner,
    attempts: Vec::new(),
  }
}

/// Path with `step_count` steps and one checkpoint (`cp-{order}`) after each listed order.
pub fn sample_path(step_count: u32, checkpoints_after: &[u32], passing_score: u8) -> LearningPath {
  let now = Utc::now();
  LearningPath {
    id: uuid::Uuid::new_v4().to_string(),
    owner_id: "learner-1".into(),
    topic: "ownership".into(),
    level: Level::Beginner,
    version: 1,
    steps: (0..step_count).map(sample_step).collect(),
    checkpoints: checkpoints_after.iter().map(|o| sample_checkpoint(&format!("cp-{o}"), *o, passing_score)).collect(),
    branches: Vec::new(),
    active_branch_id: None,
    created_at: now,
    updated_at: now,
  }
}

/// Answers that get exactly `correct` of the checkpoint's questions right.
pub fn answers_scoring(checkpoint: &Checkpoint, correct: usize) -> Answers {
  checkpoint
    .questions
    .iter()
    .enumerate()
    .map(|(i, q)| {
      let pick = if i < correct { "a" } else { "b" };
      (q.id.clone(), BTreeSet::from([pick.to_string()]))
    })
    .collect()
}

/// Mark main-sequence steps `0..=order` completed, bypassing gating.
pub fn complete_through(path: &mut LearningPath, order: u32) {
  let now = Utc::now();
  for s in path.steps.iter_mut().filter(|s| s.order <= order) {
    s.completed = true;
    s.completed_at = Some(now);
  }
}
