//! Domain models: learning paths, their step sequences, checkpoints, attempts and branches.
//!
//! A path owns its main sequence (`steps` + `checkpoints`) and any number of branches,
//! each of which owns an independently numbered sequence of its own. Exactly one of
//! them is the "active" sequence, selected by `active_branch_id`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque topic identifier handed out by the prerequisite catalog.
pub type TopicId = String;

/// Learner-selected answers: question id -> selected option ids.
pub type Answers = BTreeMap<String, BTreeSet<String>>;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Level {
  Beginner,
  Intermediate,
  Advanced,
}

impl Level {
  pub fn as_str(&self) -> &'static str {
    match self {
      Level::Beginner => "beginner",
      Level::Intermediate => "intermediate",
      Level::Advanced => "advanced",
    }
  }

  /// One notch easier; beginner stays beginner.
  pub fn simpler(self) -> Self {
    match self {
      Level::Advanced => Level::Intermediate,
      _ => Level::Beginner,
    }
  }

  /// One notch harder; advanced stays advanced.
  pub fn harder(self) -> Self {
    match self {
      Level::Beginner => Level::Intermediate,
      _ => Level::Advanced,
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Regular lesson content vs. a step inserted by adaptation to shore up weak spots.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
  #[default]
  Lesson,
  Remediation,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Step {
  pub id: String,
  pub label: String,
  pub body: String,
  pub order: u32,
  pub topic: TopicId,
  #[serde(default)] pub prerequisite_topic_ids: BTreeSet<TopicId>,
  #[serde(default)] pub kind: StepKind,
  #[serde(default)] pub completed: bool,
  #[serde(default)] pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  SingleChoice,
  MultiSelect,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnswerOption {
  pub id: String,
  pub text: String,
}

/// Both question kinds are scored the same way: the selected set must equal `correct_answers`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  pub id: String,
  pub prompt: String,
  pub kind: QuestionKind,
  pub options: Vec<AnswerOption>,
  pub correct_answers: BTreeSet<String>,
}

impl Question {
  pub fn has_option(&self, option_id: &str) -> bool {
    self.options.iter().any(|o| o.id == option_id)
  }
}

/// Immutable record of one checkpoint submission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
  pub checkpoint_id: String,
  pub answers: Answers,
  pub score: f32,
  pub passed: bool,
  pub taken_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
  pub id: String,
  pub after_step_order: u32,
  pub questions: Vec<Question>,
  pub passing_score: u8,
  pub level: Level,
  #[serde(default)] pub attempts: Vec<Attempt>,
}

impl Checkpoint {
  pub fn is_passed(&self) -> bool {
    self.attempts.iter().any(|a| a.passed)
  }

  pub fn latest_attempt(&self) -> Option<&Attempt> {
    self.attempts.last()
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BranchOrigin {
  #[default]
  User,
  Adaptation,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Branch {
  pub id: String,
  pub parent_path_id: String,
  pub fork_at_step_order: u32,
  pub branch_name: String,
  #[serde(default)] pub origin: BranchOrigin,
  pub steps: Vec<Step>,
  #[serde(default)] pub checkpoints: Vec<Checkpoint>,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LearningPath {
  pub id: String,
  pub owner_id: String,
  pub topic: TopicId,
  pub level: Level,
  pub version: u64,
  pub steps: Vec<Step>,
  #[serde(default)] pub checkpoints: Vec<Checkpoint>,
  #[serde(default)] pub branches: Vec<Branch>,
  #[serde(default)] pub active_branch_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl LearningPath {
  pub fn branch(&self, branch_id: &str) -> Option<&Branch> {
    self.branches.iter().find(|b| b.id == branch_id)
  }

  pub fn active_branch(&self) -> Option<&Branch> {
    self.active_branch_id.as_deref().and_then(|id| self.branch(id))
  }

  /// The sequence the learner is currently progressing through.
  pub fn active_sequence(&self) -> Sequence<'_> {
    match self.active_branch() {
      Some(b) => Sequence { steps: &b.steps, checkpoints: &b.checkpoints },
      None => Sequence { steps: &self.steps, checkpoints: &self.checkpoints },
    }
  }

  pub fn active_sequence_mut(&mut self) -> SequenceMut<'_> {
    if let Some(id) = self.active_branch_id.as_deref() {
      if let Some(b) = self.branches.iter_mut().find(|b| b.id == id) {
        return SequenceMut { steps: &mut b.steps, checkpoints: &mut b.checkpoints };
      }
    }
    SequenceMut { steps: &mut self.steps, checkpoints: &mut self.checkpoints }
  }

  pub fn main_sequence(&self) -> Sequence<'_> {
    Sequence { steps: &self.steps, checkpoints: &self.checkpoints }
  }
}

/// Read-only view over one ordered sequence (main or branch).
#[derive(Clone, Copy, Debug)]
pub struct Sequence<'a> {
  pub steps: &'a [Step],
  pub checkpoints: &'a [Checkpoint],
}

impl<'a> Sequence<'a> {
  pub fn step(&self, step_id: &str) -> Option<&'a Step> {
    self.steps.iter().find(|s| s.id == step_id)
  }

  pub fn step_at(&self, order: u32) -> Option<&'a Step> {
    self.steps.iter().find(|s| s.order == order)
  }

  pub fn checkpoint(&self, checkpoint_id: &str) -> Option<&'a Checkpoint> {
    self.checkpoints.iter().find(|c| c.id == checkpoint_id)
  }

  pub fn highest_completed_order(&self) -> Option<u32> {
    self.steps.iter().filter(|s| s.completed).map(|s| s.order).max()
  }

  /// First position of the uncompleted tail.
  pub fn tail_start(&self) -> u32 {
    self.highest_completed_order().map(|o| o + 1).unwrap_or(0)
  }

  pub fn next_incomplete(&self) -> Option<&'a Step> {
    let start = self.tail_start();
    self.steps.iter().filter(|s| s.order >= start).min_by_key(|s| s.order)
  }

  pub fn orders_are_contiguous(&self) -> bool {
    let mut orders: Vec<u32> = self.steps.iter().map(|s| s.order).collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(i, o)| *o as usize == i)
  }
}

/// Mutable view over one ordered sequence.
#[derive(Debug)]
pub struct SequenceMut<'a> {
  pub steps: &'a mut Vec<Step>,
  pub checkpoints: &'a mut Vec<Checkpoint>,
}

impl<'a> SequenceMut<'a> {
  pub fn view(&self) -> Sequence<'_> {
    Sequence { steps: self.steps.as_slice(), checkpoints: self.checkpoints.as_slice() }
  }

  /// Sort by order and rewrite orders to 0..n.
  pub fn renumber(&mut self) {
    self.steps.sort_by_key(|s| s.order);
    for (i, s) in self.steps.iter_mut().enumerate() {
      s.order = i as u32;
    }
    self.checkpoints.sort_by_key(|c| c.after_step_order);
  }
}
