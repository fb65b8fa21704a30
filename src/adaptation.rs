//! Adaptation: reshape the uncompleted tail of the active sequence from performance signals.
//!
//! Each call is one state-machine transition: `assess` turns a signal into a `Trend`,
//! `plan` picks at most one notch of change for the current tail, and `apply` performs
//! it. Completed steps are never touched and step orders stay contiguous. Calling
//! repeatedly with the same signal converges: remediation, then a remedial branch,
//! then lowering passing scores down to the floor, then nothing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::branching::{create_branch, BranchTrack};
use crate::builder::{build_questions, build_sequence, split_sections, BuildOptions, TopicPart};
use crate::config::EngineConfig;
use crate::domain::{BranchOrigin, Checkpoint, LearningPath, Level, Sequence, Step, StepKind, TopicId};
use crate::error::PathViolation;
use crate::generator::{GeneratedContent, QuestionDraft};
use crate::seeds::{remediation_body, template_content};
use crate::util::label_key;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyFeedback {
  TooHigh,
  TooLow,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerformanceSignal {
  /// Aggregate checkpoint scores (0-100) reported by the client.
  CheckpointScores { scores: Vec<f32> },
  /// Use the attempts already recorded on the path.
  Recorded,
  TimeOnStep { step_id: String, seconds: u64 },
  Difficulty { feedback: DifficultyFeedback },
}

impl PerformanceSignal {
  pub fn validate(&self) -> Result<(), String> {
    match self {
      PerformanceSignal::CheckpointScores { scores } if scores.iter().any(|s| !s.is_finite() || *s < 0.0 || *s > 100.0) => {
        Err("scores must be between 0 and 100".into())
      }
      PerformanceSignal::TimeOnStep { step_id, .. } if step_id.trim().is_empty() => Err("step_id must not be empty".into()),
      _ => Ok(()),
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
  Struggling,
  Steady,
  Excelling,
}

/// The single notch of change chosen for one call.
#[derive(Clone, Debug, PartialEq)]
pub enum Plan {
  Hold,
  /// Insert one review step before the next incomplete step.
  Remediate { topic: TopicId, focus_label: String, level: Level },
  /// Fork a remedial branch off the main sequence.
  Escalate { fork_at: u32, topic: TopicId, level: Level },
  /// Only lower the passing scores of unpassed tail checkpoints.
  LowerOnly,
  /// Drop the next review step; raise unattempted tail checkpoints to `level` when set.
  Advance { topic: TopicId, level: Option<Level> },
}

impl Plan {
  /// The content this plan wants from the generator, if any.
  pub fn content_request(&self) -> Option<(TopicId, Level)> {
    match self {
      Plan::Remediate { topic, level, .. } | Plan::Escalate { topic, level, .. } => Some((topic.clone(), *level)),
      Plan::Advance { topic, level: Some(level) } => Some((topic.clone(), *level)),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdaptationOutcome {
  Unchanged,
  RemediationInserted { step_id: String, order: u32, lowered: usize },
  PassingScoresLowered { checkpoints: usize },
  BranchForked { branch_id: String },
  Advanced { removed_step_id: Option<String>, raised: usize },
}

pub fn assess(path: &LearningPath, signal: &PerformanceSignal, cfg: &EngineConfig) -> Result<Trend, PathViolation> {
  signal.validate().map_err(PathViolation::InvalidSignal)?;
  let trend = match signal {
    PerformanceSignal::CheckpointScores { scores } => trend_from_scores(scores, cfg),
    PerformanceSignal::Recorded => trend_from_scores(&recorded_scores(path.active_sequence(), cfg.trailing_window), cfg),
    PerformanceSignal::TimeOnStep { step_id, seconds } => {
      if path.active_sequence().step(step_id).is_none() {
        return Err(PathViolation::StepNotFound(step_id.clone()));
      }
      if *seconds >= cfg.slow_step_secs { Trend::Struggling } else { Trend::Steady }
    }
    PerformanceSignal::Difficulty { feedback: DifficultyFeedback::TooHigh } => Trend::Struggling,
    PerformanceSignal::Difficulty { feedback: DifficultyFeedback::TooLow } => Trend::Excelling,
  };
  Ok(trend)
}

pub fn trend_from_scores(scores: &[f32], cfg: &EngineConfig) -> Trend {
  if scores.is_empty() {
    return Trend::Steady;
  }
  let avg = scores.iter().sum::<f32>() / scores.len() as f32;
  if avg < cfg.remediation_threshold {
    Trend::Struggling
  } else if avg > cfg.mastery_threshold && scores.len() >= cfg.mastery_min_checkpoints {
    Trend::Excelling
  } else {
    Trend::Steady
  }
}

/// Latest score of each of the `window` most recently attempted checkpoints, oldest first.
pub fn recorded_scores(seq: Sequence<'_>, window: usize) -> Vec<f32> {
  let mut latest: Vec<_> = seq.checkpoints.iter().filter_map(Checkpoint::latest_attempt).collect();
  latest.sort_by_key(|a| a.taken_at);
  let skip = latest.len().saturating_sub(window);
  latest.into_iter().skip(skip).map(|a| a.score).collect()
}

/// A checkpoint belongs to the tail when it gates a step that is not completed yet.
fn in_tail(checkpoint: &Checkpoint, tail_start: u32) -> bool {
  checkpoint.after_step_order + 1 >= tail_start
}

pub fn plan(path: &LearningPath, trend: Trend, cfg: &EngineConfig) -> Plan {
  let seq = path.active_sequence();
  match trend {
    Trend::Steady => Plan::Hold,
    Trend::Struggling => match seq.next_incomplete() {
      Some(next) if next.kind != StepKind::Remediation => {
        let focus = seq.highest_completed_order().and_then(|o| seq.step_at(o)).unwrap_or(next);
        Plan::Remediate { topic: focus.topic.clone(), focus_label: focus.label.clone(), level: path.level.simpler() }
      }
      Some(_) => match escalation_point(path, cfg) {
        Some(fork_at) => Plan::Escalate { fork_at, topic: path.topic.clone(), level: path.level.simpler() },
        None => Plan::LowerOnly,
      },
      None => Plan::LowerOnly,
    },
    Trend::Excelling => {
      let tail = seq.tail_start();
      let has_review = seq.steps.iter().any(|s| s.order >= tail && s.kind == StepKind::Remediation);
      let raise_to = seq
        .checkpoints
        .iter()
        .filter(|c| in_tail(c, tail) && c.attempts.is_empty() && c.level < Level::Advanced)
        .map(|c| c.level.harder())
        .min();
      if !has_review && raise_to.is_none() {
        Plan::Hold
      } else {
        Plan::Advance { topic: path.topic.clone(), level: raise_to }
      }
    }
  }
}

/// Fork point for a remedial branch: only from the main sequence, once, with room left.
fn escalation_point(path: &LearningPath, cfg: &EngineConfig) -> Option<u32> {
  if path.active_branch().is_some()
    || path.branches.len() >= cfg.max_branches
    || path.branches.iter().any(|b| b.origin == BranchOrigin::Adaptation)
  {
    return None;
  }
  path.main_sequence().highest_completed_order()
}

/// Carry out `plan` on the active sequence. `content` is generator output for
/// `plan.content_request()`; template content stands in when it is missing.
pub fn apply(
  path: &mut LearningPath,
  plan: &Plan,
  content: Option<&GeneratedContent>,
  cfg: &EngineConfig,
  now: DateTime<Utc>,
) -> Result<AdaptationOutcome, PathViolation> {
  let fallback;
  let content = match (content, plan.content_request()) {
    (Some(c), _) => Some(c),
    (None, Some((topic, level))) => {
      fallback = template_content(&topic, level);
      Some(&fallback)
    }
    (None, None) => None,
  };

  let outcome = match (plan, content) {
    (Plan::Remediate { topic, focus_label, .. }, Some(content)) => insert_remediation(path, topic, focus_label, content, cfg),
    (Plan::Escalate { fork_at, topic, level }, Some(content)) => fork_remedial(path, *fork_at, topic, *level, content, cfg, now)?,
    (Plan::LowerOnly, _) => {
      let mut seq = path.active_sequence_mut();
      let tail = seq.view().tail_start();
      match lower_passing_scores(seq.checkpoints, tail, cfg) {
        0 => AdaptationOutcome::Unchanged,
        n => AdaptationOutcome::PassingScoresLowered { checkpoints: n },
      }
    }
    (Plan::Advance { level, .. }, content) => advance(path, level.zip(content)),
    _ => AdaptationOutcome::Unchanged,
  };
  if outcome != AdaptationOutcome::Unchanged {
    info!(target: "pathway", path_id = %path.id, ?outcome, "Adapted path");
  }
  Ok(outcome)
}

/// Lower every unpassed tail checkpoint by one step, not below the floor.
fn lower_passing_scores(checkpoints: &mut [Checkpoint], tail_start: u32, cfg: &EngineConfig) -> usize {
  let mut lowered = 0;
  for c in checkpoints.iter_mut().filter(|c| in_tail(c, tail_start) && !c.is_passed()) {
    if c.passing_score > cfg.passing_score_floor {
      c.passing_score = c.passing_score.saturating_sub(cfg.passing_score_step).max(cfg.passing_score_floor);
      lowered += 1;
    }
  }
  lowered
}

fn insert_remediation(
  path: &mut LearningPath,
  topic: &str,
  focus_label: &str,
  content: &GeneratedContent,
  cfg: &EngineConfig,
) -> AdaptationOutcome {
  let body = review_body(content, topic, focus_label);
  let mut seq = path.active_sequence_mut();
  let pos = seq.view().tail_start();
  let lowered = lower_passing_scores(seq.checkpoints, pos, cfg);

  for s in seq.steps.iter_mut().filter(|s| s.order >= pos) {
    s.order += 1;
  }
  for c in seq.checkpoints.iter_mut() {
    if c.after_step_order >= pos {
      c.after_step_order += 1;
    } else if c.after_step_order + 1 == pos && !c.is_passed() {
      // Keep the review step reachable: the failed checkpoint now follows it.
      c.after_step_order = pos;
    }
  }

  let step = Step {
    id: Uuid::new_v4().to_string(),
    label: format!("Review: {focus_label}"),
    body,
    order: pos,
    topic: topic.to_string(),
    prerequisite_topic_ids: Default::default(),
    kind: StepKind::Remediation,
    completed: false,
    completed_at: None,
  };
  let step_id = step.id.clone();
  seq.steps.push(step);
  seq.renumber();
  AdaptationOutcome::RemediationInserted { step_id, order: pos, lowered }
}

/// Body for a review step: the matching section of the simpler lesson when there is one.
fn review_body(content: &GeneratedContent, topic: &str, focus_label: &str) -> String {
  let prefix = format!("{topic}: ");
  let wanted = label_key(focus_label.strip_prefix(prefix.as_str()).unwrap_or(focus_label));
  let sections = split_sections(&content.body);
  if let Some(section) = sections.iter().find(|s| label_key(&s.label) == wanted && !s.body.is_empty()) {
    return section.body.clone();
  }
  let mut body = remediation_body(focus_label, topic);
  if let Some(first) = sections.iter().find(|s| !s.body.is_empty()) {
    body.push_str("\n\n");
    body.push_str(&first.body);
  }
  body
}

fn fork_remedial(
  path: &mut LearningPath,
  fork_at: u32,
  topic: &str,
  level: Level,
  content: &GeneratedContent,
  cfg: &EngineConfig,
  now: DateTime<Utc>,
) -> Result<AdaptationOutcome, PathViolation> {
  let part = TopicPart { topic, depends_on: Default::default(), content, is_prerequisite: false };
  let opts = BuildOptions {
    checkpoint_interval: cfg.checkpoint_interval,
    passing_score: cfg.default_passing_score.saturating_sub(cfg.passing_score_step).max(cfg.passing_score_floor),
    level,
  };
  let built = build_sequence(&[part], &opts);
  let name = (1..)
    .map(|n| format!("remedial-{n}"))
    .find(|name| path.branches.iter().all(|b| &b.branch_name != name))
    .unwrap_or_else(|| format!("remedial-{}", Uuid::new_v4()));
  let branch_id = create_branch(path, fork_at, &name, BranchTrack::Built(built), BranchOrigin::Adaptation, cfg.max_branches, now)?;
  Ok(AdaptationOutcome::BranchForked { branch_id })
}

fn advance(path: &mut LearningPath, harder: Option<(Level, &GeneratedContent)>) -> AdaptationOutcome {
  let mut seq = path.active_sequence_mut();
  let tail = seq.view().tail_start();

  let review = seq
    .steps
    .iter()
    .filter(|s| s.order >= tail && s.kind == StepKind::Remediation)
    .min_by_key(|s| s.order)
    .map(|s| (s.id.clone(), s.order));
  if let Some((id, r)) = &review {
    let r = *r;
    seq.steps.retain(|s| &s.id != id);
    for s in seq.steps.iter_mut().filter(|s| s.order > r) {
      s.order -= 1;
    }
    for c in seq.checkpoints.iter_mut() {
      if c.after_step_order > r {
        c.after_step_order -= 1;
      } else if c.after_step_order == r {
        c.after_step_order = r.saturating_sub(1);
      }
    }
    seq.renumber();
  }

  let quiz: HashMap<String, &[QuestionDraft]> = harder
    .map(|(_, content)| content.questions.iter().map(|q| (label_key(&q.section), q.questions.as_slice())).collect())
    .unwrap_or_default();
  let in_order: Vec<&[QuestionDraft]> = harder
    .map(|(_, content)| content.questions.iter().map(|q| q.questions.as_slice()).filter(|q| !q.is_empty()).collect())
    .unwrap_or_default();
  let steps: &[Step] = seq.steps.as_slice();
  let afters: Vec<u32> = seq.checkpoints.iter().map(|c| c.after_step_order).collect();
  let mut raised = 0;
  for c in seq.checkpoints.iter_mut() {
    if !(in_tail(c, tail) && c.attempts.is_empty() && c.level < Level::Advanced) {
      continue;
    }
    let new_level = c.level.harder();
    if !harder.is_some_and(|(level, _)| level == new_level) {
      continue;
    }
    let from = afters.iter().filter(|a| **a < c.after_step_order).max().map(|a| a + 1).unwrap_or(0);
    let covered: Vec<&Step> = steps.iter().filter(|s| s.order >= from && s.order <= c.after_step_order).collect();
    let mut drafts: Vec<QuestionDraft> = covered
      .iter()
      .filter_map(|s| quiz.get(&label_key(&s.label)))
      .flat_map(|d| d.iter().cloned())
      .collect();
    // Headings differ between generations; fall back to the harder sections by position.
    if drafts.is_empty() && !in_order.is_empty() {
      drafts = covered
        .iter()
        .flat_map(|s| in_order[s.order as usize % in_order.len()].iter().cloned())
        .collect();
    }
    let questions = build_questions(&drafts);
    if questions.is_empty() {
      continue;
    }
    c.questions = questions;
    c.level = new_level;
    raised += 1;
  }
  debug!(target: "pathway", removed = review.is_some(), raised, "Advanced tail");

  if review.is_none() && raised == 0 {
    return AdaptationOutcome::Unchanged;
  }
  AdaptationOutcome::Advanced { removed_step_id: review.map(|(id, _)| id), raised }
}
