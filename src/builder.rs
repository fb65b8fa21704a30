//! Path building: split generated lesson text into ordered steps and place checkpoints.
//!
//! Rules:
//! - one step per `## ` heading (headings inside fenced code blocks don't count);
//! - text before the first heading becomes an "Overview" step at the front;
//! - text without any heading becomes a single "Overview" step and gets no checkpoint;
//! - a checkpoint follows every `checkpoint_interval` steps, carrying the quiz questions
//!   of the sections it covers. Groups without usable questions get no checkpoint.
//!
//! Nothing in here fails: malformed quiz data is dropped with a warning.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Checkpoint, Level, Question, QuestionKind, Step, StepKind, TopicId};
use crate::generator::{GeneratedContent, QuestionDraft};
use crate::util::label_key;

pub const OVERVIEW_LABEL: &str = "Overview";

#[derive(Clone, Debug, PartialEq)]
pub struct Section {
  pub label: String,
  pub body: String,
}

/// Caller-supplied step content (branch tracks).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepDraft {
  pub label: String,
  #[serde(default)]
  pub body: String,
}

/// Generated content for one topic of the path, in path order.
#[derive(Clone, Debug)]
pub struct TopicPart<'a> {
  pub topic: &'a str,
  pub depends_on: BTreeSet<TopicId>,
  pub content: &'a GeneratedContent,
  /// Prerequisite parts get their topic prefixed onto step labels.
  pub is_prerequisite: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct BuildOptions {
  pub checkpoint_interval: usize,
  pub passing_score: u8,
  pub level: Level,
}

#[derive(Clone, Debug, Default)]
pub struct BuiltSequence {
  pub steps: Vec<Step>,
  pub checkpoints: Vec<Checkpoint>,
}

/// Split lesson text into sections. Never returns an empty vector.
pub fn split_sections(text: &str) -> Vec<Section> {
  split(text).0
}

/// Sections plus whether the text had any real heading.
fn split(text: &str) -> (Vec<Section>, bool) {
  let mut preface = String::new();
  let mut sections: Vec<Section> = Vec::new();
  let mut in_fence = false;

  for line in text.lines() {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
      in_fence = !in_fence;
    }
    let heading = if in_fence { None } else { second_level_heading(trimmed) };

    match heading {
      Some(label) => {
        let label = if label.is_empty() { format!("Section {}", sections.len() + 1) } else { label };
        sections.push(Section { label, body: String::new() });
      }
      None => {
        let target = match sections.last_mut() {
          Some(s) => &mut s.body,
          None => &mut preface,
        };
        target.push_str(line);
        target.push('\n');
      }
    }
  }

  if sections.is_empty() {
    return (vec![Section { label: OVERVIEW_LABEL.to_string(), body: text.trim().to_string() }], false);
  }

  for s in sections.iter_mut() {
    s.body = s.body.trim().to_string();
  }
  if preface_has_content(&preface) {
    sections.insert(0, Section { label: OVERVIEW_LABEL.to_string(), body: preface.trim().to_string() });
  }
  (sections, true)
}

fn second_level_heading(line: &str) -> Option<String> {
  let rest = line.strip_prefix("##")?;
  if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t')) {
    return None;
  }
  Some(rest.trim().trim_end_matches('#').trim().to_string())
}

/// A preface that is only a top-level title is not worth a step.
fn preface_has_content(preface: &str) -> bool {
  preface.lines().map(str::trim).any(|l| !l.is_empty() && !(l == "#" || l.starts_with("# ")))
}

/// Turn generator drafts into questions, dropping anything that couldn't be scored.
pub fn build_questions(drafts: &[QuestionDraft]) -> Vec<Question> {
  drafts
    .iter()
    .filter_map(|d| {
      let option_ids: HashSet<&str> = d.options.iter().map(|o| o.id.as_str()).collect();
      let correct: BTreeSet<String> = d.correct.iter().cloned().collect();
      let problem = if d.prompt.trim().is_empty() {
        Some("empty prompt")
      } else if d.options.is_empty() || d.options.iter().any(|o| o.id.trim().is_empty()) {
        Some("missing options or option ids")
      } else if option_ids.len() != d.options.len() {
        Some("duplicate option ids")
      } else if correct.is_empty() || correct.iter().any(|c| !option_ids.contains(c.as_str())) {
        Some("correct answers must be a non-empty subset of the options")
      } else if d.kind == QuestionKind::SingleChoice && correct.len() != 1 {
        Some("single choice question needs exactly one correct answer")
      } else {
        None
      };
      if let Some(problem) = problem {
        warn!(target: "pathway", prompt = %crate::util::trunc_for_log(&d.prompt, 60), %problem, "Dropping malformed question");
        return None;
      }
      Some(Question {
        id: Uuid::new_v4().to_string(),
        prompt: d.prompt.trim().to_string(),
        kind: d.kind,
        options: d.options.clone(),
        correct_answers: correct,
      })
    })
    .collect()
}

/// Assemble one sequence from the parts of a path (prerequisites first, requested topic last).
pub fn build_sequence(parts: &[TopicPart<'_>], opts: &BuildOptions) -> BuiltSequence {
  let mut steps: Vec<Step> = Vec::new();
  let mut step_questions: Vec<Vec<Question>> = Vec::new();

  for part in parts {
    let (sections, headed) = split(&part.content.body);
    let quiz: HashMap<String, &[QuestionDraft]> = part
      .content
      .questions
      .iter()
      .map(|q| (label_key(&q.section), q.questions.as_slice()))
      .collect();

    for section in sections {
      let questions = if headed {
        quiz.get(&label_key(&section.label)).map(|d| build_questions(d)).unwrap_or_default()
      } else {
        Vec::new()
      };
      let label = if part.is_prerequisite { format!("{}: {}", part.topic, section.label) } else { section.label };
      steps.push(Step {
        id: Uuid::new_v4().to_string(),
        label,
        body: section.body,
        order: steps.len() as u32,
        topic: part.topic.to_string(),
        prerequisite_topic_ids: part.depends_on.clone(),
        kind: StepKind::Lesson,
        completed: false,
        completed_at: None,
      });
      step_questions.push(questions);
    }
  }

  if steps.is_empty() {
    // No parts at all; still hand back a walkable path.
    steps.push(Step {
      id: Uuid::new_v4().to_string(),
      label: OVERVIEW_LABEL.to_string(),
      body: String::new(),
      order: 0,
      topic: String::new(),
      prerequisite_topic_ids: BTreeSet::new(),
      kind: StepKind::Lesson,
      completed: false,
      completed_at: None,
    });
    step_questions.push(Vec::new());
  }

  let checkpoints = place_checkpoints(&step_questions, opts);
  debug!(target: "pathway", steps = steps.len(), checkpoints = checkpoints.len(), "Built step sequence");
  BuiltSequence { steps, checkpoints }
}

/// A checkpoint after every `interval` steps, holding the questions of the steps it covers.
pub fn place_checkpoints(step_questions: &[Vec<Question>], opts: &BuildOptions) -> Vec<Checkpoint> {
  let interval = opts.checkpoint_interval.max(1);
  step_questions
    .chunks(interval)
    .enumerate()
    .filter(|(_, group)| group.len() == interval)
    .filter_map(|(i, group)| {
      let questions: Vec<Question> = group.iter().flatten().cloned().collect();
      if questions.is_empty() {
        return None;
      }
      Some(Checkpoint {
        id: Uuid::new_v4().to_string(),
        after_step_order: ((i + 1) * interval - 1) as u32,
        questions,
        passing_score: opts.passing_score.min(100),
        level: opts.level,
        attempts: Vec::new(),
      })
    })
    .collect()
}

/// Steps for a caller-supplied track, numbered from 0.
pub fn steps_from_drafts(drafts: &[StepDraft], topic: &str) -> Vec<Step> {
  drafts
    .iter()
    .enumerate()
    .map(|(i, d)| Step {
      id: Uuid::new_v4().to_string(),
      label: if d.label.trim().is_empty() { format!("Section {}", i + 1) } else { d.label.trim().to_string() },
      body: d.body.clone(),
      order: i as u32,
      topic: topic.to_string(),
      prerequisite_topic_ids: BTreeSet::new(),
      kind: StepKind::Lesson,
      completed: false,
      completed_at: None,
    })
    .collect()
}
