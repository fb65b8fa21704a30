//! Built-in template content that keeps the engine useful without a model configured,
//! and the last-resort material adaptation falls back to.

use async_trait::async_trait;

use crate::domain::{AnswerOption, Level, QuestionKind};
use crate::generator::{ContentGenerator, GeneratedContent, QuestionDraft, SectionQuiz};

/// Deterministic generator: same `(topic, level)` always yields the same lesson.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl ContentGenerator for TemplateGenerator {
  fn name(&self) -> &'static str { "template" }

  async fn generate(&self, topic: &str, level: Level) -> Result<GeneratedContent, String> {
    Ok(template_content(topic, level))
  }
}

/// Section headings of the template lesson, with the focus sentence of each.
fn sections(level: Level) -> [(&'static str, &'static str); 4] {
  match level {
    Level::Beginner => [
      ("Key ideas", "Start with the vocabulary and the one or two rules everything else builds on."),
      ("Walkthrough", "Follow a small example line by line and predict each result before reading it."),
      ("Common mistakes", "Look at the errors newcomers hit first and what each one is telling you."),
      ("Practice", "Rebuild the walkthrough example from memory, then change one thing at a time."),
    ],
    Level::Intermediate => [
      ("Core model", "Restate the mental model precisely enough to explain edge cases with it."),
      ("Worked example", "Work through a realistic example that combines several rules."),
      ("Trade-offs", "Compare the main alternatives and when each one is the better fit."),
      ("Practice", "Solve a medium-sized exercise without looking back at the example."),
    ],
    Level::Advanced => [
      ("Internals", "Study how the mechanism is actually implemented and what it costs."),
      ("Edge cases", "Probe the corners where the simple model stops being accurate."),
      ("Design patterns", "Recognise the idioms experienced practitioners reach for and why they hold up."),
      ("Practice", "Design a solution for an open-ended problem and critique it."),
    ],
  }
}

pub fn template_content(topic: &str, level: Level) -> GeneratedContent {
  let mut body = format!("A {} lesson on {}. Work through the sections in order.\n", level, topic);
  let mut questions = Vec::new();

  for (heading, focus) in sections(level) {
    body.push_str(&format!("\n## {heading}\n\n{focus} Apply it to {topic}.\n"));
    questions.push(SectionQuiz {
      section: heading.to_string(),
      questions: vec![QuestionDraft {
        prompt: format!("What is the goal of the '{heading}' section on {topic}?"),
        kind: QuestionKind::SingleChoice,
        options: vec![
          AnswerOption { id: "a".into(), text: focus.to_string() },
          AnswerOption { id: "b".into(), text: "Skip ahead to the next topic.".into() },
          AnswerOption { id: "c".into(), text: "Memorise the section title.".into() },
        ],
        correct: vec!["a".into()],
      }],
    });
  }

  GeneratedContent { body, questions }
}

/// Body used for a remediation step when no generated section matches.
pub fn remediation_body(label: &str, topic: &str) -> String {
  format!(
    "Before moving on, revisit \"{label}\". Re-read the previous section on {topic}, \
     write down the two ideas you found hardest, and try the last example again without notes."
  )
}
