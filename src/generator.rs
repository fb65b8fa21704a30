//! Content generation collaborator: turns `(topic, level)` into lesson text plus quiz data.
//!
//! The engine only depends on the `ContentGenerator` trait. `FallbackGenerator` wraps a
//! model-backed generator and degrades to the built-in templates when it fails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::domain::{AnswerOption, Level, QuestionKind};
use crate::seeds::TemplateGenerator;

/// Lesson text (markdown-like, `## ` per section) plus per-section quiz data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GeneratedContent {
  pub body: String,
  #[serde(default)]
  pub questions: Vec<SectionQuiz>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SectionQuiz {
  /// Heading text of the section the questions belong to.
  pub section: String,
  #[serde(default)]
  pub questions: Vec<QuestionDraft>,
}

/// Question as supplied by a generator, before ids are assigned and it is sanity checked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionDraft {
  pub prompt: String,
  #[serde(default = "default_kind")]
  pub kind: QuestionKind,
  #[serde(default)]
  pub options: Vec<AnswerOption>,
  #[serde(default, alias = "correct_answers")]
  pub correct: Vec<String>,
}

fn default_kind() -> QuestionKind {
  QuestionKind::SingleChoice
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
  /// Short name used in logs.
  fn name(&self) -> &'static str;

  async fn generate(&self, topic: &str, level: Level) -> Result<GeneratedContent, String>;
}

/// Tries the primary generator, then the templates. Never fails on its own.
pub struct FallbackGenerator {
  primary: Arc<dyn ContentGenerator>,
  fallback: TemplateGenerator,
}

impl FallbackGenerator {
  pub fn new(primary: Arc<dyn ContentGenerator>) -> Self {
    Self { primary, fallback: TemplateGenerator }
  }
}

#[async_trait]
impl ContentGenerator for FallbackGenerator {
  fn name(&self) -> &'static str {
    self.primary.name()
  }

  #[instrument(level = "info", skip(self), fields(primary = self.primary.name(), %level))]
  async fn generate(&self, topic: &str, level: Level) -> Result<GeneratedContent, String> {
    match self.primary.generate(topic, level).await {
      Ok(content) => Ok(content),
      Err(e) => {
        error!(target: "pathway", %topic, %level, error = %e, "Primary generator failed; using template content");
        self.fallback.generate(topic, level).await
      }
    }
  }
}
