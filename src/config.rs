//! Loading engine configuration (tunables + prompts + prerequisite catalog) from TOML.
//!
//! See `PathwayConfig`, `EngineConfig` and `Prompts` for the expected schema. Every
//! table is optional; anything missing falls back to the defaults below.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Level, TopicId};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PathwayConfig {
  #[serde(default)]
  pub engine: EngineConfig,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub catalog: Vec<CatalogEntry>,
}

/// Tunables for path building, gating and adaptation.
/// The thresholds are product defaults, not a wire contract; override them freely.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// A checkpoint is inserted after every `checkpoint_interval` steps.
  pub checkpoint_interval: usize,
  pub default_passing_score: u8,
  /// Trailing average below this (0-100) means the learner is struggling.
  pub remediation_threshold: f32,
  /// Trailing average above this (0-100) means the learner is excelling.
  pub mastery_threshold: f32,
  pub mastery_min_checkpoints: usize,
  /// How many recently attempted checkpoints feed the recorded-history signal.
  pub trailing_window: usize,
  pub passing_score_step: u8,
  pub passing_score_floor: u8,
  pub max_update_attempts: u32,
  pub generation_timeout_ms: u64,
  pub slow_step_secs: u64,
  pub max_branches: usize,
  pub auto_adapt: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      checkpoint_interval: 3,
      default_passing_score: 70,
      remediation_threshold: 60.0,
      mastery_threshold: 90.0,
      mastery_min_checkpoints: 2,
      trailing_window: 3,
      passing_score_step: 10,
      passing_score_floor: 50,
      max_update_attempts: 3,
      generation_timeout_ms: 25_000,
      slow_step_secs: 1_800,
      max_branches: 20,
      auto_adapt: false,
    }
  }
}

impl EngineConfig {
  pub fn generation_timeout(&self) -> Duration {
    Duration::from_millis(self.generation_timeout_ms)
  }
}

/// One node of the prerequisite catalog.
/// `level = None` applies the entry to every level.
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogEntry {
  pub topic: TopicId,
  #[serde(default)] pub level: Option<Level>,
  #[serde(default)] pub depends_on: Vec<TopicId>,
}

/// Prompts used by the OpenAI content generator.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub lesson_system: String,
  pub lesson_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      lesson_system: "You are a curriculum designer writing self-paced lessons. Respond ONLY with strict JSON.".into(),
      lesson_user_template: "Write a {level} lesson about '{topic}'.\n\
        Return JSON with fields:\n\
        - body: markdown text. A short introduction, then 4-8 sections, each starting with a '## ' heading.\n\
        - questions: array of {\"section\": <exact heading text>, \"questions\": [{\"prompt\": string, \"kind\": \"single_choice\" | \"multi_select\", \"options\": [{\"id\": string, \"text\": string}], \"correct\": [option ids]}]}.\n\
        Give every section 1-2 questions. single_choice questions have exactly one correct option.".into(),
    }
  }
}

/// Attempt to load `PathwayConfig` from PATHWAY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<PathwayConfig> {
  let path = std::env::var("PATHWAY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PathwayConfig>(&s) {
      Ok(cfg) => {
        info!(target: "pathway_backend", %path, catalog_entries = cfg.catalog.len(), "Loaded pathway config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "pathway_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "pathway_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
