//! Application state: the path engine plus whatever it was wired with at startup.
//!
//! The content generator is the OpenAI client (wrapped so failures degrade to the
//! built-in templates) when OPENAI_API_KEY is set, otherwise the templates alone.
//! The prerequisite catalog comes from the `[[catalog]]` TOML table.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{load_config_from_env, EngineConfig};
use crate::engine::PathEngine;
use crate::generator::{ContentGenerator, FallbackGenerator};
use crate::openai::OpenAI;
use crate::prerequisites::{PrerequisiteCatalog, StaticCatalog};
use crate::seeds::TemplateGenerator;

pub struct AppState {
    pub engine: PathEngine,
}

impl AppState {
    /// Build state from env: load config, init OpenAI, build the catalog.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_config_from_env().unwrap_or_default();

        let generator: Arc<dyn ContentGenerator> = match OpenAI::from_env(cfg.prompts.clone()) {
            Some(oa) => {
                info!(target: "pathway_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
                Arc::new(FallbackGenerator::new(Arc::new(oa)))
            }
            None => {
                info!(target: "pathway_backend", "OpenAI disabled (no OPENAI_API_KEY). Using template lessons.");
                Arc::new(TemplateGenerator)
            }
        };

        info!(
            target: "pathway_backend",
            catalog_entries = cfg.catalog.len(),
            checkpoint_interval = cfg.engine.checkpoint_interval,
            auto_adapt = cfg.engine.auto_adapt,
            "Engine configured"
        );
        let catalog = Arc::new(StaticCatalog::new(cfg.catalog));
        Self::with_parts(generator, catalog, cfg.engine)
    }

    pub fn with_parts(generator: Arc<dyn ContentGenerator>, catalog: Arc<dyn PrerequisiteCatalog>, config: EngineConfig) -> Self {
        Self { engine: PathEngine::new(generator, catalog, config) }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
