#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use pathway_backend::config::{CatalogEntry, EngineConfig};
use pathway_backend::domain::{AnswerOption, Answers, Checkpoint, Level, QuestionKind};
use pathway_backend::engine::PathEngine;
use pathway_backend::generator::{ContentGenerator, GeneratedContent, QuestionDraft, SectionQuiz};
use pathway_backend::prerequisites::StaticCatalog;
use pathway_backend::routes::build_router;
use pathway_backend::seeds::template_content;
use pathway_backend::state::AppState;

/// Number of `## ` sections in every stub lesson.
pub const SECTIONS: usize = 6;

/// Six headed sections, one single-choice question each ("a" is right). No preface,
/// so the path is exactly six steps with checkpoints after orders 2 and 5.
pub fn stub_lesson(topic: &str) -> GeneratedContent {
    let mut body = String::new();
    let mut questions = Vec::new();
    for i in 1..=SECTIONS {
        body.push_str(&format!("## {topic} part {i}\nWhat to know about part {i}.\n\n"));
        questions.push(SectionQuiz {
            section: format!("{topic} part {i}"),
            questions: vec![QuestionDraft {
                prompt: format!("Part {i}: which is right?"),
                kind: QuestionKind::SingleChoice,
                options: vec![
                    AnswerOption { id: "a".into(), text: "this".into() },
                    AnswerOption { id: "b".into(), text: "that".into() },
                ],
                correct: vec!["a".into()],
            }],
        });
    }
    GeneratedContent { body, questions }
}

#[derive(Default)]
pub struct StubGenerator {
    pub calls: AtomicUsize,
}

impl StubGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for StubGenerator {
    fn name(&self) -> &'static str { "stub" }

    async fn generate(&self, topic: &str, _level: Level) -> Result<GeneratedContent, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(stub_lesson(topic))
    }
}

pub struct SlowGenerator(pub Duration);

#[async_trait]
impl ContentGenerator for SlowGenerator {
    fn name(&self) -> &'static str { "slow" }

    async fn generate(&self, topic: &str, level: Level) -> Result<GeneratedContent, String> {
        tokio::time::sleep(self.0).await;
        Ok(template_content(topic, level))
    }
}

pub struct FailingGenerator;

#[async_trait]
impl ContentGenerator for FailingGenerator {
    fn name(&self) -> &'static str { "failing" }

    async fn generate(&self, _topic: &str, _level: Level) -> Result<GeneratedContent, String> {
        Err("model unavailable".into())
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig { generation_timeout_ms: 2_000, ..EngineConfig::default() }
}

pub fn engine_with(generator: Arc<dyn ContentGenerator>, catalog: Vec<CatalogEntry>, config: EngineConfig) -> PathEngine {
    PathEngine::new(generator, Arc::new(StaticCatalog::new(catalog)), config)
}

pub fn stub_engine() -> PathEngine {
    engine_with(Arc::new(StubGenerator::default()), Vec::new(), test_config())
}

pub fn catalog_entry(topic: &str, depends_on: &[&str]) -> CatalogEntry {
    CatalogEntry { topic: topic.into(), level: None, depends_on: depends_on.iter().map(|d| d.to_string()).collect() }
}

/// Answers that get every question of the checkpoint right.
pub fn correct_answers(checkpoint: &Checkpoint) -> Answers {
    checkpoint.questions.iter().map(|q| (q.id.clone(), q.correct_answers.clone())).collect()
}

/// Answers that get every question of the checkpoint wrong.
pub fn wrong_answers(checkpoint: &Checkpoint) -> Answers {
    checkpoint
        .questions
        .iter()
        .map(|q| {
            let wrong = q.options.iter().find(|o| !q.correct_answers.contains(&o.id)).map(|o| o.id.clone());
            (q.id.clone(), wrong.into_iter().collect::<BTreeSet<_>>())
        })
        .collect()
}

/// Build the full application router around an engine wired with `generator`.
pub fn build_test_app(generator: Arc<dyn ContentGenerator>, config: EngineConfig) -> Router {
    let catalog = Arc::new(StaticCatalog::default());
    build_router(Arc::new(AppState::with_parts(generator, catalog, config)))
}

pub fn stub_app() -> Router {
    build_test_app(Arc::new(StubGenerator::default()), test_config())
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder.header(CONTENT_TYPE, "application/json").body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Send and return status plus parsed JSON body.
pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = send(app, method, uri, body).await;
    let status = response.status();
    (status, body_json(response).await)
}
