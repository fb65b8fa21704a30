//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to the path engine. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::EngineError;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "pathway_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "pathway_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "pathway_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e), code: "BAD_REQUEST".into(), current: None },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e), "code": "INTERNAL_ERROR" }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "pathway_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "pathway_backend", "WebSocket disconnected");
}

fn error_msg(err: EngineError) -> ServerWsMessage {
  ServerWsMessage::Error {
    message: err.to_string(),
    code: err.code().to_string(),
    current: err.current().cloned().map(Box::new),
  }
}

#[instrument(level = "info", skip(state))]
pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let engine = &state.engine;
  let result = match msg {
    ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),

    ClientWsMessage::CreatePath { owner_id, topic, level } => engine
      .create_path(&owner_id, &topic, level)
      .await
      .map(|(path, created)| ServerWsMessage::PathCreated { path: Box::new(path), created }),

    ClientWsMessage::GetPath { path_id } => engine
      .get_path(&path_id)
      .await
      .map(|path| ServerWsMessage::Path { path: Box::new(path) }),

    ClientWsMessage::ListPaths { owner_id } => Ok(ServerWsMessage::Paths { paths: engine.list_paths(&owner_id).await }),

    ClientWsMessage::DeletePath { path_id, expected_version } => engine
      .delete_path(&path_id, expected_version)
      .await
      .map(|path| ServerWsMessage::PathDeleted { path_id: path.id }),

    ClientWsMessage::CompleteStep { path_id, step_id, expected_version } => {
      let res = engine.complete_step(&path_id, &step_id, expected_version).await;
      info!(target: "pathway", %path_id, %step_id, ok = res.is_ok(), "WS complete_step handled");
      res.map(|path| ServerWsMessage::Path { path: Box::new(path) })
    }

    ClientWsMessage::TakeCheckpoint { path_id, checkpoint_id, answers, expected_version } => engine
      .take_checkpoint(&path_id, &checkpoint_id, &answers, expected_version)
      .await
      .map(|(path, attempt)| ServerWsMessage::CheckpointResult { path: Box::new(path), attempt }),

    ClientWsMessage::CreateBranch { path_id, fork_at_step_order, branch_name, initial_steps, expected_version } => engine
      .create_branch(&path_id, fork_at_step_order, &branch_name, initial_steps, expected_version)
      .await
      .map(|(path, branch_id)| ServerWsMessage::BranchCreated { path: Box::new(path), branch_id }),

    ClientWsMessage::SwitchBranch { path_id, branch_id, expected_version } => engine
      .switch_branch(&path_id, branch_id.as_deref(), expected_version)
      .await
      .map(|path| ServerWsMessage::Path { path: Box::new(path) }),

    ClientWsMessage::AdaptPath { path_id, signal, expected_version } => engine
      .adapt_path(&path_id, &signal, expected_version)
      .await
      .map(|(path, outcome)| ServerWsMessage::Adapted { path: Box::new(path), outcome }),
  };
  result.unwrap_or_else(error_msg)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;
  use crate::prerequisites::StaticCatalog;
  use crate::seeds::TemplateGenerator;
  use assert_matches::assert_matches;

  fn state() -> AppState {
    AppState::with_parts(Arc::new(TemplateGenerator), Arc::new(StaticCatalog::default()), EngineConfig::default())
  }

  fn parse(json: &str) -> ClientWsMessage {
    serde_json::from_str(json).unwrap()
  }

  #[tokio::test]
  async fn create_list_and_delete_over_ws() {
    let state = state();
    assert_matches!(handle_client_ws(parse(r#"{"type":"ping"}"#), &state).await, ServerWsMessage::Pong);

    let create = parse(r#"{"type":"create_path","ownerId":"learner-1","topic":"ownership","level":"beginner"}"#);
    let path = match handle_client_ws(create, &state).await {
      ServerWsMessage::PathCreated { path, created: true } => path,
      other => panic!("unexpected reply: {other:?}"),
    };

    let list = handle_client_ws(parse(r#"{"type":"list_paths","ownerId":"learner-1"}"#), &state).await;
    assert_matches!(list, ServerWsMessage::Paths { ref paths } if paths.len() == 1);

    let delete = parse(&format!(r#"{{"type":"delete_path","pathId":"{}","expectedVersion":1}}"#, path.id));
    assert_matches!(handle_client_ws(delete, &state).await, ServerWsMessage::PathDeleted { ref path_id } if *path_id == path.id);
  }

  #[tokio::test]
  async fn engine_errors_become_error_messages() {
    let state = state();
    let reply = handle_client_ws(parse(r#"{"type":"get_path","pathId":"missing"}"#), &state).await;
    assert_matches!(reply, ServerWsMessage::Error { ref code, current: None, .. } if code == "PATH_NOT_FOUND");
  }

  #[tokio::test]
  async fn branch_on_unreached_step_reports_current_state() {
    let state = state();
    let (path, _) = state.engine.create_path("learner-1", "ownership", crate::domain::Level::Beginner).await.unwrap();
    let msg = parse(&format!(
      r#"{{"type":"create_branch","pathId":"{}","forkAtStepOrder":0,"branchName":"alt"}}"#,
      path.id
    ));
    let reply = handle_client_ws(msg, &state).await;
    assert_matches!(reply, ServerWsMessage::Error { ref code, current: Some(_), .. } if code == "INVALID_FORK_POINT");
  }
}
