//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//!
//! Request fields are camelCase; paths are returned as stored.

use serde::{Deserialize, Serialize};

use crate::adaptation::{AdaptationOutcome, PerformanceSignal};
use crate::builder::StepDraft;
use crate::domain::{Answers, Attempt, LearningPath, Level};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    CreatePath {
        #[serde(rename = "ownerId")]
        owner_id: String,
        topic: String,
        level: Level,
    },
    GetPath {
        #[serde(rename = "pathId")]
        path_id: String,
    },
    ListPaths {
        #[serde(rename = "ownerId")]
        owner_id: String,
    },
    DeletePath {
        #[serde(rename = "pathId")]
        path_id: String,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<u64>,
    },
    CompleteStep {
        #[serde(rename = "pathId")]
        path_id: String,
        #[serde(rename = "stepId")]
        step_id: String,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<u64>,
    },
    TakeCheckpoint {
        #[serde(rename = "pathId")]
        path_id: String,
        #[serde(rename = "checkpointId")]
        checkpoint_id: String,
        answers: Answers,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<u64>,
    },
    CreateBranch {
        #[serde(rename = "pathId")]
        path_id: String,
        #[serde(rename = "forkAtStepOrder")]
        fork_at_step_order: u32,
        #[serde(rename = "branchName")]
        branch_name: String,
        #[serde(default, rename = "initialSteps")]
        initial_steps: Option<Vec<StepDraft>>,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<u64>,
    },
    SwitchBranch {
        #[serde(rename = "pathId")]
        path_id: String,
        #[serde(default, rename = "branchId")]
        branch_id: Option<String>,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<u64>,
    },
    AdaptPath {
        #[serde(rename = "pathId")]
        path_id: String,
        signal: PerformanceSignal,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<u64>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Path {
        path: Box<LearningPath>,
    },
    Paths {
        paths: Vec<LearningPath>,
    },
    PathCreated {
        path: Box<LearningPath>,
        created: bool,
    },
    PathDeleted {
        #[serde(rename = "pathId")]
        path_id: String,
    },
    BranchCreated {
        path: Box<LearningPath>,
        #[serde(rename = "branchId")]
        branch_id: String,
    },
    CheckpointResult {
        path: Box<LearningPath>,
        attempt: Attempt,
    },
    Adapted {
        path: Box<LearningPath>,
        outcome: AdaptationOutcome,
    },
    Error {
        message: String,
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<Box<LearningPath>>,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct CreatePathIn {
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    pub topic: String,
    pub level: Level,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    #[serde(rename = "ownerId")]
    pub owner_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    #[serde(default, rename = "expectedVersion")]
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct AttemptIn {
    pub answers: Answers,
    #[serde(default, rename = "expectedVersion")]
    pub expected_version: Option<u64>,
}
#[derive(Serialize)]
pub struct CheckpointResultOut {
    pub path: LearningPath,
    pub attempt: Attempt,
}

#[derive(Deserialize)]
pub struct CreateBranchIn {
    #[serde(rename = "forkAtStepOrder")]
    pub fork_at_step_order: u32,
    #[serde(rename = "branchName")]
    pub branch_name: String,
    #[serde(default, rename = "initialSteps")]
    pub initial_steps: Option<Vec<StepDraft>>,
    #[serde(default, rename = "expectedVersion")]
    pub expected_version: Option<u64>,
}
#[derive(Serialize)]
pub struct BranchOut {
    pub path: LearningPath,
    #[serde(rename = "branchId")]
    pub branch_id: String,
}

#[derive(Deserialize)]
pub struct SwitchBranchIn {
    #[serde(default, rename = "branchId")]
    pub branch_id: Option<String>,
    #[serde(default, rename = "expectedVersion")]
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct AdaptIn {
    pub signal: PerformanceSignal,
    #[serde(default, rename = "expectedVersion")]
    pub expected_version: Option<u64>,
}
#[derive(Serialize)]
pub struct AdaptOut {
    pub path: LearningPath,
    pub outcome: AdaptationOutcome,
}

/// Body of every error response.
#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<LearningPath>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub generator: &'static str,
}
