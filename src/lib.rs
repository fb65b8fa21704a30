//! Adaptive learning path engine: builds ordered curricula, gates progress behind
//! checkpoints, forks branches and reshapes the remaining path from performance.

pub mod adaptation;
pub mod branching;
pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod generator;
pub mod openai;
pub mod prerequisites;
pub mod progress;
pub mod protocol;
pub mod routes;
pub mod seeds;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;

#[cfg(test)]
mod test_support;
