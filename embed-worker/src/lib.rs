//! Embedding workers.
//!
//! Each registered model gets a pool of worker loops consuming its queue.
//! A worker runs the model's embedding engine and records the task outcome
//! in the result store before acknowledging the broker message.

pub mod config;
pub mod engine;
pub mod error;
pub mod worker;

#[cfg(test)]
mod test_util;

pub use config::{EnginesConfig, OllamaEngineConfig, WorkerConfig};
pub use engine::{
    build_engine, EmbedError, EmbedOptions, Embedder, EngineHealth, EngineRegistry,
    HashEmbedder, OllamaEmbedder,
};
pub use error::{Error, Result};
pub use worker::{Outcome, RetryPolicy, WorkerLoop, WorkerPool};
