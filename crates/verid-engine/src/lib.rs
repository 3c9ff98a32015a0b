//! verid-engine — Worker pool and configuration around verid-core.
//!
//! Loads configuration from `VERID_*` environment variables and runs the
//! verification pipelines on a pool of dedicated OS threads behind an
//! async, clone-safe handle.

pub mod config;
pub mod engine;

pub use config::Config;
pub use engine::{spawn_pool, EngineError, EngineHandle};
