pub mod cancel;
pub mod config;
pub mod controller;
pub mod pipeline;

#[cfg(test)]
mod testutil;

use thiserror::Error;

pub use cancel::CancelToken;
pub use config::{Config, ConfigError, FileProvider, InputParams};
pub use controller::{ControllerConfig, RunSpec, Session, SessionController, SessionState};
pub use pipeline::{LoopExit, LoopStatus, PipelineFactory, PipelineParts};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a counting session is already running")]
    AlreadyRunning,
    #[error("invalid product selector {0:?} (expected \"<class id>: <name>\")")]
    BadProduct(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
