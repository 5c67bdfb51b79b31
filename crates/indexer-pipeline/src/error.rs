//! # Pipeline Errors

use indexer_bus::BusError;
use indexer_types::primitives::{Address, Hash};
use thiserror::Error;

/// Errors from the parser registry and the stage pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failed; carries the stage name for context.
    #[error("stage {stage} failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// The underlying failure.
        #[source]
        source: Box<PipelineError>,
    },

    /// A parser or ABI is already registered for the address.
    #[error("parser already registered for {0:#x}")]
    AlreadyRegistered(Address),

    /// The log carries no topics, so there is no event signature to look
    /// up.
    #[error("log has no topics")]
    NoTopics,

    /// `topics[0]` matched no event in the registered ABI.
    #[error("unknown event signature {0:#x}")]
    UnknownEventSignature(Hash),

    /// The ABI decoder rejected the log body.
    #[error("log decode failed: {0}")]
    DecodeFailed(String),

    /// A registered handler failed.
    #[error("handler {0} failed: {1}")]
    Handler(String, String),

    /// A storage sink failed.
    #[error("storage sink {0} failed: {1}")]
    Storage(String, String),

    /// The publish stage could not hand the event to the bus.
    #[error(transparent)]
    Publish(#[from] BusError),
}

impl PipelineError {
    /// Wrap an error with the name of the stage it came from.
    #[must_use]
    pub fn in_stage(stage: &str, source: PipelineError) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            source: Box::new(source),
        }
    }
}
