//! # Indexer Pipeline - Parsed-Event Dispatch
//!
//! Turns raw receipt logs into [`ParsedEvent`]s and pushes them through an
//! ordered stage pipeline:
//!
//! ```text
//! raw log ──▶ ParserRegistry ──▶ ParsedEvent ──▶ handler ─▶ storage ─▶ publish
//! ```
//!
//! Stages run in order and terminate on the first error, which propagates
//! wrapped with the failing stage's name. The publish stage hands the
//! event to the bus as a system-contract event; a pipeline built without a
//! bus treats that stage as a no-op.

pub mod error;
pub mod parsed;
pub mod pipeline;
pub mod registry;

pub use error::PipelineError;
pub use parsed::ParsedEvent;
pub use pipeline::{
    EventHandler, EventSink, HandlerStage, Pipeline, PipelineStage, PublishStage, StorageStage,
};
pub use registry::{ContractParser, ParserRegistry};
