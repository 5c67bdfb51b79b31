//! # Stage Pipeline
//!
//! An ordered list of stages a [`ParsedEvent`] passes through. Execution
//! stops at the first error, which propagates wrapped with the stage name.
//!
//! Built-in stages, in their conventional order:
//! 1. [`HandlerStage`]: per-event-name handlers, with a default set that
//!    runs only when no specific handler is registered.
//! 2. [`StorageStage`]: per-event-name persistence sinks.
//! 3. [`PublishStage`]: hands the event to the bus as a system-contract
//!    event. A missing bus makes this a no-op.

use crate::error::PipelineError;
use crate::parsed::ParsedEvent;
use async_trait::async_trait;
use indexer_bus::events::{SystemContractEvent, SystemContractEventName};
use indexer_bus::EventBus;
use indexer_types::entities::BlockRef;
use indexer_types::primitives::Hash;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One processing step of the pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stage name, used for error context.
    fn name(&self) -> &str;

    /// Process one event.
    async fn process(&self, event: &ParsedEvent) -> Result<(), PipelineError>;
}

/// An ordered list of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn add_stage(&mut self, stage: Arc<dyn PipelineStage>) {
        self.stages.push(stage);
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the event through every stage in order. The first failure
    /// terminates the run and carries the stage name.
    pub async fn process(&self, event: &ParsedEvent) -> Result<(), PipelineError> {
        for stage in &self.stages {
            stage
                .process(event)
                .await
                .map_err(|e| PipelineError::in_stage(stage.name(), e))?;
        }
        Ok(())
    }
}

/// A callback invoked for matching parsed events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, used in error context.
    fn name(&self) -> &str;

    /// Handle one event.
    async fn handle(&self, event: &ParsedEvent) -> Result<(), PipelineError>;
}

/// Dispatches events to handlers registered by event name. Default
/// handlers run only when no specific handler exists for the name.
#[derive(Default)]
pub struct HandlerStage {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    default_handlers: Vec<Arc<dyn EventHandler>>,
}

impl HandlerStage {
    /// Create an empty handler stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event name. Handlers for the same name
    /// run in registration order.
    pub fn register(&mut self, event_name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(event_name.into())
            .or_default()
            .push(handler);
    }

    /// Register a default handler.
    pub fn register_default(&mut self, handler: Arc<dyn EventHandler>) {
        self.default_handlers.push(handler);
    }
}

#[async_trait]
impl PipelineStage for HandlerStage {
    fn name(&self) -> &str {
        "handler"
    }

    async fn process(&self, event: &ParsedEvent) -> Result<(), PipelineError> {
        let handlers = match self.handlers.get(&event.event_name) {
            Some(specific) => specific,
            None => &self.default_handlers,
        };
        for handler in handlers {
            handler.handle(event).await?;
        }
        Ok(())
    }
}

/// A persistence sink for parsed events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sink name, used in error context.
    fn name(&self) -> &str;

    /// Persist one event.
    async fn store(&self, event: &ParsedEvent) -> Result<(), PipelineError>;
}

/// Routes events to storage sinks registered by event name.
#[derive(Default)]
pub struct StorageStage {
    sinks: HashMap<String, Vec<Arc<dyn EventSink>>>,
}

impl StorageStage {
    /// Create an empty storage stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink for one event name. Sinks for the same name run in
    /// registration order.
    pub fn register(&mut self, event_name: impl Into<String>, sink: Arc<dyn EventSink>) {
        self.sinks.entry(event_name.into()).or_default().push(sink);
    }
}

#[async_trait]
impl PipelineStage for StorageStage {
    fn name(&self) -> &str {
        "storage"
    }

    async fn process(&self, event: &ParsedEvent) -> Result<(), PipelineError> {
        if let Some(sinks) = self.sinks.get(&event.event_name) {
            for sink in sinks {
                sink.store(event).await?;
            }
        }
        Ok(())
    }
}

/// Wraps the parsed event as a system-contract bus event and publishes it.
pub struct PublishStage {
    bus: Option<Arc<dyn EventBus>>,
}

impl PublishStage {
    /// Create the stage. A `None` bus makes processing a no-op, which
    /// lets pipelines run without a bus wired in.
    #[must_use]
    pub fn new(bus: Option<Arc<dyn EventBus>>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl PipelineStage for PublishStage {
    fn name(&self) -> &str {
        "publish"
    }

    async fn process(&self, event: &ParsedEvent) -> Result<(), PipelineError> {
        let Some(bus) = &self.bus else {
            debug!(event = %event.event_name, "publish stage has no bus; skipping");
            return Ok(());
        };

        let name = SystemContractEventName::from(event.event_name.clone());
        // A parsed log carries no block hash; the reference is by number.
        let block = BlockRef::new(event.block_number, Hash::zero());
        let bus_event = SystemContractEvent::new(
            event.contract_address,
            name,
            block,
            event.tx_hash,
            event.log_index,
            event.data.clone(),
        );

        if bus.publish(bus_event.into()) {
            Ok(())
        } else {
            Err(PipelineError::Publish(indexer_bus::BusError::PublishFailed(
                "bus rejected system-contract event".to_string(),
            )))
        }
    }
}
