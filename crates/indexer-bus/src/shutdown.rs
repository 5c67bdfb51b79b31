//! # Shutdown Management
//!
//! Two teardown modes:
//!
//! 1. [`ShutdownCoordinator`]: register the bus and any producers, then
//!    one `shutdown` call disconnects remote adapters first and stops the
//!    registered components concurrently under a deadline.
//! 2. [`ShutdownHooks`]: named hooks with integer priorities, run
//!    sequentially highest-first. The deadline short-circuits the
//!    remainder; the first error is returned while later hooks still run.

use crate::bus::EventBus;
use crate::error::BusError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Standard hook priority: the event bus stops first.
pub const PRIORITY_EVENT_BUS: i32 = 100;
/// Standard hook priority: partitioned-log producer.
pub const PRIORITY_KAFKA_PRODUCER: i32 = 90;
/// Standard hook priority: pub/sub connections.
pub const PRIORITY_REDIS: i32 = 80;
/// Standard hook priority: API front-ends.
pub const PRIORITY_API: i32 = 50;
/// Standard hook priority: storage writers.
pub const PRIORITY_STORAGE: i32 = 10;
/// Standard hook priority: final cleanup.
pub const PRIORITY_CLEANUP: i32 = 0;

/// A producer the coordinator can stop alongside the bus.
#[async_trait]
pub trait StoppableProducer: Send + Sync {
    /// Component name for logs.
    fn name(&self) -> &str;

    /// Stop accepting and flushing work.
    async fn stop(&self) -> Result<(), BusError>;
}

/// Registration-based shutdown: bus plus optional producers, torn down in
/// one idempotent call.
#[derive(Default)]
pub struct ShutdownCoordinator {
    bus: Mutex<Option<Arc<dyn EventBus>>>,
    producers: Mutex<Vec<Arc<dyn StoppableProducer>>>,
    started: AtomicBool,
}

impl ShutdownCoordinator {
    /// Create an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bus to stop.
    pub fn register_bus(&self, bus: Arc<dyn EventBus>) {
        *self.bus.lock().unwrap_or_else(PoisonError::into_inner) = Some(bus);
    }

    /// Register a producer to stop alongside the bus.
    pub fn register_producer(&self, producer: Arc<dyn StoppableProducer>) {
        self.producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(producer);
    }

    /// Tear everything down within `timeout`.
    ///
    /// Remote adapters are disconnected first, then the bus and every
    /// producer stop concurrently. The first error seen is returned; the
    /// remaining components still receive their stop signal. A second
    /// call is a no-op.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), BusError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("shutdown coordinator: teardown started");

        let bus = self
            .bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let producers = self
            .producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let teardown = async {
            let mut first_error: Option<BusError> = None;

            // Distributed adapters go first so no new remote traffic
            // arrives while components drain.
            if let Some(bus) = &bus {
                if let Err(e) = bus.disconnect().await {
                    warn!(error = %e, "remote disconnect failed during shutdown");
                    first_error.get_or_insert(e);
                }
            }

            let stop_bus = async {
                match &bus {
                    Some(bus) => bus.stop().await,
                    None => Ok(()),
                }
            };
            let stop_producers = async {
                let mut result = Ok(());
                for producer in &producers {
                    if let Err(e) = producer.stop().await {
                        error!(producer = producer.name(), error = %e, "producer stop failed");
                        if result.is_ok() {
                            result = Err(e);
                        }
                    }
                }
                result
            };

            let (bus_result, producer_result) = tokio::join!(stop_bus, stop_producers);
            if let Err(e) = bus_result {
                first_error.get_or_insert(e);
            }
            if let Err(e) = producer_result {
                first_error.get_or_insert(e);
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        };

        match tokio::time::timeout(timeout, teardown).await {
            Ok(result) => {
                info!("shutdown coordinator: teardown finished");
                result
            }
            Err(_) => {
                error!("shutdown coordinator: deadline exceeded");
                Err(BusError::OperationTimedOut)
            }
        }
    }
}

type HookAction = Box<dyn Fn() -> BoxFuture<'static, Result<(), BusError>> + Send + Sync>;

struct ShutdownHook {
    name: String,
    priority: i32,
    action: HookAction,
}

/// Priority-ordered shutdown hooks.
///
/// Hooks run sequentially, highest priority first; registration order
/// breaks ties. The standard priorities (`PRIORITY_*`) keep teardown in
/// dependency order: bus, producers, transports, API, storage, cleanup.
#[derive(Default)]
pub struct ShutdownHooks {
    hooks: Mutex<Vec<ShutdownHook>>,
    ran: AtomicBool,
}

impl ShutdownHooks {
    /// Create an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named hook.
    pub fn register<F, Fut>(&self, name: impl Into<String>, priority: i32, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BusError>> + Send + 'static,
    {
        let hook = ShutdownHook {
            name: name.into(),
            priority,
            action: Box::new(move || Box::pin(action())),
        };
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every hook within `deadline`. Idempotent: a second call is a
    /// no-op.
    ///
    /// The first error (or the first timeout) is returned; later hooks
    /// still run while deadline time remains.
    pub async fn run(&self, deadline: Duration) -> Result<(), BusError> {
        if self.ran.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut hooks = {
            let mut guard = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        // Stable sort keeps registration order within a priority level.
        hooks.sort_by(|a, b| b.priority.cmp(&a.priority));

        let cutoff = Instant::now() + deadline;
        let mut first_error: Option<BusError> = None;

        for hook in &hooks {
            let remaining = cutoff.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(hook = %hook.name, "shutdown deadline exhausted; skipping remaining hooks");
                first_error.get_or_insert(BusError::OperationTimedOut);
                break;
            }
            info!(hook = %hook.name, priority = hook.priority, "running shutdown hook");
            match tokio::time::timeout(remaining, (hook.action)()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(hook = %hook.name, error = %e, "shutdown hook failed");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    error!(hook = %hook.name, "shutdown hook timed out");
                    first_error.get_or_insert(BusError::OperationTimedOut);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
