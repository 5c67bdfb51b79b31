//! Parser pipeline wired to a live bus.

#[cfg(test)]
mod tests {
    use indexer_bus::{ChainEvent, EventBus, EventType, LocalEventBus, SubscribeOptions};
    use indexer_pipeline::{
        EventSink, HandlerStage, ParsedEvent, Pipeline, PipelineError, PublishStage, StorageStage,
    };
    use indexer_types::entities::Log;
    use indexer_types::primitives::{Address, Hash};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;

    fn staking_event(name: &str) -> ParsedEvent {
        let mut log = Log::default();
        log.address = Address::repeat_byte(0x51);
        log.block_number = 321;
        log.tx_hash = Hash::repeat_byte(0x99);
        log.log_index = 7;
        ParsedEvent::from_log("Staking", name, Hash::repeat_byte(0x01), HashMap::new(), log)
    }

    struct RecordingSink {
        stored: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }
        async fn store(&self, event: &ParsedEvent) -> Result<(), PipelineError> {
            self.stored.lock().unwrap().push(event.event_name.clone());
            Ok(())
        }
    }

    /// The conventional three-stage pipeline: handlers, storage, publish;
    /// the published event lands on bus subscribers as a system-contract
    /// event.
    #[tokio::test]
    async fn full_pipeline_reaches_bus_subscribers() {
        let bus = Arc::new(LocalEventBus::new());
        bus.start().await.unwrap();
        let mut sub = bus
            .subscribe(
                "watcher",
                &[EventType::SystemContract],
                None,
                SubscribeOptions::default(),
            )
            .unwrap();

        let stored = Arc::new(Mutex::new(Vec::new()));
        let mut storage = StorageStage::new();
        storage.register(
            "StakeDeposited",
            Arc::new(RecordingSink {
                stored: Arc::clone(&stored),
            }),
        );

        let mut pipeline = Pipeline::new();
        pipeline.add_stage(Arc::new(HandlerStage::new()));
        pipeline.add_stage(Arc::new(storage));
        pipeline.add_stage(Arc::new(PublishStage::new(Some(
            Arc::clone(&bus) as Arc<dyn EventBus>
        ))));

        pipeline.process(&staking_event("StakeDeposited")).await.unwrap();

        assert_eq!(*stored.lock().unwrap(), vec!["StakeDeposited".to_string()]);

        let received = timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        let ChainEvent::SystemContract(event) = received else {
            panic!("wrong variant");
        };
        assert_eq!(event.event.as_str(), "StakeDeposited");
        assert_eq!(event.contract_address, Address::repeat_byte(0x51));
        assert_eq!(event.block.number, 321);
        assert_eq!(event.log_index, 7);
    }

    /// A failing sink stops the pipeline before the publish stage, and
    /// the error names the storage stage.
    #[tokio::test]
    async fn storage_failure_prevents_publish() {
        struct FailingSink;
        #[async_trait::async_trait]
        impl EventSink for FailingSink {
            fn name(&self) -> &str {
                "failing"
            }
            async fn store(&self, _event: &ParsedEvent) -> Result<(), PipelineError> {
                Err(PipelineError::Storage(
                    "failing".to_string(),
                    "disk full".to_string(),
                ))
            }
        }

        let bus = Arc::new(LocalEventBus::new());
        bus.start().await.unwrap();
        let mut sub = bus
            .subscribe(
                "watcher",
                &[EventType::SystemContract],
                None,
                SubscribeOptions::default(),
            )
            .unwrap();

        let mut storage = StorageStage::new();
        storage.register("StakeDeposited", Arc::new(FailingSink));

        let mut pipeline = Pipeline::new();
        pipeline.add_stage(Arc::new(storage));
        pipeline.add_stage(Arc::new(PublishStage::new(Some(
            Arc::clone(&bus) as Arc<dyn EventBus>
        ))));

        let err = pipeline
            .process(&staking_event("StakeDeposited"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("storage"));
        assert!(err.to_string().contains("disk full"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(sub.try_recv(), Ok(None)));
    }
}
