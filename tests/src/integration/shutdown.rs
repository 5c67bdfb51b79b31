//! Priority teardown behavior across components.

#[cfg(test)]
mod tests {
    use crate::fixtures::block_event;
    use indexer_bus::shutdown::{PRIORITY_EVENT_BUS, PRIORITY_STORAGE};
    use indexer_bus::{
        BusError, EventBus, EventType, LocalEventBus, ShutdownCoordinator, ShutdownHooks,
        SubscribeOptions,
    };
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Two hooks at priorities 100 and 10 run highest first, and a second
    /// shutdown call is a no-op.
    #[tokio::test]
    async fn hooks_ordered_and_idempotent() {
        let hooks = ShutdownHooks::new();
        let order: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        hooks.register("storage", PRIORITY_STORAGE, move || {
            let o = Arc::clone(&o);
            async move {
                o.lock().unwrap().push(PRIORITY_STORAGE);
                Ok(())
            }
        });
        let o = Arc::clone(&order);
        hooks.register("bus", PRIORITY_EVENT_BUS, move || {
            let o = Arc::clone(&o);
            async move {
                o.lock().unwrap().push(PRIORITY_EVENT_BUS);
                Ok(())
            }
        });

        hooks.run(Duration::from_secs(5)).await.unwrap();
        hooks.run(Duration::from_secs(5)).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![100, 10]);
    }

    /// The coordinator stops a live bus: subscribers see their channels
    /// close, publishes are refused afterwards.
    #[tokio::test]
    async fn coordinator_quiesces_the_bus() {
        let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new());
        bus.start().await.unwrap();

        let mut sub = bus
            .subscribe("s", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();
        assert!(bus.publish(block_event(1)));

        let coordinator = ShutdownCoordinator::new();
        coordinator.register_bus(Arc::clone(&bus));
        coordinator.shutdown(Duration::from_secs(5)).await.unwrap();

        // Drain whatever was in flight, then observe the close.
        loop {
            match timeout(Duration::from_secs(1), sub.recv())
                .await
                .expect("timeout")
            {
                Some(_) => continue,
                None => break,
            }
        }
        assert!(!bus.publish(block_event(2)));
        assert!(!bus.healthy());
    }

    /// A hook that never finishes exhausts the deadline; the run reports
    /// a timeout instead of hanging.
    #[tokio::test(start_paused = true)]
    async fn stuck_hook_bounded_by_deadline() {
        let hooks = ShutdownHooks::new();
        hooks.register("stuck", PRIORITY_EVENT_BUS, || async {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(())
        });

        let err = hooks.run(Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, BusError::OperationTimedOut));
    }
}
