//! End-to-end subscriber delivery scenarios over the public bus API.

#[cfg(test)]
mod tests {
    use crate::fixtures::{addr_a1, addr_a2, block_event, transfer};
    use indexer_bus::events::BlockEvent;
    use indexer_bus::redis_bus::RedisEventBus;
    use indexer_bus::{
        encode_event, ChainEvent, EventBus, EventFilter, EventType, LocalEventBus, RedisConfig,
        RemoteDelivery, SubscribeOptions, Subscription,
    };
    use indexer_types::primitives::{Hash, U256};
    use serde_json::value::RawValue;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv_one(sub: &mut Subscription) -> ChainEvent {
        timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    /// Single subscriber with a type filter sees only its type.
    #[tokio::test]
    async fn scenario_single_subscriber_type_filter() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let mut sub = bus
            .subscribe("s", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();

        assert!(bus.publish(block_event(100)));
        assert!(bus.publish(transfer(addr_a1(), addr_a2(), 50, 100)));
        settle().await;

        let received = recv_one(&mut sub).await;
        assert_eq!(received.event_type(), EventType::Block);
        assert_eq!(received.block_number(), Some(100));
        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    /// Value-range plus block-range plus address-set filtering: only the
    /// transactions inside every inclusive bound arrive.
    #[tokio::test]
    async fn scenario_value_range_filter() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let filter = EventFilter::new()
            .with_value_range(U256::from(1_000u64), U256::from(5_000u64))
            .with_block_range(50, 200)
            .with_from_addresses(vec![addr_a1()])
            .with_to_addresses(vec![addr_a2()]);

        let mut sub = bus
            .subscribe(
                "ranges",
                &[EventType::Transaction],
                Some(filter),
                SubscribeOptions::default(),
            )
            .unwrap();

        // In bounds; below min value; past block range; at both upper
        // bounds (inclusive).
        assert!(bus.publish(transfer(addr_a1(), addr_a2(), 2_000, 150)));
        assert!(bus.publish(transfer(addr_a1(), addr_a2(), 500, 150)));
        assert!(bus.publish(transfer(addr_a1(), addr_a2(), 2_000, 250)));
        assert!(bus.publish(transfer(addr_a1(), addr_a2(), 5_000, 200)));
        settle().await;

        let first = recv_one(&mut sub).await;
        let ChainEvent::Transaction(first) = first else {
            panic!("wrong variant");
        };
        assert_eq!(first.value, "2000");
        assert_eq!(first.block_number, 150);

        let second = recv_one(&mut sub).await;
        let ChainEvent::Transaction(second) = second else {
            panic!("wrong variant");
        };
        assert_eq!(second.value, "5000");
        assert_eq!(second.block_number, 200);

        assert!(matches!(sub.try_recv(), Ok(None)));
        assert_eq!(bus.stats().filtered_events, 2);
    }

    /// A slow subscriber with a small channel loses the overflow, with
    /// exact accounting, and never stalls the publisher.
    #[tokio::test]
    async fn scenario_slow_subscriber() {
        let bus = LocalEventBus::new();
        bus.start().await.unwrap();

        let _sub = bus
            .subscribe(
                "slow",
                &[EventType::Block],
                None,
                SubscribeOptions {
                    channel_size: 10,
                    replay_last: 0,
                },
            )
            .unwrap();

        for n in 1..=100 {
            assert!(bus.publish(block_event(n)));
        }
        settle().await;

        let stats = bus.stats();
        assert_eq!(stats.total_events, 100);

        let info = bus.subscriber_info("slow").unwrap();
        assert_eq!(info.events_received, 10);
        assert_eq!(info.events_dropped, 90);
    }

    /// Replay hands the newest matching history to a late subscriber in
    /// chronological order, before any live event.
    #[tokio::test]
    async fn scenario_replay_then_live() {
        let bus = LocalEventBus::with_capacity(1000, 100);
        bus.start().await.unwrap();

        for n in 1..=20 {
            assert!(bus.publish(block_event(n)));
        }
        settle().await;

        let mut sub = bus
            .subscribe(
                "late",
                &[EventType::Block],
                None,
                SubscribeOptions {
                    channel_size: 0,
                    replay_last: 5,
                },
            )
            .unwrap();

        assert!(bus.publish(block_event(21)));

        for expected in [16, 17, 18, 19, 20, 21] {
            let event = recv_one(&mut sub).await;
            assert_eq!(event.block_number(), Some(expected));
        }
    }

    /// A publish looped back by the broker is dropped by the node that
    /// sent it; local subscribers see the event exactly once.
    #[tokio::test]
    async fn scenario_echo_suppression() {
        let bus = RedisEventBus::new(LocalEventBus::new(), RedisConfig::default(), "node-a");
        bus.start().await.unwrap();

        let mut sub = bus
            .subscribe("s", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();

        // The local publish delivers once.
        let event: ChainEvent = BlockEvent::new(42, Hash::repeat_byte(0x42), 1).into();
        assert!(bus.publish(event.clone()));
        settle().await;
        assert_eq!(recv_one(&mut sub).await.block_number(), Some(42));

        // The broker loops the same envelope back to us.
        let envelope = encode_event(&event).unwrap();
        let looped = serde_json::json!({
            "node_id": "node-a",
            "data": RawValue::from_string(String::from_utf8(envelope).unwrap()).unwrap(),
        });
        let outcome = bus
            .handle_remote_payload(&serde_json::to_vec(&looped).unwrap())
            .unwrap();

        assert_eq!(outcome, RemoteDelivery::Echo);
        assert_eq!(bus.remote_stats().echoes_skipped, 1);
        settle().await;
        // No second delivery.
        assert!(matches!(sub.try_recv(), Ok(None)));
        assert_eq!(bus.stats().total_events, 1);
    }

    /// The same envelope from another node is delivered exactly once.
    #[tokio::test]
    async fn scenario_cross_node_delivery() {
        let bus = RedisEventBus::new(LocalEventBus::new(), RedisConfig::default(), "node-a");
        bus.start().await.unwrap();

        let mut sub = bus
            .subscribe("s", &[EventType::Block], None, SubscribeOptions::default())
            .unwrap();

        let event: ChainEvent = BlockEvent::new(7, Hash::repeat_byte(0x07), 0).into();
        let envelope = encode_event(&event).unwrap();
        let payload = serde_json::json!({
            "node_id": "node-b",
            "data": RawValue::from_string(String::from_utf8(envelope).unwrap()).unwrap(),
        });

        let outcome = bus
            .handle_remote_payload(&serde_json::to_vec(&payload).unwrap())
            .unwrap();
        assert_eq!(outcome, RemoteDelivery::Delivered);
        assert_eq!(recv_one(&mut sub).await.block_number(), Some(7));
    }
}
