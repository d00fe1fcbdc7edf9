mod common;

use beacon_api::broadcast::broadcaster::JsonMap;
use beacon_api::broadcast::channel::Channel;
use beacon_api::broadcast::envelope::{Broadcastable, Uniqueness};
use beacon_api::broadcast::store::EventStore;

struct StockSync {
    warehouse: String,
}

impl Broadcastable for StockSync {
    fn event_name(&self) -> String {
        "StockSync".to_string()
    }

    fn channels(&self) -> Vec<Channel> {
        vec![Channel::private("orders.1")]
    }

    fn to_broadcast_payload(&self) -> JsonMap {
        let mut payload = JsonMap::new();
        payload.insert("warehouse".to_string(), self.warehouse.clone().into());
        payload
    }

    fn uniqueness(&self) -> Option<Uniqueness> {
        Some(Uniqueness::keyed("stock-sync", 60))
    }
}

struct OrderShipped {
    order_id: u64,
}

impl Broadcastable for OrderShipped {
    fn event_name(&self) -> String {
        "OrderShipped".to_string()
    }

    fn channels(&self) -> Vec<Channel> {
        vec![Channel::private(format!("orders.{}", self.order_id))]
    }

    fn to_broadcast_payload(&self) -> JsonMap {
        let mut payload = JsonMap::new();
        payload.insert("orderId".to_string(), self.order_id.into());
        payload
    }
}

#[tokio::test]
async fn duplicate_unique_broadcasts_collapse_to_one_delivery() {
    let ctx = common::test_state().await;

    let event = StockSync {
        warehouse: "eu-1".to_string(),
    };
    ctx.state.manager.queue(&event).await.unwrap();
    // Second enqueue inside the uniqueness window: silently dropped.
    ctx.state.manager.queue(&event).await.unwrap();

    common::wait_for_events(&ctx, &["private-orders.1"], 1).await;
    common::settle().await;

    let events = ctx
        .store
        .since(&["private-orders.1".to_string()], None)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn unique_lock_reopens_after_delivery_completes() {
    let ctx = common::test_state().await;

    let event = StockSync {
        warehouse: "eu-1".to_string(),
    };
    ctx.state.manager.queue(&event).await.unwrap();
    common::wait_for_events(&ctx, &["private-orders.1"], 1).await;
    common::settle().await;

    // The worker released the lock after handling, so a new broadcast flows.
    ctx.state.manager.queue(&event).await.unwrap();
    common::wait_for_events(&ctx, &["private-orders.1"], 2).await;
}

#[tokio::test]
async fn queued_envelope_is_a_frozen_snapshot() {
    let ctx = common::test_state().await;

    let mut event = OrderShipped { order_id: 7 };
    ctx.state.manager.queue(&event).await.unwrap();

    // Mutating the event after queue() must not alter the queued payload.
    event.order_id = 9;

    common::wait_for_events(&ctx, &["private-orders.7"], 1).await;
    let events = ctx
        .store
        .since(&["private-orders.7".to_string()], None)
        .await
        .unwrap();
    assert_eq!(events[0].payload["orderId"], serde_json::json!(7));
}

#[tokio::test]
async fn send_now_delivers_inline() {
    let ctx = common::test_state().await;

    ctx.state
        .manager
        .on(Channel::public("news"))
        .as_event("Published")
        .with_field("headline", "hello")
        .send_now()
        .await
        .unwrap();

    // No waiting on the worker: the record is already there.
    let events = ctx.store.since(&["news".to_string()], None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "Published");
}

#[tokio::test]
async fn scoped_broadcast_fires_on_drop() {
    let ctx = common::test_state().await;

    {
        let event = OrderShipped { order_id: 3 };
        let _pending = ctx.state.manager.event(&event).to_others("sock_abc");
        // Dropped here without an explicit send.
    }

    common::wait_for_events(&ctx, &["private-orders.3"], 1).await;
    let events = ctx
        .store
        .since(&["private-orders.3".to_string()], None)
        .await
        .unwrap();
    assert_eq!(events[0].socket.as_deref(), Some("sock_abc"));
}

#[tokio::test]
async fn explicit_send_fires_exactly_once() {
    let ctx = common::test_state().await;

    let event = OrderShipped { order_id: 5 };
    ctx.state.manager.event(&event).send().await.unwrap();

    common::wait_for_events(&ctx, &["private-orders.5"], 1).await;
    common::settle().await;

    let events = ctx
        .store
        .since(&["private-orders.5".to_string()], None)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn unknown_connection_fails_fast_at_queue_time() {
    let ctx = common::test_state().await;

    let err = ctx
        .state
        .manager
        .on(Channel::public("news"))
        .via("nope")
        .send_now()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unknown broadcast connection"));
}
