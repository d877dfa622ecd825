//! # Call Routing
//!
//! The same call sent in each domain:
//!
//! | Domain  | Reaches                    | Response        |
//! |---------|----------------------------|-----------------|
//! | DIRECT  | the named node             | one             |
//! | AUX     | every node bound to topic  | first wins      |
//! | PUBLISH | every other node           | first wins      |
//!
//! Responses always travel DIRECT to the caller; later answers to the same
//! call are stale and dropped.

#[cfg(test)]
mod tests {
    use crate::fixtures::{broker, eventually, Node, Worker, WAIT};
    use parking_lot::Mutex;
    use reco_bus::{Channel, Domain, Message};
    use reco_rpc::{Handlers, RpcError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::timeout;

    /// Serve `Worker.foo` on `node`, answering `answer` and counting calls.
    fn worker(node: &Node, answer: u64, runs: &Arc<AtomicUsize>) {
        let runs = runs.clone();
        node.manager
            .register::<Worker>(Handlers::new().on_fn("foo", move |info, _| {
                runs.fetch_add(1, Ordering::SeqCst);
                assert!(!info.is_local());
                async move { Ok(json!(answer)) }
            }))
            .unwrap();
    }

    #[tokio::test]
    async fn test_direct_call_reaches_only_the_named_node() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let c = Node::connect(&broker, "c");
        let runs = Arc::new(AtomicUsize::new(0));
        worker(&a, 1, &runs);
        worker(&c, 3, &runs);

        let client = b.manager.bind::<Worker>("c").unwrap();
        let answer: u64 = timeout(WAIT, client.call("foo", ())).await.unwrap().unwrap();

        assert_eq!(answer, 3);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(client.channel().remote(), Some("c"));
    }

    #[tokio::test]
    async fn test_aux_call_fans_out_and_first_response_wins() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let c = Node::connect(&broker, "c");
        let runs = Arc::new(AtomicUsize::new(0));
        worker(&a, 1, &runs);
        worker(&c, 3, &runs);
        a.manager.endpoint().aux_channel_to("workers").unwrap();
        c.manager.endpoint().aux_channel_to("workers").unwrap();

        let client = b.manager.bind_aux::<Worker>("workers").unwrap();
        let answer: u64 = timeout(WAIT, client.call("foo", ())).await.unwrap().unwrap();
        assert!(answer == 1 || answer == 3, "unexpected answer {answer}");

        let served = runs.clone();
        eventually(move || served.load(Ordering::SeqCst) == 2).await;
        let exchanges = b.manager.exchanges().clone();
        eventually(move || exchanges.stats().stale.load(Ordering::Relaxed) == 1).await;
        assert_eq!(b.manager.exchanges().stats().completed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_aux_responses_are_sent_direct() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let runs = Arc::new(AtomicUsize::new(0));
        worker(&a, 1, &runs);
        a.manager.endpoint().aux_channel_to("workers").unwrap();

        let domains = Arc::new(Mutex::new(Vec::new()));
        let sink = domains.clone();
        b.provider
            .listen_all()
            .on(move |message: &Message| sink.lock().extend(message.domain()));

        let client = b.manager.bind_aux::<Worker>("workers").unwrap();
        let answer: u64 = timeout(WAIT, client.call("foo", ())).await.unwrap().unwrap();

        assert_eq!(answer, 1);
        assert_eq!(*domains.lock(), vec![Domain::Direct]);
    }

    #[tokio::test]
    async fn test_broadcast_call_reaches_every_other_node() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let c = Node::connect(&broker, "c");
        let runs = Arc::new(AtomicUsize::new(0));
        worker(&a, 1, &runs);
        worker(&b, 2, &runs);
        worker(&c, 3, &runs);

        let client = b.manager.bind_broadcast::<Worker>().unwrap();
        let answer: u64 = timeout(WAIT, client.call("foo", ())).await.unwrap().unwrap();
        assert!(answer == 1 || answer == 3, "caller answered itself: {answer}");

        let served = runs.clone();
        eventually(move || served.load(Ordering::SeqCst) == 2).await;
        let exchanges = b.manager.exchanges().clone();
        eventually(move || exchanges.stats().stale.load(Ordering::Relaxed) == 1).await;
    }

    #[tokio::test]
    async fn test_node_named_pub_is_called_direct() {
        let broker = broker();
        let named_pub = Node::connect(&broker, "pub");
        let b = Node::connect(&broker, "b");
        let c = Node::connect(&broker, "c");
        let runs = Arc::new(AtomicUsize::new(0));
        worker(&named_pub, 1, &runs);
        worker(&c, 3, &runs);

        let client = b.manager.bind::<Worker>("pub").unwrap();
        let answer: u64 = timeout(WAIT, client.call("foo", ())).await.unwrap().unwrap();

        assert_eq!(answer, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.manager.exchanges().stats().completed.load(Ordering::Relaxed), 1);
        assert_eq!(b.manager.exchanges().stats().stale.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_call_to_unknown_node_fails_without_pending_exchange() {
        let broker = broker();
        let b = Node::connect(&broker, "b");

        let client = b.manager.bind::<Worker>("nobody").unwrap();
        let err = client.call_async::<u64, _>("foo", ()).unwrap_err();

        assert!(matches!(err, RpcError::Bus(_)), "{err}");
        assert_eq!(b.manager.exchanges().pending_count(), 0);
        assert_eq!(b.manager.exchanges().stats().cancelled.load(Ordering::Relaxed), 1);
    }
}
