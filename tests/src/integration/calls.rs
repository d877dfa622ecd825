//! # Call and Response
//!
//! Peer `a` serves, peer `b` calls over DIRECT channels:
//!
//! 1. **Void call**: `log("hi")` runs the handler once and resolves with no value
//! 2. **Async twin**: `foo_async()` returns an unresolved reply immediately
//! 3. **Failures**: unknown functions, handler errors and denials come back as remote errors
//! 4. **Codecs**: MessagePack nodes interoperate like JSON nodes

#[cfg(test)]
mod tests {
    use crate::fixtures::{broker, eventually, Admin, Ghost, Logger, Node, Worker, WAIT};
    use parking_lot::Mutex;
    use reco_bus::{BusConfig, Channel, CodecKind, NamedPayload};
    use reco_rpc::{CallId, CallRequest, CallResponse, Handlers, RpcConfig, RpcError, StaticSecurityManager};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    /// Serve `Logger` on `a`, recording every logged line.
    fn logging_server(node: &Node) -> Arc<Mutex<Vec<String>>> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let count = lines.clone();
        node.manager
            .register::<Logger>(
                Handlers::new()
                    .on_fn("log", move |_, args| {
                        let sink = sink.clone();
                        async move {
                            let line: String = serde_json::from_value(args[0].clone())?;
                            sink.lock().push(line);
                            Ok(Value::Null)
                        }
                    })
                    .on_fn("count", move |_, _| {
                        let count = count.lock().len();
                        async move { Ok(json!(count)) }
                    })
                    .on_fn("fail", |_, args| async move {
                        Err(anyhow::anyhow!("{} is unreachable", args[0]).context("lookup failed"))
                    }),
            )
            .unwrap();
        lines
    }

    // =============================================================================
    // VOID AND VALUE CALLS
    // =============================================================================

    #[tokio::test]
    async fn test_log_hi_runs_handler_once_and_resolves_void() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let lines = logging_server(&a);

        let logger = b.manager.bind::<Logger>("a").unwrap();
        timeout(WAIT, logger.call::<(), _>("log", ("hi",))).await.unwrap().unwrap();

        assert_eq!(*lines.lock(), vec!["hi".to_string()]);
        assert_eq!(b.manager.exchanges().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_value_call_resolves_with_handler_result() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        logging_server(&a);

        let logger = b.manager.bind::<Logger>("a").unwrap();
        timeout(WAIT, logger.call::<(), _>("log", ("one",))).await.unwrap().unwrap();
        timeout(WAIT, logger.call::<(), _>("log", ("two",))).await.unwrap().unwrap();

        let count: u64 = timeout(WAIT, logger.call("count", ())).await.unwrap().unwrap();
        assert_eq!(count, 2);
        assert_eq!(b.manager.exchanges().stats().completed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_log_async_shares_the_sync_function() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let lines = logging_server(&a);

        let logger = b.manager.bind::<Logger>("a").unwrap();
        let reply = logger.call_async::<(), _>("log_async", ("later",)).unwrap();
        timeout(WAIT, reply).await.unwrap().unwrap();

        assert_eq!(*lines.lock(), vec!["later".to_string()]);
    }

    #[tokio::test]
    async fn test_void_call_discards_response() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let lines = logging_server(&a);

        let logger = b.manager.bind::<Logger>("a").unwrap();
        logger.call_void("log", ("fire and forget",)).unwrap();

        timeout(WAIT, logger.call::<(), _>("log", ("after",))).await.unwrap().unwrap();
        let exchanges = b.manager.exchanges().clone();
        eventually(move || exchanges.stats().discarded.load(Ordering::Relaxed) == 1).await;
        assert_eq!(lines.lock().len(), 2);
        assert_eq!(b.manager.exchanges().pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_call_from_plain_thread() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        logging_server(&a);

        let logger = b.manager.bind::<Logger>("a").unwrap();
        let count = timeout(
            WAIT,
            tokio::task::spawn_blocking(move || logger.call_blocking::<u64, _>("count", ())),
        )
        .await
        .unwrap()
        .unwrap()
        .unwrap();
        assert_eq!(count, 0);
    }

    // =============================================================================
    // ASYNC TWIN
    // =============================================================================

    #[tokio::test]
    async fn test_foo_async_returns_unresolved_future() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        let gate = Arc::new(Notify::new());
        let release = gate.clone();
        a.manager
            .register::<Worker>(Handlers::new().on_fn("foo", move |_, _| {
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    Ok(json!(42))
                }
            }))
            .unwrap();

        let worker = b.manager.bind::<Worker>("a").unwrap();
        let mut reply = worker.call_async::<u64, _>("foo_async", ()).unwrap();

        // unresolved until the server is released
        assert!(timeout(std::time::Duration::from_millis(50), &mut reply).await.is_err());
        assert!(b.manager.exchanges().is_pending(reply.call_id()));

        release.notify_one();
        assert_eq!(timeout(WAIT, reply).await.unwrap().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_foo_and_foo_async_hit_the_same_handler() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        a.manager
            .register::<Worker>(Handlers::new().on_fn("foo", move |_, _| {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok(json!(n)) }
            }))
            .unwrap();

        let worker = b.manager.bind::<Worker>("a").unwrap();
        let first: u64 = timeout(WAIT, worker.call("foo", ())).await.unwrap().unwrap();
        let second: u64 = timeout(WAIT, worker.call("foo_async", ())).await.unwrap().unwrap();
        assert_eq!((first, second), (0, 1));
    }

    // =============================================================================
    // FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_unknown_function_rejects_caller() {
        let broker = broker();
        let _a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        let ghost = b.manager.bind::<Ghost>("a").unwrap();
        let err = timeout(WAIT, ghost.call::<Value, _>("boo", ())).await.unwrap().unwrap_err();
        assert!(err.remote().is_some_and(|e| e.is_unknown_function()), "{err}");
    }

    #[tokio::test]
    async fn test_rejections_travel_as_bare_strings() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        a.manager
            .register::<Admin>(Handlers::new().on_fn("shutdown", |_, _| async { Ok(json!(true)) }))
            .unwrap();

        // a bare bus node, reading responses off the wire
        let raw = broker.connect(&BusConfig::named("raw")).unwrap();
        let to_a = raw.channel("a").unwrap();

        for (id, name, expected) in [
            (1, "Nope.x()", "unknown function"),
            (2, "Admin.shutdown()", "Permission denied"),
        ] {
            let next = raw.listen("rpcres").next();
            let request = CallRequest {
                call_id: CallId::from_raw(id),
                name: name.to_string(),
                args: vec![],
            };
            to_a.send(request.to_message().unwrap()).unwrap();

            let message = timeout(WAIT, next).await.unwrap().unwrap();
            assert_eq!(*message.payload(), json!({"callId": id, "success": false, "value": expected}));
            let response: CallResponse = message.decode().unwrap();
            assert!(!response.success);
        }
    }

    #[tokio::test]
    async fn test_handler_error_travels_with_causes() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        logging_server(&a);

        let logger = b.manager.bind::<Logger>("a").unwrap();
        let err = timeout(WAIT, logger.call::<(), _>("fail", ("db",))).await.unwrap().unwrap_err();

        let RpcError::Remote(remote) = err else {
            panic!("expected a remote failure, got {err:?}");
        };
        assert_eq!(remote.message, "lookup failed");
        assert_eq!(remote.causes, vec!["\"db\" is unreachable".to_string()]);
    }

    #[tokio::test]
    async fn test_denied_call_never_runs_handler() {
        let broker = broker();
        let a = Node::connect_with(&broker, BusConfig::named("a"), RpcConfig::closed_by_default());
        let guest = Node::connect(&broker, "guest");
        let ops = Node::connect(&broker, "ops");

        let runs = Arc::new(AtomicUsize::new(0));
        let seen = runs.clone();
        a.manager
            .register::<Admin>(
                Handlers::new()
                    .on_fn("shutdown", move |_, _| {
                        seen.fetch_add(1, Ordering::SeqCst);
                        async { Ok(json!(true)) }
                    })
                    .on_fn("ping", |_, _| async { Ok(json!("pong")) }),
            )
            .unwrap();
        a.manager.set_security_manager(Some(Arc::new(
            StaticSecurityManager::new().with_groups("ops", ["admin"]),
        )));

        let denied = guest.manager.bind::<Admin>("a").unwrap();
        let err = timeout(WAIT, denied.call::<bool, _>("shutdown", ())).await.unwrap().unwrap_err();
        assert!(err.remote().is_some_and(|e| e.is_permission_denied()), "{err}");
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let allowed = ops.manager.bind::<Admin>("a").unwrap();
        assert!(timeout(WAIT, allowed.call::<bool, _>("shutdown", ())).await.unwrap().unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wildcard_group_ignores_security_manager() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        a.manager
            .register::<Admin>(Handlers::new().on_fn("ping", |_, _| async { Ok(json!("pong")) }))
            .unwrap();
        a.manager
            .set_security_manager(Some(Arc::new(StaticSecurityManager::new().with_fallback(false))));

        let admin = b.manager.bind::<Admin>("a").unwrap();
        let pong: String = timeout(WAIT, admin.call("ping", ())).await.unwrap().unwrap();
        assert_eq!(pong, "pong");
    }

    #[tokio::test]
    async fn test_compiled_function_without_handler_fails() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        a.manager.compile::<Ghost>().unwrap();

        let ghost = b.manager.bind::<Ghost>("a").unwrap();
        let err = timeout(WAIT, ghost.call::<Value, _>("boo", ())).await.unwrap().unwrap_err();
        assert!(matches!(err, RpcError::Remote(ref e) if !e.is_unknown_function()), "{err}");
    }

    // =============================================================================
    // CODECS
    // =============================================================================

    #[tokio::test]
    async fn test_msgpack_nodes_interoperate() {
        let broker = broker();
        let msgpack = |name: &str| BusConfig {
            codec: CodecKind::MsgPack,
            ..BusConfig::named(name)
        };
        let a = Node::connect_with(&broker, msgpack("a"), RpcConfig::default());
        let b = Node::connect_with(&broker, msgpack("b"), RpcConfig::default());
        let lines = logging_server(&a);

        let logger = b.manager.bind::<Logger>("a").unwrap();
        timeout(WAIT, logger.call::<(), _>("log", ("packed",))).await.unwrap().unwrap();
        let count: u64 = timeout(WAIT, logger.call("count", ())).await.unwrap().unwrap();

        assert_eq!(count, 1);
        assert_eq!(*lines.lock(), vec!["packed".to_string()]);
    }
}
