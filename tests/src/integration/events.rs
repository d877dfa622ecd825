//! # Remote Events
//!
//! Peer `a` raises `Alarms.on_alert`, peer `b` listens:
//!
//! 1. General subscribers see every alert
//! 2. The child scoped to a UID sees only alerts owned by that UID
//! 3. The raising node does not hear its own broadcast

#[cfg(test)]
mod tests {
    use crate::fixtures::{broker, eventually, Alarms, Alert, Node, WAIT};
    use futures::StreamExt;
    use parking_lot::Mutex;
    use reco_rpc::{RemoteEvent, RpcError};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::time::timeout;

    fn alert(uid: &str, msg: &str) -> Alert {
        Alert {
            uid: uid.to_string(),
            msg: msg.to_string(),
        }
    }

    fn record(event: &RemoteEvent) -> Arc<Mutex<Vec<Alert>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        event.on_typed(move |alert: Alert| sink.lock().push(alert));
        seen
    }

    #[tokio::test]
    async fn test_alerts_reach_general_and_scoped_subscribers() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        let alarms = b.manager.bind::<Alarms>("a").unwrap();
        let on_alert = alarms.event("on_alert").unwrap();
        let all = record(&on_alert);
        let only_x = record(&on_alert.by_uid(&json!("x")));

        a.manager.invoke_remote_event::<Alarms, _>("on_alert", &alert("x", "hot")).unwrap();
        a.manager.invoke_remote_event::<Alarms, _>("on_alert", &alert("y", "cold")).unwrap();

        let seen = all.clone();
        eventually(move || seen.lock().len() == 2).await;
        assert_eq!(*all.lock(), vec![alert("x", "hot"), alert("y", "cold")]);
        assert_eq!(*only_x.lock(), vec![alert("x", "hot")]);
    }

    #[tokio::test]
    async fn test_payload_without_owner_skips_scoped_children() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        let on_alert = b.manager.bind::<Alarms>("a").unwrap().event("on_alert").unwrap();
        let scoped = Arc::new(Mutex::new(Vec::<Value>::new()));
        let sink = scoped.clone();
        on_alert.by_uid(&json!("x")).on(move |v: &Value| sink.lock().push(v.clone()));

        let next = on_alert.next();
        a.manager
            .invoke_remote_event::<Alarms, _>("on_alert", &json!({"uid": "x", "msg": "untyped"}))
            .unwrap();

        let payload = timeout(WAIT, next).await.unwrap().unwrap();
        assert_eq!(payload["msg"], "untyped");
        assert!(scoped.lock().is_empty());
    }

    #[tokio::test]
    async fn test_raising_node_does_not_hear_itself() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        let own = record(&a.manager.bind::<Alarms>("b").unwrap().event("on_alert").unwrap());
        let mut stream = b
            .manager
            .bind::<Alarms>("a")
            .unwrap()
            .event("on_alert")
            .unwrap()
            .subscribe();

        a.manager.invoke_remote_event::<Alarms, _>("on_alert", &alert("x", "hot")).unwrap();

        let received = timeout(WAIT, stream.next()).await.unwrap().unwrap();
        assert_eq!(received["uid"], "x");
        assert!(own.lock().is_empty());
    }

    #[tokio::test]
    async fn test_node_without_the_interface_ignores_events() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let c = Node::connect(&broker, "c");

        let on_alert = b.manager.bind::<Alarms>("a").unwrap().event("on_alert").unwrap();
        let next = on_alert.next();
        a.manager.invoke_remote_event::<Alarms, _>("on_alert", &alert("x", "hot")).unwrap();

        timeout(WAIT, next).await.unwrap().unwrap();
        assert!(c.manager.event("Alarms.on_alert()").is_none());
    }

    #[tokio::test]
    async fn test_raising_a_function_is_rejected() {
        let broker = broker();
        let a = Node::connect(&broker, "a");

        let err = a
            .manager
            .invoke_remote_event::<Alarms, _>("status", &json!("s1"))
            .unwrap_err();
        assert!(matches!(err, RpcError::NotEvent { .. }), "{err}");
    }
}
