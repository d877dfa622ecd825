//! # Remote Objects
//!
//! `Alarms.sensor(name)` hands out a `Sensor` proxy. Its members call the
//! `Alarms` functions on the serving node with the sensor name leading the
//! arguments, and its `alerts` member is `on_alert` scoped to that sensor.

#[cfg(test)]
mod tests {
    use crate::fixtures::{broker, eventually, Alarms, Alert, Node, WAIT};
    use parking_lot::Mutex;
    use reco_rpc::{Handlers, Reply, RpcError};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::time::timeout;

    /// Serve `Alarms` on `node`, recording the arguments of every call.
    fn alarm_server(node: &Node) -> Arc<Mutex<Vec<(String, Vec<Value>)>>> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let status_calls = calls.clone();
        let silence_calls = calls.clone();
        node.manager
            .register::<Alarms>(
                Handlers::new()
                    .on_fn("status", move |_, args| {
                        status_calls.lock().push(("status".to_string(), args.clone()));
                        async move { Ok(json!(format!("{} ok", args[0].as_str().unwrap_or("?")))) }
                    })
                    .on_fn("silence", move |_, args| {
                        silence_calls.lock().push(("silence".to_string(), args));
                        async { Ok(json!(true)) }
                    }),
            )
            .unwrap();
        calls
    }

    #[tokio::test]
    async fn test_members_forward_with_uid_first() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let calls = alarm_server(&a);

        let sensor = b.manager.bind::<Alarms>("a").unwrap().object("sensor", "boiler").unwrap();

        let status: String = timeout(WAIT, sensor.call("status", ())).await.unwrap().unwrap();
        assert_eq!(status, "boiler ok");

        let silenced: bool = timeout(WAIT, sensor.call("silence", (30u32,))).await.unwrap().unwrap();
        assert!(silenced);

        assert_eq!(
            *calls.lock(),
            vec![
                ("status".to_string(), vec![json!("boiler")]),
                ("silence".to_string(), vec![json!("boiler"), json!(30)]),
            ]
        );
    }

    #[tokio::test]
    async fn test_object_getter_sends_nothing() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");
        let calls = alarm_server(&a);

        let alarms = b.manager.bind::<Alarms>("a").unwrap();
        let reply = alarms.invoke("sensor", vec![json!("boiler")]).unwrap();
        let Reply::Object(sensor) = reply else {
            panic!("expected an object proxy, got {reply:?}");
        };

        assert_eq!(sensor.uid_as::<String>().unwrap(), "boiler");
        assert_eq!(sensor.class().name(), "Sensor");
        assert_eq!(b.manager.exchanges().pending_count(), 0);
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_alerts_member_sees_only_its_sensor() {
        let broker = broker();
        let a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        let alarms = b.manager.bind::<Alarms>("a").unwrap();
        let boiler = alarms.object("sensor", "boiler").unwrap();
        let pump = alarms.object("sensor", "pump").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for sensor in [&boiler, &pump] {
            let sink = seen.clone();
            let name = sensor.uid_as::<String>().unwrap();
            sensor
                .event("alerts")
                .unwrap()
                .on_typed(move |alert: Alert| sink.lock().push((name.clone(), alert.msg)));
        }

        for (uid, msg) in [("boiler", "hot"), ("pump", "dry"), ("fan", "loud")] {
            let alert = Alert {
                uid: uid.to_string(),
                msg: msg.to_string(),
            };
            a.manager.invoke_remote_event::<Alarms, _>("on_alert", &alert).unwrap();
        }

        let delivered = seen.clone();
        eventually(move || delivered.lock().len() == 2).await;

        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("boiler".to_string(), "hot".to_string()),
                ("pump".to_string(), "dry".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_member_is_rejected_locally() {
        let broker = broker();
        let _a = Node::connect(&broker, "a");
        let b = Node::connect(&broker, "b");

        let sensor = b.manager.bind::<Alarms>("a").unwrap().object("sensor", "boiler").unwrap();
        let err = sensor.call_async::<Value, _>("reboot", ()).unwrap_err();
        assert!(matches!(err, RpcError::UnknownMethod { .. }), "{err}");
        assert_eq!(b.manager.exchanges().pending_count(), 0);
    }
}
