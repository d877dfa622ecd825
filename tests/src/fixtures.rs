//! Shared fixtures: service interfaces, node setup and tracing.

use reco_bus::{BusConfig, BusProvider, MemoryBroker};
use reco_rpc::{
    Describe, EventPayload, InterfaceDescriptor, MethodDescriptor, ObjectDescriptor, RemoteApi, RemoteObjectType,
    RpcConfig, RpcManager, TypeDescriptor,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Upper bound for anything that waits on delivery.
pub const WAIT: Duration = Duration::from_secs(2);

/// Install a fmt subscriber filtered by `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// One connected node.
pub struct Node {
    pub provider: Arc<BusProvider>,
    pub manager: Arc<RpcManager>,
}

impl Node {
    /// Connect `name` with default bus and RPC configuration.
    pub fn connect(broker: &Arc<MemoryBroker>, name: &str) -> Self {
        Self::connect_with(broker, BusConfig::named(name), RpcConfig::default())
    }

    /// Connect with explicit configuration.
    pub fn connect_with(broker: &Arc<MemoryBroker>, bus: BusConfig, rpc: RpcConfig) -> Self {
        init_tracing();
        let provider = broker.connect(&bus).unwrap();
        let manager = RpcManager::with_config(provider.clone(), rpc).unwrap();
        Self { provider, manager }
    }
}

/// Poll `condition` until it holds, failing after [`WAIT`].
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    let polled = tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached within {WAIT:?}");
}

/// A broker on the default exchange.
pub fn broker() -> Arc<MemoryBroker> {
    MemoryBroker::new("reco")
}

// =============================================================================
// INTERFACES
// =============================================================================

/// `log(string)` and its async twin.
pub struct Logger;

impl RemoteApi for Logger {
    fn descriptor() -> InterfaceDescriptor {
        InterfaceDescriptor::new("Logger")
            .method(MethodDescriptor::new("log").param::<String>())
            .method(MethodDescriptor::new("log_async").param::<String>().returns_future::<()>())
            .method(MethodDescriptor::new("count").returns::<u64>())
            .method(MethodDescriptor::new("fail").param::<String>())
    }
}

/// `foo()` blocks on the server until released.
pub struct Worker;

impl RemoteApi for Worker {
    fn descriptor() -> InterfaceDescriptor {
        InterfaceDescriptor::new("Worker")
            .method(MethodDescriptor::new("foo").returns::<u64>())
            .method(MethodDescriptor::new("foo_async").returns_future::<u64>())
    }
}

/// Functions with and without group restrictions.
pub struct Admin;

impl RemoteApi for Admin {
    fn descriptor() -> InterfaceDescriptor {
        InterfaceDescriptor::new("Admin")
            .method(MethodDescriptor::new("shutdown").returns::<bool>().allow(["admin"]))
            .method(MethodDescriptor::new("ping").returns::<String>().allow(["all"]))
    }
}

/// An interface no server registers.
pub struct Ghost;

impl RemoteApi for Ghost {
    fn descriptor() -> InterfaceDescriptor {
        InterfaceDescriptor::new("Ghost").method(MethodDescriptor::new("boo").returns::<Value>())
    }
}

/// Alert raised for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub uid: String,
    pub msg: String,
}

impl EventPayload for Alert {
    fn owner_uid(&self) -> Option<Value> {
        Some(Value::String(self.uid.clone()))
    }
}

impl Describe for Alert {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::named("Alert")
    }
}

/// Sensors, their alerts and their per-sensor operations.
pub struct Alarms;

impl RemoteApi for Alarms {
    fn descriptor() -> InterfaceDescriptor {
        InterfaceDescriptor::new("Alarms")
            .method(MethodDescriptor::new("on_alert").returns_event::<Alert>())
            .method(MethodDescriptor::new("status").param::<String>().returns::<String>())
            .method(
                MethodDescriptor::new("silence")
                    .param::<String>()
                    .param::<u32>()
                    .returns::<bool>(),
            )
            .method(MethodDescriptor::new("sensor").param::<String>().returns_object::<Sensor>())
    }
}

/// Remote view of one sensor, addressed by its name.
pub struct Sensor;

impl RemoteObjectType for Sensor {
    fn descriptor() -> ObjectDescriptor {
        ObjectDescriptor::new("Sensor")
            .uid::<String>()
            .member("status")
            .member("silence")
            .member_for("alerts", "on_alert")
    }
}
