//! # RPC Manager
//!
//! One manager per node. It owns the [`Registry`] of compiled interfaces,
//! functions and events, the table of outstanding calls, and the inbound
//! dispatch of the three protocol messages on its endpoint.
//!
//! ```text
//!   caller                                   callee
//!   ──────                                   ──────
//!   RemoteBinding::call ─┐
//!                        │ rpcivk {callId, name, args}
//!   ExchangeTable ◀──────┼──────────────────▶ authorize ─▶ handler
//!        │               │ rpcres {callId, success, value}     │
//!        └─ ReplyFuture ◀┴──────────────────────────────────────┘
//! ```

use crate::binding::RemoteBinding;
use crate::compiler::{CompileHook, Registry};
use crate::domain::compiled::CompiledInterface;
use crate::domain::config::RpcConfig;
use crate::domain::descriptor::RemoteApi;
use crate::domain::error::{RemoteError, RpcError, RpcResult};
use crate::domain::event::{EventPayload, RemoteEvent};
use crate::domain::exchange::{ExchangeTable, ReplyFuture};
use crate::domain::function::{handler_fn, CallInfo, FunctionHandler, RemoteFunction};
use crate::domain::security::InboundSecurityManager;
use crate::ipc::dispatch;
use crate::ipc::wire::{CallRequest, CallResponse, EventCall};
use parking_lot::{Mutex, RwLock};
use reco_bus::{Channel, ChannelListener, Endpoint, ListenerId, Message, NamedPayload};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Local handlers to bind when registering an interface.
///
/// Keys are method names or signatures. A bare name binds every overload
/// of that name; a signature such as `say(string,i32)` binds one.
#[derive(Default)]
pub struct Handlers {
    entries: Vec<(String, Arc<dyn FunctionHandler>)>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `method`.
    #[must_use]
    pub fn on(mut self, method: impl Into<String>, handler: Arc<dyn FunctionHandler>) -> Self {
        self.entries.push((method.into(), handler));
        self
    }

    /// Bind an async closure to `method`.
    #[must_use]
    pub fn on_fn<F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallInfo, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.on(method, handler_fn(f))
    }
}

/// Compiles interfaces, binds handlers, and serves and issues calls over one endpoint.
pub struct RpcManager {
    endpoint: Arc<dyn Endpoint>,
    broadcast: Arc<dyn Channel>,
    config: RpcConfig,
    registry: Registry,
    exchanges: Arc<ExchangeTable>,
    security: RwLock<Option<Arc<dyn InboundSecurityManager>>>,
    pub(crate) permits: Arc<Semaphore>,
    subscriptions: Mutex<Vec<(Arc<ChannelListener>, ListenerId)>>,
}

impl RpcManager {
    /// Create a manager with the default configuration and start serving.
    pub fn new<E: Endpoint + 'static>(endpoint: Arc<E>) -> Arc<Self> {
        let manager = Arc::new(Self::build(endpoint, RpcConfig::default()));
        manager.start();
        manager
    }

    /// Create a manager with `config` and start serving.
    pub fn with_config<E: Endpoint + 'static>(endpoint: Arc<E>, config: RpcConfig) -> RpcResult<Arc<Self>> {
        config.validate()?;
        let manager = Arc::new(Self::build(endpoint, config));
        manager.start();
        Ok(manager)
    }

    fn build<E: Endpoint + 'static>(endpoint: Arc<E>, config: RpcConfig) -> Self {
        Self {
            broadcast: endpoint.clone(),
            endpoint,
            registry: Registry::new(config.default_allowed_groups.clone()),
            exchanges: ExchangeTable::new(),
            security: RwLock::new(None),
            permits: Arc::new(Semaphore::new(config.max_concurrent_calls)),
            subscriptions: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Listen for calls, responses and events on the endpoint. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.is_empty() {
            return;
        }

        let handlers: [(&str, fn(&Arc<RpcManager>, &Message)); 3] = [
            (CallRequest::NAME, dispatch::on_call),
            (CallResponse::NAME, dispatch::on_response),
            (EventCall::NAME, dispatch::on_event),
        ];
        for (name, handler) in handlers {
            let listener = self.endpoint.listen(name);
            let manager = Arc::downgrade(self);
            let id = listener.on(move |message: &Message| {
                if let Some(manager) = manager.upgrade() {
                    handler(&manager, message);
                }
            });
            subscriptions.push((listener, id));
        }

        info!(node = %self.local_name(), "RPC manager started");
    }

    /// Stop serving. Outstanding calls stay pending.
    pub fn stop(&self) {
        let subscriptions: Vec<_> = self.subscriptions.lock().drain(..).collect();
        if subscriptions.is_empty() {
            return;
        }
        for (listener, id) in subscriptions {
            listener.remove(id);
        }
        info!(node = %self.local_name(), "RPC manager stopped");
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        !self.subscriptions.lock().is_empty()
    }

    /// Name of the local node.
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.endpoint.local_name()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    #[must_use]
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Outstanding outgoing calls.
    #[must_use]
    pub fn exchanges(&self) -> &Arc<ExchangeTable> {
        &self.exchanges
    }

    /// Install or remove the inbound security manager.
    pub fn set_security_manager(&self, security: Option<Arc<dyn InboundSecurityManager>>) {
        *self.security.write() = security;
    }

    #[must_use]
    pub fn security_manager(&self) -> Option<Arc<dyn InboundSecurityManager>> {
        self.security.read().clone()
    }

    /// Compile the interface `A`.
    pub fn compile<A: RemoteApi>(&self) -> RpcResult<Arc<CompiledInterface>> {
        Ok(self.registry.compile::<A>()?)
    }

    /// See [`Registry::add_hook`].
    pub fn add_compile_hook(&self, hook: CompileHook) {
        self.registry.add_hook(hook);
    }

    /// Compile `A` and bind local handlers to its functions.
    pub fn register<A: RemoteApi>(&self, handlers: Handlers) -> RpcResult<Arc<CompiledInterface>> {
        let interface = self.compile::<A>()?;

        for (key, handler) in handlers.entries {
            let targets: Vec<_> = match interface.by_signature(&key) {
                Some(method) => vec![method.clone()],
                None => interface.overloads(&key).cloned().collect(),
            };
            if targets.is_empty() {
                return Err(RpcError::UnknownMethod {
                    interface: interface.name().to_string(),
                    method: key,
                });
            }

            for method in targets {
                let function = method.function().ok_or_else(|| RpcError::NotCallable {
                    method: method.function_name().to_string(),
                    kind: method.kind().label(),
                })?;
                function.set_handler(handler.clone());
                debug!(function = %function.name(), "Bound local handler");
            }
        }

        Ok(interface)
    }

    /// Register a standalone function.
    pub fn register_function(&self, function: RemoteFunction) -> Arc<RemoteFunction> {
        self.registry.register_function(function)
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<Arc<RemoteFunction>> {
        self.registry.function(name)
    }

    #[must_use]
    pub fn event(&self, name: &str) -> Option<Arc<RemoteEvent>> {
        self.registry.event(name)
    }

    /// Bind `A` to calls over `channel`.
    pub fn bind_remote<A: RemoteApi>(self: &Arc<Self>, channel: Arc<dyn Channel>) -> RpcResult<RemoteBinding> {
        let interface = self.compile::<A>()?;
        Ok(RemoteBinding::new(self.clone(), channel, interface))
    }

    /// Bind `A` to calls sent directly to the node `remote`.
    pub fn bind<A: RemoteApi>(self: &Arc<Self>, remote: &str) -> RpcResult<RemoteBinding> {
        let channel = self.endpoint.channel_to(remote)?;
        self.bind_remote::<A>(channel)
    }

    /// Bind `A` to calls multicast on aux `topic`.
    pub fn bind_aux<A: RemoteApi>(self: &Arc<Self>, topic: &str) -> RpcResult<RemoteBinding> {
        let channel = self.endpoint.aux_channel_to(topic)?;
        self.bind_remote::<A>(channel)
    }

    /// Bind `A` to calls published to every node.
    pub fn bind_broadcast<A: RemoteApi>(self: &Arc<Self>) -> RpcResult<RemoteBinding> {
        self.bind_remote::<A>(self.broadcast.clone())
    }

    /// Register an exchange for `function` and send the call over `channel`.
    ///
    /// Returns as soon as the call is sent.
    pub fn call_exchange<T>(&self, channel: &dyn Channel, function: &str, args: Vec<Value>) -> RpcResult<ReplyFuture<T>> {
        let reply = self.exchanges.register::<T>(function);
        let request = CallRequest {
            call_id: reply.call_id(),
            name: function.to_string(),
            args,
        };

        match request.to_message().and_then(|message| channel.send(message)) {
            Ok(()) => {
                debug!(
                    call_id = %request.call_id,
                    function = function,
                    remote = channel.remote().unwrap_or("*"),
                    "Sent call"
                );
                Ok(reply)
            }
            Err(e) => {
                reply.cancel();
                Err(e.into())
            }
        }
    }

    /// Call `function` over `channel` and return the pending reply decoded as `T`.
    pub fn call_remote<T: DeserializeOwned>(
        &self,
        channel: &dyn Channel,
        function: &RemoteFunction,
        args: Vec<Value>,
    ) -> RpcResult<ReplyFuture<T>> {
        self.call_exchange(channel, function.name(), args)
    }

    /// Invoke the local handler of `name` in-process.
    pub async fn call_local(&self, name: &str, args: Vec<Value>) -> RpcResult<Value> {
        let function = self
            .function(name)
            .ok_or_else(|| RpcError::UnknownFunction(name.to_string()))?;
        let handler = function
            .handler()
            .ok_or_else(|| RpcError::NoHandler(name.to_string()))?;

        handler
            .call(CallInfo::local(), args)
            .await
            .map_err(|e| RpcError::Handler(RemoteError::from_anyhow(&e)))
    }

    /// Publish the event `method` of `A` with `payload` to every node.
    ///
    /// The local node does not receive its own broadcast.
    pub fn invoke_remote_event<A: RemoteApi, P: EventPayload>(&self, method: &str, payload: &P) -> RpcResult<()> {
        let interface = self.compile::<A>()?;
        let getter = interface.find(method, 0)?;
        let event = getter.event().ok_or_else(|| RpcError::NotEvent {
            method: getter.function_name().to_string(),
            kind: getter.kind().label(),
        })?;

        let call = EventCall {
            name: event.name().to_string(),
            payload: serde_json::to_value(payload)?,
            uid: payload.owner_uid(),
        };
        self.broadcast.publish(call.to_message()?)?;

        debug!(event = %call.name, uid = ?call.uid, "Published event");
        Ok(())
    }

    pub(crate) fn authorize(&self, function: &RemoteFunction, message: &Message) -> bool {
        let security = self.security_manager();
        crate::domain::security::authorize(
            self,
            function,
            message,
            &self.config.wildcard_group,
            security.as_deref(),
        )
    }

    /// Manager over a provider whose transport discards every frame.
    #[cfg(test)]
    pub(crate) fn detached(name: &str) -> Arc<Self> {
        use bytes::Bytes;
        use reco_bus::{BusBackend, BusChannel, BusResult, JsonSerializer, Link, Provider, Transport};

        struct NullTransport;

        impl Transport for NullTransport {
            fn send(&self, _: &str, _: Bytes) -> BusResult<()> {
                Ok(())
            }
            fn send_aux(&self, _: &str, _: Bytes) -> BusResult<()> {
                Ok(())
            }
            fn publish(&self, _: Bytes) -> BusResult<()> {
                Ok(())
            }
            fn bind_aux(&self, _: &str) -> BusResult<()> {
                Ok(())
            }
            fn close(&self) -> BusResult<()> {
                Ok(())
            }
        }

        let link = Arc::new(Link::new(name, Arc::new(JsonSerializer), Arc::new(NullTransport)));
        let provider: Arc<Provider<BusChannel>> = Arc::new(Provider::new(name, Arc::new(BusBackend::new(link))));
        Self::new(provider)
    }
}

impl Drop for RpcManager {
    fn drop(&mut self) {
        for (listener, id) in self.subscriptions.get_mut().drain(..) {
            listener.remove(id);
        }
    }
}

impl std::fmt::Debug for RpcManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcManager")
            .field("node", &self.local_name())
            .field("functions", &self.registry.function_count())
            .field("pending", &self.exchanges.pending_count())
            .finish()
    }
}
