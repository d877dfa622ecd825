//! Client side of a compiled interface.
//!
//! A [`RemoteBinding`] pairs a compiled interface with the channel its calls
//! go out on. It is built once per interface and channel; every call looks up
//! the compiled method and dispatches on its kind. Typed clients wrap one:
//!
//! ```ignore
//! struct LoggerClient(RemoteBinding);
//!
//! impl LoggerClient {
//!     async fn log(&self, line: &str) -> RpcResult<()> {
//!         self.0.call("log", (line,)).await
//!     }
//! }
//! ```

use crate::domain::args::IntoArgs;
use crate::domain::compiled::{CompiledInterface, CompiledMethod, MethodKind};
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::event::RemoteEvent;
use crate::domain::exchange::ReplyFuture;
use crate::manager::RpcManager;
use crate::object::RemoteObject;
use reco_bus::Channel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What invoking a compiled method produced.
#[derive(Debug)]
pub enum Reply {
    /// The call was sent; the reply is pending.
    Pending(ReplyFuture),
    /// The remote event returned by an event getter.
    Event(Arc<RemoteEvent>),
    /// The proxy returned by an object getter.
    Object(RemoteObject),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::Pending(_) => "a function",
            Reply::Event(_) => "an event getter",
            Reply::Object(_) => "an object getter",
        }
    }

    /// The pending reply of a call to `method`.
    pub fn into_pending(self, method: &str) -> RpcResult<ReplyFuture> {
        match self {
            Reply::Pending(reply) => Ok(reply),
            other => Err(RpcError::NotCallable {
                method: method.to_string(),
                kind: other.kind(),
            }),
        }
    }
}

/// A compiled interface bound to a channel.
#[derive(Clone)]
pub struct RemoteBinding {
    manager: Arc<RpcManager>,
    channel: Arc<dyn Channel>,
    interface: Arc<CompiledInterface>,
}

impl RemoteBinding {
    pub(crate) fn new(manager: Arc<RpcManager>, channel: Arc<dyn Channel>, interface: Arc<CompiledInterface>) -> Self {
        Self {
            manager,
            channel,
            interface,
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<RpcManager> {
        &self.manager
    }

    /// Channel calls are sent on.
    #[must_use]
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    #[must_use]
    pub fn interface(&self) -> &Arc<CompiledInterface> {
        &self.interface
    }

    /// Resolve `method` (name or signature) for `arity` arguments.
    pub fn method(&self, method: &str, arity: usize) -> RpcResult<Arc<CompiledMethod>> {
        self.interface.find(method, arity).cloned()
    }

    /// Invoke `method` with an argument list.
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> RpcResult<Reply> {
        let method = self.method(method, args.len())?;
        self.invoke_method(&method, args)
    }

    /// Invoke a compiled method of this binding's interface.
    pub fn invoke_method(&self, method: &CompiledMethod, args: Vec<Value>) -> RpcResult<Reply> {
        match method.kind() {
            MethodKind::Sync { function } => {
                check_arity(method, &args)?;
                let reply = self.manager.call_remote(self.channel.as_ref(), function, args)?;
                Ok(Reply::Pending(reply))
            }
            MethodKind::Async { sync } => self.invoke_method(sync, args),
            MethodKind::EventGetter { event } => Ok(Reply::Event(event.clone())),
            MethodKind::ObjectFactory { class } => {
                check_arity(method, &args)?;
                let uid = args.into_iter().next().unwrap_or(Value::Null);
                Ok(Reply::Object(RemoteObject::new(self.clone(), class.clone(), uid)))
            }
        }
    }

    /// Call `method` and wait for its decoded result.
    pub async fn call<R, A>(&self, method: &str, args: A) -> RpcResult<R>
    where
        R: DeserializeOwned,
        A: IntoArgs,
    {
        self.call_async(method, args)?.await
    }

    /// Call `method` and return the unresolved reply.
    pub fn call_async<R, A>(&self, method: &str, args: A) -> RpcResult<ReplyFuture<R>>
    where
        A: IntoArgs,
    {
        let reply = self.invoke(method, args.into_args()?)?;
        Ok(reply.into_pending(method)?.cast())
    }

    /// Call `method` and discard its result.
    pub fn call_void<A: IntoArgs>(&self, method: &str, args: A) -> RpcResult<()> {
        drop(self.call_async::<Value, A>(method, args)?);
        Ok(())
    }

    /// Call `method` and block the current thread until it completes.
    ///
    /// Must not be called from within an async task.
    pub fn call_blocking<R, A>(&self, method: &str, args: A) -> RpcResult<R>
    where
        R: DeserializeOwned,
        A: IntoArgs,
    {
        self.call_async(method, args)?.wait()
    }

    /// The remote event returned by the getter `method`.
    pub fn event(&self, method: &str) -> RpcResult<Arc<RemoteEvent>> {
        let getter = self.method(method, 0)?;
        getter.event().cloned().ok_or_else(|| RpcError::NotEvent {
            method: getter.function_name().to_string(),
            kind: getter.kind().label(),
        })
    }

    /// The object proxy returned by the getter `method` for `uid`.
    ///
    /// No call is made; the proxy forwards each member call with `uid`
    /// prepended.
    pub fn object<U: Serialize>(&self, method: &str, uid: U) -> RpcResult<RemoteObject> {
        let uid = serde_json::to_value(uid)?;
        match self.invoke(method, vec![uid])? {
            Reply::Object(object) => Ok(object),
            other => Err(RpcError::NotCallable {
                method: method.to_string(),
                kind: other.kind(),
            }),
        }
    }
}

fn check_arity(method: &CompiledMethod, args: &[Value]) -> RpcResult<()> {
    if args.len() == method.params().len() {
        Ok(())
    } else {
        Err(RpcError::Codec(format!(
            "`{}` takes {} arguments, got {}",
            method.function_name(),
            method.params().len(),
            args.len()
        )))
    }
}

impl fmt::Debug for RemoteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBinding")
            .field("interface", &self.interface.name())
            .field("remote", &self.channel.remote())
            .finish()
    }
}
