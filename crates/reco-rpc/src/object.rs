//! UID-bound remote object proxies.
//!
//! Forwarding members call the owning interface's method with the UID as
//! the leading argument. Event members return the child of the interface
//! event scoped to the UID; the child is created when the proxy is.

use crate::binding::{RemoteBinding, Reply};
use crate::domain::args::IntoArgs;
use crate::domain::compiled::{CompiledObjectClass, CompiledObjectMethod};
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::event::RemoteEvent;
use crate::domain::exchange::ReplyFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::sync::Arc;

/// Proxy of one remote object.
pub struct RemoteObject {
    uid: Value,
    class: Arc<CompiledObjectClass>,
    binding: RemoteBinding,
    events: HashMap<String, Arc<RemoteEvent>>,
}

impl RemoteObject {
    pub(crate) fn new(binding: RemoteBinding, class: Arc<CompiledObjectClass>, uid: Value) -> Self {
        let events = class
            .members()
            .filter_map(|(name, member)| match member {
                CompiledObjectMethod::EventBound { event, .. } => Some((name.to_string(), event.by_uid(&uid))),
                CompiledObjectMethod::Forwarding { .. } => None,
            })
            .collect();

        Self {
            uid,
            class,
            binding,
            events,
        }
    }

    #[must_use]
    pub fn uid(&self) -> &Value {
        &self.uid
    }

    /// The UID decoded as `U`.
    pub fn uid_as<U: DeserializeOwned>(&self) -> RpcResult<U> {
        Ok(U::deserialize(&self.uid)?)
    }

    #[must_use]
    pub fn class(&self) -> &Arc<CompiledObjectClass> {
        &self.class
    }

    #[must_use]
    pub fn binding(&self) -> &RemoteBinding {
        &self.binding
    }

    /// Invoke `member` with an argument list, excluding the UID.
    pub fn invoke(&self, member: &str, args: Vec<Value>) -> RpcResult<Reply> {
        match self.class.member(member) {
            Some(CompiledObjectMethod::Forwarding { api }) => {
                let args = iter::once(self.uid.clone()).chain(args).collect();
                self.binding.invoke_method(api, args)
            }
            Some(CompiledObjectMethod::EventBound { .. }) => self.event(member).map(Reply::Event),
            None => Err(self.unknown(member)),
        }
    }

    /// Call `member` and wait for its decoded result.
    pub async fn call<R, A>(&self, member: &str, args: A) -> RpcResult<R>
    where
        R: DeserializeOwned,
        A: IntoArgs,
    {
        self.call_async(member, args)?.await
    }

    /// Call `member` and return the unresolved reply.
    pub fn call_async<R, A: IntoArgs>(&self, member: &str, args: A) -> RpcResult<ReplyFuture<R>> {
        let reply = self.invoke(member, args.into_args()?)?;
        Ok(reply.into_pending(member)?.cast())
    }

    /// Call `member` and discard its result.
    pub fn call_void<A: IntoArgs>(&self, member: &str, args: A) -> RpcResult<()> {
        drop(self.call_async::<Value, A>(member, args)?);
        Ok(())
    }

    /// The event `member`, scoped to this object's UID.
    pub fn event(&self, member: &str) -> RpcResult<Arc<RemoteEvent>> {
        self.events.get(member).cloned().ok_or_else(|| match self.class.member(member) {
            Some(other) => RpcError::NotEvent {
                method: format!("{}.{member}", self.class.name()),
                kind: other.api().kind().label(),
            },
            None => self.unknown(member),
        })
    }

    fn unknown(&self, member: &str) -> RpcError {
        RpcError::UnknownMethod {
            interface: self.class.name().to_string(),
            method: member.to_string(),
        }
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("class", &self.class.name())
            .field("uid", &self.uid)
            .finish()
    }
}
