//! Remote functions and their local handlers.

use crate::domain::correlation::CallId;
use crate::domain::descriptor::TypeDescriptor;
use async_trait::async_trait;
use parking_lot::RwLock;
use reco_bus::Channel;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Context of one handler invocation.
#[derive(Clone, Default)]
pub struct CallInfo {
    channel: Option<Arc<dyn Channel>>,
    call_id: Option<CallId>,
    source: Option<String>,
}

impl CallInfo {
    /// A call that arrived over `channel` from node `source`.
    pub fn remote(channel: Arc<dyn Channel>, call_id: CallId, source: impl Into<String>) -> Self {
        Self {
            channel: Some(channel),
            call_id: Some(call_id),
            source: Some(source.into()),
        }
    }

    /// A call made in-process.
    #[must_use]
    pub fn local() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.call_id.is_none()
    }

    /// Channel the call arrived on; replies to the caller go here.
    #[must_use]
    pub fn channel(&self) -> Option<&Arc<dyn Channel>> {
        self.channel.as_ref()
    }

    #[must_use]
    pub fn call_id(&self) -> Option<CallId> {
        self.call_id
    }

    /// Name of the calling node.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

impl fmt::Debug for CallInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInfo")
            .field("call_id", &self.call_id)
            .field("source", &self.source)
            .finish()
    }
}

/// Local implementation of a remote function.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, info: CallInfo, args: Vec<Value>) -> anyhow::Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> FunctionHandler for FnHandler<F>
where
    F: Fn(CallInfo, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, info: CallInfo, args: Vec<Value>) -> anyhow::Result<Value> {
        (self.0)(info, args).await
    }
}

/// Wrap an async closure as a [`FunctionHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn FunctionHandler>
where
    F: Fn(CallInfo, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A named, invocable entry in the function table.
pub struct RemoteFunction {
    name: String,
    params: Vec<TypeDescriptor>,
    returns: TypeDescriptor,
    allowed_groups: HashSet<String>,
    handler: RwLock<Option<Arc<dyn FunctionHandler>>>,
}

impl RemoteFunction {
    pub fn new(
        name: impl Into<String>,
        params: Vec<TypeDescriptor>,
        returns: TypeDescriptor,
        allowed_groups: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
            allowed_groups: allowed_groups.into_iter().collect(),
            handler: RwLock::new(None),
        }
    }

    /// Deterministic name of the function.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    #[must_use]
    pub fn returns(&self) -> &TypeDescriptor {
        &self.returns
    }

    /// Security groups allowed to call this function.
    #[must_use]
    pub fn allowed_groups(&self) -> &HashSet<String> {
        &self.allowed_groups
    }

    /// Bind the local handler, replacing any previous one.
    pub fn set_handler(&self, handler: Arc<dyn FunctionHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Builder form of [`RemoteFunction::set_handler`].
    #[must_use]
    pub fn with_handler(self, handler: Arc<dyn FunctionHandler>) -> Self {
        self.set_handler(handler);
        self
    }

    /// The bound local handler.
    #[must_use]
    pub fn handler(&self) -> Option<Arc<dyn FunctionHandler>> {
        self.handler.read().clone()
    }
}

impl fmt::Debug for RemoteFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFunction")
            .field("name", &self.name)
            .field("allowed_groups", &self.allowed_groups)
            .field("has_handler", &self.handler.read().is_some())
            .finish()
    }
}
