//! Dispatch tables produced by the compiler.

use crate::domain::descriptor::{MethodDescriptor, TypeDescriptor};
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::event::RemoteEvent;
use crate::domain::function::RemoteFunction;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Dispatch strategy of a compiled method.
#[derive(Clone)]
pub enum MethodKind {
    /// Call the function and complete when the response arrives.
    Sync { function: Arc<RemoteFunction> },
    /// Dispatch like the sync sibling, returning the pending reply.
    Async { sync: Arc<CompiledMethod> },
    /// Return the remote event registered for the method.
    EventGetter { event: Arc<RemoteEvent> },
    /// Return a UID-bound object proxy; no call is made.
    ObjectFactory { class: Arc<CompiledObjectClass> },
}

impl MethodKind {
    /// Short name of the strategy.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            MethodKind::Sync { .. } => "sync",
            MethodKind::Async { .. } => "async",
            MethodKind::EventGetter { .. } => "an event getter",
            MethodKind::ObjectFactory { .. } => "an object getter",
        }
    }
}

/// One method of a compiled interface.
pub struct CompiledMethod {
    interface: String,
    descriptor: MethodDescriptor,
    function_name: String,
    kind: MethodKind,
}

impl CompiledMethod {
    pub(crate) fn new(interface: &str, descriptor: MethodDescriptor, kind: MethodKind) -> Self {
        Self {
            interface: interface.to_string(),
            function_name: descriptor.function_name(interface),
            descriptor,
            kind,
        }
    }

    /// Name of the declaring interface.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Method name as declared.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn params(&self) -> &[TypeDescriptor] {
        &self.descriptor.params
    }

    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Deterministic remote function name of this method.
    #[must_use]
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    #[must_use]
    pub fn kind(&self) -> &MethodKind {
        &self.kind
    }

    /// The remote function a call to this method dispatches to.
    #[must_use]
    pub fn function(&self) -> Option<&Arc<RemoteFunction>> {
        match &self.kind {
            MethodKind::Sync { function } => Some(function),
            MethodKind::Async { sync } => sync.function(),
            _ => None,
        }
    }

    /// The event returned by an event getter.
    #[must_use]
    pub fn event(&self) -> Option<&Arc<RemoteEvent>> {
        match &self.kind {
            MethodKind::EventGetter { event } => Some(event),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.kind, MethodKind::Async { .. })
    }
}

impl fmt::Debug for CompiledMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMethod")
            .field("function_name", &self.function_name)
            .field("kind", &self.kind.label())
            .finish()
    }
}

/// Ordered method table of one interface.
pub struct CompiledInterface {
    type_id: TypeId,
    name: String,
    methods: Vec<Arc<CompiledMethod>>,
    by_signature: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl CompiledInterface {
    pub(crate) fn new(type_id: TypeId, name: &str, methods: Vec<Arc<CompiledMethod>>) -> Self {
        let mut by_signature = HashMap::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, method) in methods.iter().enumerate() {
            by_signature.insert(method.descriptor.signature(), index);
            by_name.entry(method.name().to_string()).or_default().push(index);
        }
        Self {
            type_id,
            name: name.to_string(),
            methods,
            by_signature,
            by_name,
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Methods in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[Arc<CompiledMethod>] {
        &self.methods
    }

    /// Look up a method by its signature, e.g. `say(string,i32)`.
    #[must_use]
    pub fn by_signature(&self, signature: &str) -> Option<&Arc<CompiledMethod>> {
        self.by_signature.get(signature).map(|&i| &self.methods[i])
    }

    /// All overloads named `name`.
    pub fn overloads(&self, name: &str) -> impl Iterator<Item = &Arc<CompiledMethod>> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(|&i| &self.methods[i])
    }

    /// Resolve a method by signature, or by name and argument count.
    pub fn find(&self, name: &str, arity: usize) -> RpcResult<&Arc<CompiledMethod>> {
        if let Some(method) = self.by_signature(name) {
            return Ok(method);
        }

        let overloads: Vec<_> = self.overloads(name).collect();
        match overloads.as_slice() {
            [] => Err(RpcError::UnknownMethod {
                interface: self.name.clone(),
                method: name.to_string(),
            }),
            [only] => Ok(*only),
            many => {
                let mut fitting = many.iter().filter(|m| m.params().len() == arity);
                match (fitting.next(), fitting.next()) {
                    (Some(method), None) => Ok(*method),
                    _ => Err(RpcError::AmbiguousMethod {
                        interface: self.name.clone(),
                        method: name.to_string(),
                        args: arity,
                    }),
                }
            }
        }
    }
}

impl fmt::Debug for CompiledInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledInterface")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Dispatch strategy of an object member.
#[derive(Clone)]
pub enum CompiledObjectMethod {
    /// Call the interface method with the UID prepended.
    Forwarding { api: Arc<CompiledMethod> },
    /// Return the UID-scoped child of the interface event.
    EventBound { api: Arc<CompiledMethod>, event: Arc<RemoteEvent> },
}

impl CompiledObjectMethod {
    /// The interface method the member resolves to.
    #[must_use]
    pub fn api(&self) -> &Arc<CompiledMethod> {
        match self {
            CompiledObjectMethod::Forwarding { api } | CompiledObjectMethod::EventBound { api, .. } => api,
        }
    }
}

/// Compiled remote object type.
pub struct CompiledObjectClass {
    type_id: TypeId,
    name: String,
    uid_type: TypeDescriptor,
    members: HashMap<String, CompiledObjectMethod>,
}

impl CompiledObjectClass {
    pub(crate) fn new(
        type_id: TypeId,
        name: &str,
        uid_type: TypeDescriptor,
        members: HashMap<String, CompiledObjectMethod>,
    ) -> Self {
        Self {
            type_id,
            name: name.to_string(),
            uid_type,
            members,
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the UID accessor.
    #[must_use]
    pub fn uid_type(&self) -> &TypeDescriptor {
        &self.uid_type
    }

    #[must_use]
    pub fn member(&self, name: &str) -> Option<&CompiledObjectMethod> {
        self.members.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &CompiledObjectMethod)> {
        self.members.iter().map(|(name, m)| (name.as_str(), m))
    }
}

impl fmt::Debug for CompiledObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut members: Vec<&str> = self.members.keys().map(String::as_str).collect();
        members.sort_unstable();
        f.debug_struct("CompiledObjectClass")
            .field("name", &self.name)
            .field("uid_type", &self.uid_type)
            .field("members", &members)
            .finish()
    }
}
