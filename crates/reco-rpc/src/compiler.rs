//! # Interface and Object Compiler
//!
//! Turns [`InterfaceDescriptor`]s into [`CompiledInterface`]s and object
//! descriptors into [`CompiledObjectClass`]es. Results are memoized per type
//! for the lifetime of the [`Registry`]; there is exactly one compiled
//! instance per type even when first use races.
//!
//! Classification of a declared method:
//!
//! | Returns | Compiled as | Requirement |
//! |---------|-------------|-------------|
//! | `Future(T)` | `Async` | sync sibling with identical parameters |
//! | `Event(P)` | `EventGetter` | no parameters |
//! | `Object(O)` | `ObjectFactory` | exactly one parameter accepting the UID |
//! | `Value(T)` | `Sync` | none |
//!
//! Object getters are compiled after every other method, so object members
//! can resolve against the full method table.
//!
//! Functions, events and object classes created while compiling are staged
//! and only enter the registry once the whole interface compiled.

use crate::domain::compiled::{
    CompiledInterface, CompiledMethod, CompiledObjectClass, CompiledObjectMethod, MethodKind,
};
use crate::domain::descriptor::{
    InterfaceDescriptor, MethodDescriptor, ObjectDescriptor, ObjectRef, RemoteApi, Returns,
    TypeDescriptor,
};
use crate::domain::error::CompileError;
use crate::domain::event::RemoteEvent;
use crate::domain::function::RemoteFunction;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Hook consulted before the default classification of each method.
pub type CompileHook =
    Arc<dyn Fn(&InterfaceDescriptor, &MethodDescriptor) -> Option<MethodKind> + Send + Sync>;

/// Per-manager registry of compiled types, functions and events.
pub struct Registry {
    default_groups: Vec<String>,
    interfaces: DashMap<TypeId, Arc<CompiledInterface>>,
    object_classes: DashMap<TypeId, Arc<CompiledObjectClass>>,
    functions: DashMap<String, Arc<RemoteFunction>>,
    events: DashMap<String, Arc<RemoteEvent>>,
    hooks: RwLock<Vec<CompileHook>>,
    compile_lock: Mutex<()>,
}

impl Registry {
    /// Create a registry. Methods without explicit groups get `default_groups`.
    pub fn new(default_groups: Vec<String>) -> Self {
        Self {
            default_groups,
            interfaces: DashMap::new(),
            object_classes: DashMap::new(),
            functions: DashMap::new(),
            events: DashMap::new(),
            hooks: RwLock::new(Vec::new()),
            compile_lock: Mutex::new(()),
        }
    }

    /// Add a compilation hook. Hooks run in insertion order; the first
    /// returning a kind wins.
    ///
    /// Hooks run before the compile lock is taken, so a hook may compile
    /// other interfaces or add hooks. It must not compile the interface it
    /// is being consulted for, which would recurse without end.
    pub fn add_hook(&self, hook: CompileHook) {
        self.hooks.write().push(hook);
    }

    /// Compile the interface `A`, or return the cached result.
    pub fn compile<A: RemoteApi>(&self) -> Result<Arc<CompiledInterface>, CompileError> {
        self.compile_with(TypeId::of::<A>(), A::descriptor)
    }

    /// Compile an interface identified by `type_id`.
    ///
    /// `descriptor`, the hooks and object descriptors are evaluated outside
    /// the compile lock.
    pub fn compile_with(
        &self,
        type_id: TypeId,
        descriptor: impl FnOnce() -> InterfaceDescriptor,
    ) -> Result<Arc<CompiledInterface>, CompileError> {
        if let Some(compiled) = self.interfaces.get(&type_id) {
            return Ok(compiled.clone());
        }

        let descriptor = descriptor();
        let methods: Vec<&MethodDescriptor> = descriptor.methods.iter().filter(|m| !m.local).collect();
        let resolved = self.resolve(&descriptor, &methods);

        let _guard = self.compile_lock.lock();
        if let Some(compiled) = self.interfaces.get(&type_id) {
            return Ok(compiled.clone());
        }

        let (compiled, staged) = self.compile_interface(type_id, &descriptor, &methods, resolved)?;
        let compiled = Arc::new(compiled);
        self.commit(staged);
        self.interfaces.insert(type_id, compiled.clone());
        debug!(
            interface = %compiled.name(),
            methods = compiled.methods().len(),
            "Compiled interface"
        );
        Ok(compiled)
    }

    /// A cached compiled interface.
    #[must_use]
    pub fn interface<A: RemoteApi>(&self) -> Option<Arc<CompiledInterface>> {
        self.interfaces.get(&TypeId::of::<A>()).map(|c| c.clone())
    }

    /// A cached compiled object class.
    #[must_use]
    pub fn object_class(&self, type_id: TypeId) -> Option<Arc<CompiledObjectClass>> {
        self.object_classes.get(&type_id).map(|c| c.clone())
    }

    /// Register a function, replacing any function of the same name.
    pub fn register_function(&self, function: RemoteFunction) -> Arc<RemoteFunction> {
        let function = Arc::new(function);
        self.functions
            .insert(function.name().to_string(), function.clone());
        function
    }

    /// Look up a function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<Arc<RemoteFunction>> {
        self.functions.get(name).map(|f| f.clone())
    }

    /// Number of registered functions.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Look up an event by function name.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<Arc<RemoteEvent>> {
        self.events.get(name).map(|e| e.clone())
    }

    /// Run the hooks and load object descriptors for `methods`.
    fn resolve(&self, interface: &InterfaceDescriptor, methods: &[&MethodDescriptor]) -> Resolved {
        let hooks = self.hooks.read().clone();
        let hooked = methods
            .iter()
            .map(|&method| hooks.iter().find_map(|hook| hook(interface, method)))
            .collect();

        let mut objects = HashMap::new();
        for method in methods {
            if let Returns::Object(object) = &method.returns {
                if self.object_class(object.type_id()).is_none() {
                    objects
                        .entry(object.type_id())
                        .or_insert_with(|| object.descriptor());
                }
            }
        }
        Resolved { hooked, objects }
    }

    fn commit(&self, staged: Staged) {
        for (name, function) in staged.functions {
            self.functions.entry(name).or_insert(function);
        }
        for (name, event) in staged.events {
            self.events.entry(name).or_insert(event);
        }
        for (type_id, class) in staged.object_classes {
            self.object_classes.entry(type_id).or_insert(class);
        }
    }

    fn compile_interface(
        &self,
        type_id: TypeId,
        descriptor: &InterfaceDescriptor,
        methods: &[&MethodDescriptor],
        resolved: Resolved,
    ) -> Result<(CompiledInterface, Staged), CompileError> {
        let mut index = HashMap::new();
        for (i, method) in methods.iter().enumerate() {
            if index.insert(method.signature(), i).is_some() {
                return Err(CompileError::DuplicateMethod {
                    interface: descriptor.name.to_string(),
                    name: method.signature(),
                });
            }
        }

        let mut session = Session {
            registry: self,
            interface: descriptor,
            methods,
            index: &index,
            resolved,
            compiled: vec![None; methods.len()],
            staged: Staged::default(),
        };

        for i in 0..methods.len() {
            if !matches!(methods[i].returns, Returns::Object(_)) {
                session.method(i)?;
            }
        }
        for i in 0..methods.len() {
            if matches!(methods[i].returns, Returns::Object(_)) {
                session.method(i)?;
            }
        }

        let compiled = session.compiled.into_iter().flatten().collect();
        Ok((CompiledInterface::new(type_id, &descriptor.name, compiled), session.staged))
    }
}

/// Hook results and object descriptors gathered before the compile lock.
struct Resolved {
    hooked: Vec<Option<MethodKind>>,
    objects: HashMap<TypeId, ObjectDescriptor>,
}

/// Registrations made by a compilation that has not finished yet.
#[derive(Default)]
struct Staged {
    functions: HashMap<String, Arc<RemoteFunction>>,
    events: HashMap<String, Arc<RemoteEvent>>,
    object_classes: HashMap<TypeId, Arc<CompiledObjectClass>>,
}

/// State of one interface compilation.
struct Session<'a> {
    registry: &'a Registry,
    interface: &'a InterfaceDescriptor,
    methods: &'a [&'a MethodDescriptor],
    index: &'a HashMap<String, usize>,
    resolved: Resolved,
    compiled: Vec<Option<Arc<CompiledMethod>>>,
    staged: Staged,
}

impl Session<'_> {
    fn interface_name(&self) -> &str {
        &self.interface.name
    }

    fn function(&self, name: &str) -> Option<Arc<RemoteFunction>> {
        self.staged
            .functions
            .get(name)
            .cloned()
            .or_else(|| self.registry.function(name))
    }

    fn function_or_create(&mut self, method: &MethodDescriptor) -> Arc<RemoteFunction> {
        let name = method.function_name(self.interface_name());
        if let Some(function) = self.function(&name) {
            return function;
        }

        let returns = match &method.returns {
            Returns::Value(ty) | Returns::Future(ty) => ty.clone(),
            Returns::Event(_) | Returns::Object(_) => TypeDescriptor::VALUE,
        };
        let groups = method
            .allowed_groups
            .clone()
            .unwrap_or_else(|| self.registry.default_groups.clone());

        let function = Arc::new(RemoteFunction::new(name.clone(), method.params.clone(), returns, groups));
        self.staged.functions.insert(name, function.clone());
        function
    }

    fn event_or_create(&mut self, name: &str) -> Arc<RemoteEvent> {
        if let Some(event) = self.staged.events.get(name).cloned().or_else(|| self.registry.event(name)) {
            return event;
        }
        let event = Arc::new(RemoteEvent::new(name));
        self.staged.events.insert(name.to_string(), event.clone());
        event
    }

    fn method(&mut self, i: usize) -> Result<Arc<CompiledMethod>, CompileError> {
        if let Some(compiled) = &self.compiled[i] {
            return Ok(compiled.clone());
        }
        let descriptor = self.methods[i];
        if let Returns::Object(object) = &descriptor.returns {
            return self.object_factory(i, object);
        }

        let kind = match self.resolved.hooked[i].take() {
            Some(kind) => kind,
            None => self.classify(descriptor)?,
        };

        if let MethodKind::Sync { function } = &kind {
            if self.function(function.name()).is_none() {
                self.staged
                    .functions
                    .insert(function.name().to_string(), function.clone());
            }
        }

        let compiled = Arc::new(CompiledMethod::new(
            self.interface_name(),
            descriptor.clone(),
            kind,
        ));
        self.compiled[i] = Some(compiled.clone());
        Ok(compiled)
    }

    fn classify(&mut self, descriptor: &MethodDescriptor) -> Result<MethodKind, CompileError> {
        match &descriptor.returns {
            Returns::Future(_) => {
                let sibling = MethodDescriptor {
                    name: sibling_name(&descriptor.name).into(),
                    ..descriptor.clone()
                }
                .signature();

                let j = self
                    .index
                    .get(&sibling)
                    .copied()
                    .filter(|&j| matches!(self.methods[j].returns, Returns::Value(_)))
                    .ok_or_else(|| CompileError::MissingSyncSibling {
                        method: descriptor.signature(),
                        sibling,
                    })?;
                Ok(MethodKind::Async { sync: self.method(j)? })
            }
            Returns::Event(_) => {
                if !descriptor.params.is_empty() {
                    return Err(CompileError::EventArity {
                        method: descriptor.signature(),
                        params: descriptor.params.len(),
                    });
                }
                let name = descriptor.function_name(self.interface_name());
                Ok(MethodKind::EventGetter {
                    event: self.event_or_create(&name),
                })
            }
            Returns::Value(_) | Returns::Object(_) => Ok(MethodKind::Sync {
                function: self.function_or_create(descriptor),
            }),
        }
    }

    fn object_factory(&mut self, i: usize, object: &ObjectRef) -> Result<Arc<CompiledMethod>, CompileError> {
        let descriptor = self.methods[i];
        if descriptor.params.len() != 1 {
            return Err(CompileError::ObjectFactoryArity {
                method: descriptor.signature(),
                params: descriptor.params.len(),
            });
        }

        let kind = match self.resolved.hooked[i].take() {
            Some(kind) => kind,
            None => {
                let class = self.object_class(object)?;
                if !class.uid_type().accepts(&descriptor.params[0]) {
                    return Err(CompileError::ObjectUidMismatch {
                        method: descriptor.signature(),
                        expected: class.uid_type().to_string(),
                        found: descriptor.params[0].to_string(),
                    });
                }
                MethodKind::ObjectFactory { class }
            }
        };

        let compiled = Arc::new(CompiledMethod::new(self.interface_name(), descriptor.clone(), kind));
        self.compiled[i] = Some(compiled.clone());
        Ok(compiled)
    }

    fn object_class(&mut self, object: &ObjectRef) -> Result<Arc<CompiledObjectClass>, CompileError> {
        let type_id = object.type_id();
        if let Some(class) = self.staged.object_classes.get(&type_id) {
            return Ok(class.clone());
        }
        if let Some(class) = self.registry.object_class(type_id) {
            return Ok(class);
        }

        let descriptor = match self.resolved.objects.get(&type_id) {
            Some(descriptor) => descriptor.clone(),
            None => object.descriptor(),
        };
        let uid = descriptor.uid.clone().ok_or_else(|| CompileError::MissingUid {
            object: descriptor.name.to_string(),
        })?;

        let available: Vec<&Arc<CompiledMethod>> = self.compiled.iter().flatten().collect();
        let mut members = HashMap::new();

        for member in &descriptor.members {
            let target = member.target_name();
            let candidates: Vec<&&Arc<CompiledMethod>> =
                available.iter().filter(|m| m.name() == target).collect();

            let unresolved = || CompileError::UnresolvedObjectTarget {
                object: descriptor.name.to_string(),
                member: member.name.to_string(),
                target: target.to_string(),
            };

            if let Some(api) = candidates.iter().find(|m| m.event().is_some()) {
                let event = api.event().cloned().ok_or_else(unresolved)?;
                members.insert(
                    member.name.to_string(),
                    CompiledObjectMethod::EventBound {
                        api: (**api).clone(),
                        event,
                    },
                );
                continue;
            }

            let api = candidates
                .iter()
                .find(|m| m.params().first().is_some_and(|first| first.accepts(&uid)));
            match (api, candidates.first()) {
                (Some(api), _) => {
                    members.insert(
                        member.name.to_string(),
                        CompiledObjectMethod::Forwarding { api: (**api).clone() },
                    );
                }
                (None, Some(other)) => {
                    return Err(CompileError::ForwardUidMismatch {
                        object: descriptor.name.to_string(),
                        member: member.name.to_string(),
                        target: other.function_name().to_string(),
                        expected: uid.to_string(),
                        found: other
                            .params()
                            .first()
                            .map_or_else(|| "no parameters".to_string(), ToString::to_string),
                    });
                }
                (None, None) => return Err(unresolved()),
            }
        }

        let class = Arc::new(CompiledObjectClass::new(type_id, &descriptor.name, uid, members));
        self.staged.object_classes.insert(type_id, class.clone());
        debug!(object = %descriptor.name, "Compiled object class");
        Ok(class)
    }
}

/// Name of the sync method paired with the async method `name`.
fn sibling_name(name: &str) -> String {
    match name.strip_suffix("_async") {
        Some(base) => base.to_string(),
        None => format!("{name}_sync"),
    }
}
