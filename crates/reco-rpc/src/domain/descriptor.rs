//! Typed descriptors of remote interfaces and remote objects.
//!
//! A service interface is a marker type implementing [`RemoteApi`]; its
//! descriptor lists every method with its parameter types, return kind and
//! per-method metadata. The compiler turns descriptors into dispatch tables.
//!
//! ```ignore
//! struct Logger;
//!
//! impl RemoteApi for Logger {
//!     fn descriptor() -> InterfaceDescriptor {
//!         InterfaceDescriptor::new("Logger")
//!             .method(MethodDescriptor::new("log").param::<String>())
//!             .method(MethodDescriptor::new("log_async").param::<String>().returns_future::<()>())
//!     }
//! }
//! ```

use serde_json::Value;
use std::any::{type_name, TypeId};
use std::borrow::Cow;
use std::fmt;

/// Stable name of a parameter or return type.
///
/// Type names take part in function names, so they must be identical on
/// every node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor(Cow<'static, str>);

impl TypeDescriptor {
    /// The dynamic value type, accepted wherever a type is checked.
    pub const VALUE: TypeDescriptor = TypeDescriptor::named("value");

    /// A descriptor with a static name.
    #[must_use]
    pub const fn named(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// A descriptor with a computed name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Whether a value described by `other` can be passed where `self` is expected.
    #[must_use]
    pub fn accepts(&self, other: &TypeDescriptor) -> bool {
        self == other || *self == Self::VALUE
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Types that have a [`TypeDescriptor`].
pub trait Describe {
    fn describe() -> TypeDescriptor;
}

macro_rules! describe_as {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDescriptor {
                    TypeDescriptor::named($name)
                }
            }
        )*
    };
}

describe_as! {
    () => "void",
    bool => "bool",
    char => "char",
    String => "string",
    str => "string",
    i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64",
    u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64",
    f32 => "f32", f64 => "f64",
    Value => "value",
}

impl<T: Describe + ?Sized> Describe for &T {
    fn describe() -> TypeDescriptor {
        T::describe()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::new(format!("list<{}>", T::describe()))
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::new(format!("option<{}>", T::describe()))
    }
}

/// A declared service interface.
pub trait RemoteApi: 'static {
    fn descriptor() -> InterfaceDescriptor;
}

/// A declared remote object type.
pub trait RemoteObjectType: 'static {
    fn descriptor() -> ObjectDescriptor;
}

/// Reference to a remote object type returned by an object getter.
#[derive(Clone, Copy)]
pub struct ObjectRef {
    type_id: TypeId,
    type_name: &'static str,
    descriptor: fn() -> ObjectDescriptor,
}

impl ObjectRef {
    /// Reference the object type `O`.
    #[must_use]
    pub fn of<O: RemoteObjectType>() -> Self {
        Self {
            type_id: TypeId::of::<O>(),
            type_name: type_name::<O>(),
            descriptor: O::descriptor,
        }
    }

    /// Identity of the object type, used as cache key.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The object's descriptor.
    #[must_use]
    pub fn descriptor(&self) -> ObjectDescriptor {
        (self.descriptor)()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.type_name).finish()
    }
}

/// What a method returns, which decides how it is compiled.
#[derive(Debug, Clone)]
pub enum Returns {
    /// A plain value; the call completes when the response arrives.
    Value(TypeDescriptor),
    /// A future of a value; paired with a sync sibling.
    Future(TypeDescriptor),
    /// A remote event handle with the given payload type.
    Event(TypeDescriptor),
    /// A remote object proxy.
    Object(ObjectRef),
}

impl Returns {
    /// Short name of the return kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Returns::Value(_) => "a function",
            Returns::Future(_) => "an async function",
            Returns::Event(_) => "an event getter",
            Returns::Object(_) => "an object getter",
        }
    }
}

/// One declared method of a service interface.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: Cow<'static, str>,
    pub params: Vec<TypeDescriptor>,
    pub returns: Returns,
    /// Security groups allowed to call the method; `None` uses the manager default.
    pub allowed_groups: Option<Vec<String>>,
    /// Local-only methods are never compiled into remote functions.
    pub local: bool,
}

impl MethodDescriptor {
    /// A method without parameters returning nothing.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: Returns::Value(<()>::describe()),
            allowed_groups: None,
            local: false,
        }
    }

    /// Append a parameter of type `T`.
    #[must_use]
    pub fn param<T: Describe + ?Sized>(mut self) -> Self {
        self.params.push(T::describe());
        self
    }

    /// Append a parameter by descriptor.
    #[must_use]
    pub fn param_type(mut self, ty: TypeDescriptor) -> Self {
        self.params.push(ty);
        self
    }

    /// Return a value of type `T`.
    #[must_use]
    pub fn returns<T: Describe + ?Sized>(mut self) -> Self {
        self.returns = Returns::Value(T::describe());
        self
    }

    /// Return a future of `T`.
    #[must_use]
    pub fn returns_future<T: Describe + ?Sized>(mut self) -> Self {
        self.returns = Returns::Future(T::describe());
        self
    }

    /// Return a remote event carrying `P`.
    #[must_use]
    pub fn returns_event<P: Describe + ?Sized>(mut self) -> Self {
        self.returns = Returns::Event(P::describe());
        self
    }

    /// Return a remote object of type `O`.
    #[must_use]
    pub fn returns_object<O: RemoteObjectType>(mut self) -> Self {
        self.returns = Returns::Object(ObjectRef::of::<O>());
        self
    }

    /// Restrict callers to the given security groups.
    #[must_use]
    pub fn allow<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Mark the method as local-only.
    #[must_use]
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// The parameter list as written in function names.
    #[must_use]
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(TypeDescriptor::name).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// Deterministic remote function name: `<interface>.<method>(<t1>,<t2>)`.
    #[must_use]
    pub fn function_name(&self, interface: &str) -> String {
        format!("{interface}.{}", self.signature())
    }
}

/// A declared service interface.
#[derive(Debug, Clone)]
pub struct InterfaceDescriptor {
    pub name: Cow<'static, str>,
    pub methods: Vec<MethodDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Declare a method.
    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }
}

/// One forwarded member of a remote object.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: Cow<'static, str>,
    /// Interface method the member resolves to; defaults to the member name.
    pub target: Option<Cow<'static, str>>,
}

impl MemberDescriptor {
    /// The interface method name this member resolves to.
    #[must_use]
    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }
}

/// A declared remote object type.
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    pub name: Cow<'static, str>,
    pub uid: Option<TypeDescriptor>,
    pub members: Vec<MemberDescriptor>,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            uid: None,
            members: Vec::new(),
        }
    }

    /// Declare the UID accessor with UID type `U`.
    #[must_use]
    pub fn uid<U: Describe + ?Sized>(mut self) -> Self {
        self.uid = Some(U::describe());
        self
    }

    /// Declare a member resolving to the interface method of the same name.
    #[must_use]
    pub fn member(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            target: None,
        });
        self
    }

    /// Declare a member resolving to the interface method `target`.
    #[must_use]
    pub fn member_for(
        mut self,
        name: impl Into<Cow<'static, str>>,
        target: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            target: Some(target.into()),
        });
        self
    }
}
