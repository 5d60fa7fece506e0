use crate::dependencies::factory::Dependencies;
use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A resolved, type-erased instance. Downcast with `Arc::downcast`.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type Factory =
    Arc<dyn Fn(&Dependencies<'_>) -> Result<Instance, BoxError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyScope {
    /// One instance for the lifetime of the container.
    Singleton,
    /// One instance per inbound request.
    Request,
    /// A new instance for every resolution.
    Transient,
}

impl DependencyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Request => "request",
            Self::Transient => "transient",
        }
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a binding: a type plus an optional qualifier name.
///
/// Equality ignores the type name, which is kept only for diagnostics.
#[derive(Clone)]
pub struct Key {
    type_id: TypeId,
    type_name: &'static str,
    qualifier: Option<Cow<'static, str>>,
}

impl Key {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            qualifier: None,
        }
    }

    pub fn named<T: ?Sized + 'static>(qualifier: impl Into<Cow<'static, str>>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            ..Self::of::<T>()
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.qualifier == other.qualifier
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.qualifier.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}@{}", self.type_name, qualifier),
            None => f.write_str(self.type_name),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Built before the dependent and checked for cycles.
    Strict,
    /// Handed to the provider as a [`Lazy`](crate::dependencies::Lazy) handle.
    Lazy,
}

/// One declared dependency edge of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub key: Key,
    pub kind: EdgeKind,
}

/// Construction strategy of a binding with its statically declared dependencies.
#[derive(Clone)]
pub struct Provider {
    dependencies: Vec<Dependency>,
    produces: TypeId,
    produces_name: &'static str,
    factory: Factory,
}

impl Provider {
    pub fn new<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            dependencies: Vec::new(),
            produces: TypeId::of::<T>(),
            produces_name: type_name::<T>(),
            factory: Arc::new(move |deps| factory(deps).map(|value| Arc::new(value) as Instance)),
        }
    }

    /// Provider for a type built without dependencies.
    pub fn from_fn<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(move |_| Ok(factory()))
    }

    /// Provider that hands out one pre-built value.
    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        let value: Instance = Arc::new(value);
        Self {
            dependencies: Vec::new(),
            produces: TypeId::of::<T>(),
            produces_name: type_name::<T>(),
            factory: Arc::new(move |_| Ok(Arc::clone(&value))),
        }
    }

    pub fn depends_on<T: ?Sized + 'static>(self) -> Self {
        self.depends_on_key(Key::of::<T>())
    }

    pub fn depends_on_named<T: ?Sized + 'static>(
        self,
        qualifier: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.depends_on_key(Key::named::<T>(qualifier))
    }

    pub fn depends_on_key(mut self, key: Key) -> Self {
        self.dependencies.push(Dependency {
            key,
            kind: EdgeKind::Strict,
        });
        self
    }

    pub fn depends_on_lazy<T: ?Sized + 'static>(self) -> Self {
        self.depends_on_lazy_key(Key::of::<T>())
    }

    pub fn depends_on_lazy_key(mut self, key: Key) -> Self {
        self.dependencies.push(Dependency {
            key,
            kind: EdgeKind::Lazy,
        });
        self
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub(crate) fn strict_dependencies(&self) -> impl Iterator<Item = &Key> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == EdgeKind::Strict)
            .map(|dep| &dep.key)
    }

    pub(crate) fn produces(&self) -> (TypeId, &'static str) {
        (self.produces, self.produces_name)
    }

    pub(crate) fn invoke(&self, deps: &Dependencies<'_>) -> Result<Instance, BoxError> {
        (self.factory)(deps)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("produces", &self.produces_name)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub key: Key,
    pub provider: Provider,
    pub scope: DependencyScope,
}

/// Topologically ordered keys to construct for one root, dependencies first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructionPlan {
    pub root: Key,
    pub steps: Vec<Key>,
}

impl ConstructionPlan {
    pub fn position(&self, key: &Key) -> Option<usize> {
        self.steps.iter().position(|step| step == key)
    }
}
