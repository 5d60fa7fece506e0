use crate::dependencies::factory;
use crate::dependencies::registry::BindingRegistry;
use crate::dependencies::resolver::DependencyResolver;
use crate::dependencies::scope::{RequestScope, ScopeManager};
use crate::dependencies::types::{ConstructionPlan, Instance, Key};
use crate::errors::ContainerError;
use std::any::{type_name, Any};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

pub(crate) struct ContainerShared {
    registry: BindingRegistry,
    resolver: DependencyResolver,
    scopes: ScopeManager,
}

/// Sealed bindings plus the singleton scope, shared by every request.
///
/// Cloning is cheap and every clone sees the same singletons.
#[derive(Clone)]
pub struct Container {
    shared: Arc<ContainerShared>,
}

impl Container {
    /// Seals the registry and validates the graph of every binding.
    ///
    /// Cycles, unbound dependencies and scope mismatches are reported here,
    /// before any instance exists.
    pub fn build(mut registry: BindingRegistry) -> Result<Self, ContainerError> {
        registry.seal();
        let resolver = DependencyResolver::new();
        for key in registry.keys() {
            resolver.plan(&registry, key)?;
        }
        let scopes = ScopeManager::new(&registry);
        log::info!(
            "container ready: {} bindings, {} plans",
            registry.len(),
            resolver.cached_plans()
        );

        Ok(Self {
            shared: Arc::new(ContainerShared {
                registry,
                resolver,
                scopes,
            }),
        })
    }

    pub fn registry(&self) -> &BindingRegistry {
        &self.shared.registry
    }

    pub fn scopes(&self) -> &ScopeManager {
        &self.shared.scopes
    }

    pub fn plan(&self, key: &Key) -> Result<Arc<ConstructionPlan>, ContainerError> {
        self.shared.resolver.plan(&self.shared.registry, key)
    }

    pub fn request_scope(&self) -> RequestScope {
        RequestScope::new()
    }

    pub fn resolve_key(
        &self,
        key: &Key,
        request: Option<&mut RequestScope>,
    ) -> Result<Instance, ContainerError> {
        let plan = self.plan(key)?;
        self.shared.scopes.resolve(
            &plan,
            &self.shared.registry,
            &Arc::downgrade(&self.shared),
            request,
        )
    }

    pub fn resolve<T: Any + Send + Sync>(
        &self,
        request: Option<&mut RequestScope>,
    ) -> Result<Arc<T>, ContainerError> {
        self.resolve_as(&Key::of::<T>(), request)
    }

    pub fn resolve_named<T: Any + Send + Sync>(
        &self,
        qualifier: impl Into<Cow<'static, str>>,
        request: Option<&mut RequestScope>,
    ) -> Result<Arc<T>, ContainerError> {
        self.resolve_as(&Key::named::<T>(qualifier), request)
    }

    fn resolve_as<T: Any + Send + Sync>(
        &self,
        key: &Key,
        request: Option<&mut RequestScope>,
    ) -> Result<Arc<T>, ContainerError> {
        self.resolve_key(key, request)?
            .downcast::<T>()
            .map_err(|_| ContainerError::ProviderTypeMismatch {
                key: key.clone(),
                provided: type_name::<T>(),
            })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.shared.registry.len())
            .field("scopes", &self.shared.scopes)
            .finish()
    }
}

/// Deferred handle to a binding, resolved on first use.
///
/// Holds only a weak reference to the container. Lazy targets are never
/// request-scoped, so no request scope is involved.
///
/// Dereferencing is not supported while a provider is running on the calling
/// thread: `get` fails with `LazyDuringConstruction` there. Keep the handle
/// and call `get` after construction.
pub struct Lazy<T> {
    key: Key,
    container: Weak<ContainerShared>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: Any + Send + Sync> Lazy<T> {
    pub(crate) fn new(key: Key, container: Weak<ContainerShared>) -> Self {
        Self {
            key,
            container,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn get(&self) -> Result<Arc<T>, ContainerError> {
        if let Some(owner) = factory::constructing() {
            return Err(ContainerError::LazyDuringConstruction {
                key: self.key.clone(),
                owner,
            });
        }
        let shared = self
            .container
            .upgrade()
            .ok_or_else(|| ContainerError::ContainerDropped {
                key: self.key.clone(),
            })?;
        Container { shared }.resolve_as(&self.key, None)
    }
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            container: Weak::clone(&self.container),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lazy({})", self.key)
    }
}
