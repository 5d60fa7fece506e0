use crate::dependencies::container::ContainerShared;
use crate::dependencies::factory;
use crate::dependencies::registry::BindingRegistry;
use crate::dependencies::types::{ConstructionPlan, DependencyScope, Instance, Key};
use crate::errors::ContainerError;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique request id.
pub fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type ReleaseHook = Box<dyn FnOnce(u64, usize) + Send>;

/// Per-request instance cache.
///
/// Owned by exactly one request. Cached instances are dropped when the scope
/// is released, which happens once: explicitly through [`RequestScope::release`]
/// or when the scope is dropped on any exit path.
pub struct RequestScope {
    id: u64,
    instances: HashMap<Key, Instance>,
    released: bool,
    on_release: Option<ReleaseHook>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::with_id(next_request_id())
    }

    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            instances: HashMap::new(),
            released: false,
            on_release: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Registers a callback run once on release with the id and the number of
    /// instances dropped.
    pub fn on_release(&mut self, hook: impl FnOnce(u64, usize) + Send + 'static) {
        self.on_release = Some(Box::new(hook));
    }

    pub fn get(&self, key: &Key) -> Option<&Instance> {
        self.instances.get(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.instances.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn insert(&mut self, key: Key, instance: Instance) {
        self.instances.insert(key, instance);
    }

    /// Drops every cached instance. Later calls do nothing and return 0.
    pub fn release(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.released = true;
        let count = self.instances.len();
        self.instances.clear();
        log::trace!("request scope {} released {} instances", self.id, count);
        if let Some(hook) = self.on_release.take() {
            hook(self.id, count);
        }
        count
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("instances", &self.instances.len())
            .field("released", &self.released)
            .finish()
    }
}

/// Owns singleton instances and executes construction plans scope by scope.
pub struct ScopeManager {
    // fixed at build time, so lookups need no lock
    singletons: HashMap<Key, OnceCell<Instance>>,
}

impl ScopeManager {
    pub fn new(registry: &BindingRegistry) -> Self {
        let singletons = registry
            .keys()
            .filter(|key| {
                registry
                    .lookup(key)
                    .map(|binding| binding.scope == DependencyScope::Singleton)
                    .unwrap_or(false)
            })
            .map(|key| (key.clone(), OnceCell::new()))
            .collect();
        Self { singletons }
    }

    pub fn singleton(&self, key: &Key) -> Option<&Instance> {
        self.singletons.get(key).and_then(OnceCell::get)
    }

    pub fn constructed_singletons(&self) -> usize {
        self.singletons.values().filter(|cell| cell.get().is_some()).count()
    }

    /// Produces the plan's root, reusing whatever its scopes already cache.
    ///
    /// Request-scoped instances built here are committed to `request` only if
    /// the whole plan succeeds.
    pub(crate) fn resolve(
        &self,
        plan: &ConstructionPlan,
        registry: &BindingRegistry,
        container: &Weak<ContainerShared>,
        mut request: Option<&mut RequestScope>,
    ) -> Result<Instance, ContainerError> {
        let needed = self.needed_steps(plan, registry, request.as_deref())?;

        let mut resolved: HashMap<Key, Instance> = HashMap::with_capacity(needed.len());
        let mut staged: Vec<(Key, Instance)> = Vec::new();

        for key in plan.steps.iter().filter(|key| needed.contains(*key)) {
            let binding = registry.lookup(key)?;
            let instance = match binding.scope {
                DependencyScope::Singleton => {
                    let cell = self.singletons.get(key).ok_or_else(|| {
                        ContainerError::UnboundKey {
                            key: key.clone(),
                            path: Vec::new(),
                        }
                    })?;
                    match cell.get() {
                        Some(instance) => instance.clone(),
                        None => {
                            check_reentry(key)?;
                            cell.get_or_try_init(|| {
                                log::debug!("constructing singleton {}", key);
                                factory::construct(binding, &resolved, container)
                            })?
                            .clone()
                        }
                    }
                }
                DependencyScope::Request => {
                    let scope = request
                        .as_deref()
                        .ok_or_else(|| ContainerError::MissingRequestScope { key: key.clone() })?;
                    match scope.get(key) {
                        Some(instance) => instance.clone(),
                        None => {
                            check_reentry(key)?;
                            let instance = factory::construct(binding, &resolved, container)?;
                            staged.push((key.clone(), instance.clone()));
                            instance
                        }
                    }
                }
                DependencyScope::Transient => {
                    check_reentry(key)?;
                    factory::construct(binding, &resolved, container)?
                }
            };
            resolved.insert(key.clone(), instance);
        }

        if let Some(scope) = request.as_deref_mut() {
            for (key, instance) in staged {
                scope.insert(key, instance);
            }
        }

        resolved
            .remove(&plan.root)
            .ok_or_else(|| ContainerError::UnboundKey {
                key: plan.root.clone(),
                path: Vec::new(),
            })
    }

    /// Walks the plan from the root down, skipping the subtrees of instances a
    /// scope already caches.
    fn needed_steps<'p>(
        &self,
        plan: &'p ConstructionPlan,
        registry: &BindingRegistry,
        request: Option<&RequestScope>,
    ) -> Result<HashSet<&'p Key>, ContainerError> {
        let mut needed: HashSet<&Key> = HashSet::new();
        needed.insert(&plan.root);

        for key in plan.steps.iter().rev() {
            if !needed.contains(key) {
                continue;
            }
            let binding = registry.lookup(key)?;
            let cached = match binding.scope {
                DependencyScope::Singleton => self.singleton(key).is_some(),
                DependencyScope::Request => match request {
                    Some(scope) => scope.contains(key),
                    None => return Err(ContainerError::MissingRequestScope { key: key.clone() }),
                },
                DependencyScope::Transient => false,
            };
            if !cached {
                for dependency in binding.provider.strict_dependencies() {
                    if let Some(position) = plan.position(dependency) {
                        needed.insert(&plan.steps[position]);
                    }
                }
            }
        }
        Ok(needed)
    }
}

fn check_reentry(key: &Key) -> Result<(), ContainerError> {
    match factory::reentrant_cycle(key) {
        Some(cycle) => Err(ContainerError::CyclicDependency { cycle }),
        None => Ok(()),
    }
}

impl fmt::Debug for ScopeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeManager")
            .field("singletons", &self.singletons.len())
            .field("constructed", &self.constructed_singletons())
            .finish()
    }
}
