use crate::dependencies::registry::BindingRegistry;
use crate::dependencies::types::{Binding, ConstructionPlan, DependencyScope, EdgeKind, Key};
use crate::errors::ContainerError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Walks declared dependencies and produces construction plans.
///
/// Plans are memoized per root key. Bindings never change after the registry
/// is sealed, so a cached plan stays valid for the container's lifetime.
pub struct DependencyResolver {
    plans: RwLock<HashMap<Key, Arc<ConstructionPlan>>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self {
            plans: RwLock::new(HashMap::new()),
        }
    }

    pub fn plan(
        &self,
        registry: &BindingRegistry,
        root: &Key,
    ) -> Result<Arc<ConstructionPlan>, ContainerError> {
        if let Some(plan) = self.plans.read().get(root) {
            return Ok(Arc::clone(plan));
        }

        let plan = Arc::new(build_plan(registry, root)?);
        log::debug!("planned {} in {} steps", root, plan.steps.len());

        let mut plans = self.plans.write();
        Ok(Arc::clone(plans.entry(root.clone()).or_insert(plan)))
    }

    pub fn cached_plans(&self) -> usize {
        self.plans.read().len()
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first walk of strict edges from `root`.
pub fn build_plan(registry: &BindingRegistry, root: &Key) -> Result<ConstructionPlan, ContainerError> {
    let mut walk = Walk {
        registry,
        stack: Vec::new(),
        visited: HashMap::new(),
        order: Vec::new(),
    };
    walk.visit(root)?;
    Ok(ConstructionPlan {
        root: root.clone(),
        steps: walk.order,
    })
}

struct Walk<'r> {
    registry: &'r BindingRegistry,
    stack: Vec<Key>,
    // key -> request-scoped key that bounds its lifetime, if any
    visited: HashMap<Key, Option<Key>>,
    order: Vec<Key>,
}

impl<'r> Walk<'r> {
    fn visit(&mut self, key: &Key) -> Result<Option<Key>, ContainerError> {
        if let Some(start) = self.stack.iter().position(|entry| entry == key) {
            let mut cycle = self.stack[start..].to_vec();
            cycle.push(key.clone());
            return Err(ContainerError::CyclicDependency { cycle });
        }
        if let Some(bound) = self.visited.get(key) {
            return Ok(bound.clone());
        }

        let binding = self.lookup(key)?;
        self.stack.push(key.clone());

        let mut narrowest: Option<Key> = None;
        for dependency in binding.provider.dependencies() {
            match dependency.kind {
                EdgeKind::Strict => {
                    let bound = self.visit(&dependency.key)?;
                    if let Some(request_key) = bound {
                        if binding.scope == DependencyScope::Singleton {
                            return Err(ContainerError::ScopeMismatch {
                                holder: key.clone(),
                                dependency: request_key,
                            });
                        }
                        narrowest.get_or_insert(request_key);
                    }
                }
                EdgeKind::Lazy => {
                    let target = self.lookup(&dependency.key)?;
                    if target.scope == DependencyScope::Request {
                        return Err(ContainerError::ScopeMismatch {
                            holder: key.clone(),
                            dependency: dependency.key.clone(),
                        });
                    }
                }
            }
        }

        self.stack.pop();
        let bound = match binding.scope {
            DependencyScope::Singleton => None,
            DependencyScope::Request => Some(key.clone()),
            DependencyScope::Transient => narrowest,
        };
        self.visited.insert(key.clone(), bound.clone());
        self.order.push(key.clone());
        Ok(bound)
    }

    fn lookup(&self, key: &Key) -> Result<&'r Binding, ContainerError> {
        self.registry
            .lookup(key)
            .map_err(|_| ContainerError::UnboundKey {
                key: key.clone(),
                path: self.stack.clone(),
            })
    }
}
