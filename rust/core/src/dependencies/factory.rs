use crate::dependencies::container::{ContainerShared, Lazy};
use crate::dependencies::types::{Binding, BoxError, Dependency, EdgeKind, Instance, Key};
use crate::errors::{panic_message, ContainerError, InjectionError};
use std::any::{type_name, Any};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

thread_local! {
    // Keys whose providers are running on this thread, outermost first.
    static CONSTRUCTING: RefCell<Vec<Key>> = const { RefCell::new(Vec::new()) };
}

/// Read-only view a provider gets over its resolved dependencies.
pub struct Dependencies<'a> {
    owner: &'a Key,
    declared: &'a [Dependency],
    resolved: &'a HashMap<Key, Instance>,
    container: &'a Weak<ContainerShared>,
}

impl<'a> Dependencies<'a> {
    pub fn owner(&self) -> &Key {
        self.owner
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, BoxError> {
        self.get_key(&Key::of::<T>())
    }

    pub fn get_named<T: Any + Send + Sync>(
        &self,
        qualifier: impl Into<Cow<'static, str>>,
    ) -> Result<Arc<T>, BoxError> {
        self.get_key(&Key::named::<T>(qualifier))
    }

    /// Clones the value out, for bindings that are themselves handles such as
    /// `Arc<dyn Trait>`.
    pub fn cloned<T: Any + Send + Sync + Clone>(&self) -> Result<T, BoxError> {
        self.get::<T>().map(|value| (*value).clone())
    }

    pub fn get_key<T: Any + Send + Sync>(&self, key: &Key) -> Result<Arc<T>, BoxError> {
        self.declared(key, EdgeKind::Strict)?;
        let instance = self.resolved.get(key).ok_or_else(|| InjectionError::Missing {
            owner: self.owner.clone(),
            key: key.clone(),
        })?;
        Arc::clone(instance).downcast::<T>().map_err(|_| {
            InjectionError::TypeMismatch {
                key: key.clone(),
                expected: type_name::<T>(),
            }
            .into()
        })
    }

    pub fn lazy<T: Any + Send + Sync>(&self) -> Result<Lazy<T>, BoxError> {
        self.lazy_key(Key::of::<T>())
    }

    pub fn lazy_key<T: Any + Send + Sync>(&self, key: Key) -> Result<Lazy<T>, BoxError> {
        self.declared(&key, EdgeKind::Lazy)?;
        Ok(Lazy::new(key, Weak::clone(self.container)))
    }

    fn declared(&self, key: &Key, kind: EdgeKind) -> Result<(), InjectionError> {
        if self
            .declared
            .iter()
            .any(|dep| dep.kind == kind && dep.key == *key)
        {
            Ok(())
        } else {
            Err(InjectionError::Undeclared {
                owner: self.owner.clone(),
                key: key.clone(),
            })
        }
    }
}

/// Runs a binding's provider against already-resolved dependencies.
///
/// Provider errors and panics both come back as `Construction`. The factory
/// keeps no reference to what it built.
pub(crate) fn construct(
    binding: &Binding,
    resolved: &HashMap<Key, Instance>,
    container: &Weak<ContainerShared>,
) -> Result<Instance, ContainerError> {
    let _guard = ConstructionGuard::enter(&binding.key);
    let deps = Dependencies {
        owner: &binding.key,
        declared: binding.provider.dependencies(),
        resolved,
        container,
    };

    match catch_unwind(AssertUnwindSafe(|| binding.provider.invoke(&deps))) {
        Ok(Ok(instance)) => {
            log::trace!("constructed {}", binding.key);
            Ok(instance)
        }
        Ok(Err(source)) => Err(ContainerError::Construction {
            key: binding.key.clone(),
            source,
        }),
        Err(payload) => Err(ContainerError::Construction {
            key: binding.key.clone(),
            source: format!("provider panicked: {}", panic_message(payload.as_ref())).into(),
        }),
    }
}

/// The chain that would loop if `key` were constructed now on this thread.
pub(crate) fn reentrant_cycle(key: &Key) -> Option<Vec<Key>> {
    CONSTRUCTING.with(|stack| {
        let stack = stack.borrow();
        stack.iter().position(|entry| entry == key).map(|start| {
            let mut cycle = stack[start..].to_vec();
            cycle.push(key.clone());
            cycle
        })
    })
}

/// Innermost key whose provider is running on this thread.
pub(crate) fn constructing() -> Option<Key> {
    CONSTRUCTING.with(|stack| stack.borrow().last().cloned())
}

struct ConstructionGuard;

impl ConstructionGuard {
    fn enter(key: &Key) -> Self {
        CONSTRUCTING.with(|stack| stack.borrow_mut().push(key.clone()));
        ConstructionGuard
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
