use crate::dependencies::types::{Binding, DependencyScope, Key, Provider};
use crate::errors::ContainerError;
use std::collections::HashMap;

/// Declared bindings, writable until sealed and read-only afterwards.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    bindings: HashMap<Key, Binding>,
    order: Vec<Key>,
    sealed: bool,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        key: Key,
        provider: Provider,
        scope: DependencyScope,
    ) -> Result<(), ContainerError> {
        if self.sealed {
            return Err(ContainerError::RegistrySealed { key });
        }
        if self.bindings.contains_key(&key) {
            return Err(ContainerError::DuplicateBinding { key });
        }
        let (produces, provided) = provider.produces();
        if produces != key.type_id() {
            return Err(ContainerError::ProviderTypeMismatch { key, provided });
        }

        log::debug!("registering {} binding for {}", scope, key);
        self.order.push(key.clone());
        self.bindings.insert(
            key.clone(),
            Binding {
                key,
                provider,
                scope,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, key: &Key) -> Result<&Binding, ContainerError> {
        self.bindings
            .get(key)
            .ok_or_else(|| ContainerError::UnboundKey {
                key: key.clone(),
                path: Vec::new(),
            })
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.bindings.contains_key(key)
    }

    /// Keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn seal(&mut self) {
        if !self.sealed {
            log::debug!("sealing registry with {} bindings", self.bindings.len());
        }
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
