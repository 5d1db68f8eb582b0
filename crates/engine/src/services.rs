//! Service registry and the resolved service set shared by a run.
//!
//! Commands declare the service keys they need (for example `fs`, `git`, or
//! `manifest`). The orchestrator resolves those keys against an explicit
//! [`ServiceRegistry`] value before building the initial context. The engine never
//! instantiates services itself.

use std::{any::Any, fmt, sync::Arc};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::WorkflowError;

type SharedService = Arc<dyn Any + Send + Sync>;

/// Registry of available service implementations keyed by name.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: IndexMap<String, SharedService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a service implementation under `key`.
    pub fn register<T>(&mut self, key: impl Into<String>, service: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.services.insert(key.into(), Arc::new(service));
        self
    }

    /// Register an implementation that is already shared.
    pub fn register_shared<T>(&mut self, key: impl Into<String>, service: Arc<T>) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.services.insert(key.into(), service);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }

    /// Resolve the requested keys into a [`Services`] set.
    ///
    /// Fails on the first unknown key. Keys requested twice resolve once.
    pub fn resolve<I, S>(&self, keys: I) -> Result<Services, WorkflowError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = IndexMap::new();
        for key in keys {
            let key = key.as_ref();
            let service = self.services.get(key).ok_or_else(|| WorkflowError::unknown_service(key))?;
            resolved.insert(key.to_string(), Arc::clone(service));
        }
        debug!(services = ?resolved.keys().collect::<Vec<_>>(), "resolved workflow services");
        Ok(Services { services: resolved })
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ServiceRegistry").field("keys", &self.services.keys()).finish()
    }
}

/// Services resolved for a single run.
#[derive(Clone, Default)]
pub struct Services {
    services: IndexMap<String, SharedService>,
}

impl Services {
    /// Empty set, for runs that need no services.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a service and downcast it to its concrete type.
    pub fn get<T>(&self, key: &str) -> Result<Arc<T>, WorkflowError>
    where
        T: Any + Send + Sync,
    {
        let service = self.services.get(key).ok_or_else(|| WorkflowError::unknown_service(key))?;
        Arc::clone(service)
            .downcast::<T>()
            .map_err(|_| WorkflowError::ServiceType { key: key.to_string() })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Services").field("keys", &self.services.keys()).finish()
    }
}
