//! Immutable workflow context.
//!
//! A [`WorkflowContext`] carries the run's start time, its read-only configuration,
//! the resolved services, and the data accumulated by tasks. Contexts are never
//! mutated in place: every update produces a new instance through [`WorkflowContext::fork`]
//! or [`WorkflowContext::fork_multiple`]. Configuration and services are shared by
//! `Arc` across all forks of a run; only the data map is copied.
//!
//! ```rust
//! use relay_engine::WorkflowContext;
//! use serde_json::json;
//!
//! let context = WorkflowContext::new(());
//! let forked = context.fork("version", json!("1.2.0"));
//!
//! assert_eq!(forked.get("version").unwrap(), &json!("1.2.0"));
//! assert!(context.get("version").is_err());
//! ```

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{error::WorkflowError, services::Services};

/// Data accumulated by tasks, keyed by name in insertion order.
pub type ContextData = IndexMap<String, Value>;

/// Immutable snapshot of a run's state.
pub struct WorkflowContext<C> {
    start_time: DateTime<Utc>,
    config: Arc<C>,
    services: Arc<Services>,
    data: Arc<ContextData>,
}

impl<C> WorkflowContext<C> {
    /// Creates a context with no services and empty data.
    pub fn new(config: C) -> Self {
        Self::with_services(config, Services::empty())
    }

    /// Creates a context with the given resolved services and empty data.
    pub fn with_services(config: C, services: Services) -> Self {
        Self {
            start_time: Utc::now(),
            config: Arc::new(config),
            services: Arc::new(services),
            data: Arc::new(ContextData::new()),
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Read-only view of the accumulated data.
    pub fn data(&self) -> &ContextData {
        &self.data
    }

    /// Returns the value stored under `key`, or [`WorkflowError::NotFound`].
    pub fn get(&self, key: &str) -> Result<&Value, WorkflowError> {
        self.data.get(key).ok_or_else(|| WorkflowError::not_found(key))
    }

    /// Deserializes the value stored under `key` into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, WorkflowError> {
        let value = self.get(key)?;
        serde_json::from_value(value.clone()).map_err(|error| WorkflowError::DataType {
            key: key.to_string(),
            message: error.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns a new context equal to this one except for `key`.
    ///
    /// When the value is unchanged the same instance is returned.
    pub fn fork(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        if self.data.get(&key) == Some(&value) {
            return self.clone();
        }

        let mut data = ContextData::clone(&self.data);
        data.insert(key, value);
        self.with_data(data)
    }

    /// Batched [`fork`](Self::fork). Updates apply in order, so a repeated key keeps
    /// its last value. When the result equals this context's data, the same instance
    /// is returned.
    pub fn fork_multiple<I, K>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut data = ContextData::clone(&self.data);
        for (key, value) in updates {
            data.insert(key.into(), value);
        }
        if data == *self.data {
            return self.clone();
        }
        self.with_data(data)
    }

    /// True when both contexts share the same data instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// True when both contexts belong to the same run (shared config and services).
    pub fn shares_run_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.config, &other.config) && Arc::ptr_eq(&self.services, &other.services)
    }

    fn with_data(&self, data: ContextData) -> Self {
        Self {
            start_time: self.start_time,
            config: Arc::clone(&self.config),
            services: Arc::clone(&self.services),
            data: Arc::new(data),
        }
    }
}

impl<C> Clone for WorkflowContext<C> {
    fn clone(&self) -> Self {
        Self {
            start_time: self.start_time,
            config: Arc::clone(&self.config),
            services: Arc::clone(&self.services),
            data: Arc::clone(&self.data),
        }
    }
}

impl<C> fmt::Debug for WorkflowContext<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkflowContext")
            .field("start_time", &self.start_time)
            .field("services", &self.services)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}
