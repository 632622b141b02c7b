//! # In-Memory Configuration Store
//!
//! Thread-safe map of configurations. Contents are lost on restart.

use crate::configuration::{ConfigurationStore, FormConfiguration, StoreError};
use crate::{ConfigKey, LocationId};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// Configuration store backed by a `RwLock<HashMap>`
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigurationStore {
    configurations: Arc<RwLock<HashMap<ConfigKey, FormConfiguration>>>,
}

impl InMemoryConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable {
        message: "configuration map lock poisoned".to_string(),
    }
}

#[async_trait]
impl ConfigurationStore for InMemoryConfigurationStore {
    async fn get(&self, key: &ConfigKey) -> Result<Option<FormConfiguration>, StoreError> {
        let configurations = self.configurations.read().map_err(poisoned)?;
        Ok(configurations.get(key).cloned())
    }

    async fn put(
        &self,
        mut configuration: FormConfiguration,
    ) -> Result<Option<FormConfiguration>, StoreError> {
        let mut configurations = self.configurations.write().map_err(poisoned)?;

        if let Some(existing) = configurations.get(&configuration.key) {
            configuration.created_at = existing.created_at;
        }

        Ok(configurations.insert(configuration.key.clone(), configuration))
    }

    async fn delete(&self, key: &ConfigKey) -> Result<Option<FormConfiguration>, StoreError> {
        let mut configurations = self.configurations.write().map_err(poisoned)?;
        Ok(configurations.remove(key))
    }

    async fn find_by_location(
        &self,
        location_id: &LocationId,
    ) -> Result<Option<FormConfiguration>, StoreError> {
        let configurations = self.configurations.read().map_err(poisoned)?;

        Ok(configurations
            .values()
            .filter(|configuration| configuration.location_id() == location_id)
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.key.cmp(&b.key))
            })
            .cloned())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let configurations = self.configurations.read().map_err(poisoned)?;
        Ok(configurations.len())
    }
}

#[cfg(test)]
#[path = "memory_configuration_store_tests.rs"]
mod tests;
