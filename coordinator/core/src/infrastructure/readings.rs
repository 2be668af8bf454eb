// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Built-in reading providers and the name registry a leaf samples from.
//!
//! | Name | Reading |
//! |------|---------|
//! | `zero` | `0`, unitless |
//! | `random` | uniform `[0, 1)`, unitless |
//! | configured static names | the configured value and unit |

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::node_config::ReadingsConfig;
use crate::domain::reading::{ProviderError, ProviderLookup, ReadingProvider};
use crate::domain::work::Reading;

pub struct ZeroReading;

#[async_trait]
impl ReadingProvider for ZeroReading {
    async fn read(&self) -> Result<Reading, ProviderError> {
        Ok(Reading::unitless(0))
    }
}

pub struct RandomReading;

#[async_trait]
impl ReadingProvider for RandomReading {
    async fn read(&self) -> Result<Reading, ProviderError> {
        let value: f64 = rand::rng().random();
        Ok(Reading::unitless(value))
    }
}

pub struct StaticReading {
    reading: Reading,
}

impl StaticReading {
    pub fn new(value: serde_json::Value, unit: Option<String>) -> Self {
        Self {
            reading: Reading {
                value: Some(value),
                unit,
            },
        }
    }
}

#[async_trait]
impl ReadingProvider for StaticReading {
    async fn read(&self) -> Result<Reading, ProviderError> {
        Ok(self.reading.clone())
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Arc<dyn ReadingProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `zero` and `random`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("zero", Arc::new(ZeroReading));
        registry.register("random", Arc::new(RandomReading));
        registry
    }

    /// Built-ins plus the static readings from config.
    pub fn from_config(config: &ReadingsConfig) -> Self {
        let registry = Self::with_builtins();
        for (name, reading) in &config.static_values {
            registry.register(
                name.clone(),
                Arc::new(StaticReading::new(reading.value.clone(), reading.unit.clone())),
            );
        }
        registry
    }

    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn ReadingProvider>) {
        self.providers.write().insert(name.into(), provider);
    }
}

impl ProviderLookup for ProviderRegistry {
    fn provider(&self, name: &str) -> Option<Arc<dyn ReadingProvider>> {
        self.providers.read().get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node_config::StaticReadingConfig;

    #[tokio::test]
    async fn test_builtins() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["random".to_string(), "zero".to_string()]);

        let zero = registry.provider("zero").unwrap().read().await.unwrap();
        assert_eq!(zero.value, Some(serde_json::json!(0)));

        let random = registry.provider("random").unwrap().read().await.unwrap();
        let value = random.value.and_then(|v| v.as_f64()).unwrap();
        assert!((0.0..1.0).contains(&value));

        assert!(registry.provider("temperature").is_none());
    }

    #[tokio::test]
    async fn test_static_readings_from_config() {
        let mut config = ReadingsConfig::default();
        config.static_values.insert(
            "temperature".to_string(),
            StaticReadingConfig {
                value: serde_json::json!(21.5),
                unit: Some("degC".to_string()),
            },
        );
        let registry = ProviderRegistry::from_config(&config);
        let reading = registry.provider("temperature").unwrap().read().await.unwrap();
        assert_eq!(reading, Reading::new(21.5, "degC"));
    }
}
