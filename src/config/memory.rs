//! In-memory configuration source.

use std::collections::HashMap;

use super::ConfigResult;
use super::source::ConfigSource;

/// Code-defined configuration; handy in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryConfigSource {
    data: HashMap<String, String>,
}

impl MemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: HashMap<String, String>) -> Self {
        Self { data }
    }

    /// Add a value (builder pattern)
    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait::async_trait]
impl ConfigSource for MemoryConfigSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        Ok(self.data.get(key).cloned())
    }
}
