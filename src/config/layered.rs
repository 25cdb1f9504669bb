//! Layered configuration source.
//!
//! Chains multiple sources with priority ordering. Earlier sources have
//! higher priority.

use super::ConfigResult;
use super::source::ConfigSource;

/// First source that knows a key wins.
#[derive(Default)]
pub struct LayeredConfig {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source (first added = highest priority)
    pub fn source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait::async_trait]
impl ConfigSource for LayeredConfig {
    fn name(&self) -> &str {
        "layered"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        for source in &self.sources {
            if let Some(value) = source.get_raw(key).await? {
                tracing::trace!(key, source = source.name(), "Config value resolved");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
