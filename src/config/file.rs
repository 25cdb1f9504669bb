//! JSON file configuration source.

use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;

use super::ConfigResult;
use super::source::ConfigSource;

/// Reads a JSON object from disk once and serves dot-path lookups from it.
///
/// A missing file behaves like an empty object.
pub struct FileConfigSource {
    path: PathBuf,
    data: OnceCell<serde_json::Value>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: OnceCell::new(),
        }
    }

    /// `<config dir>/authfetch/config.json` for the current user, if the
    /// platform has a config directory.
    pub fn default_location() -> Option<Self> {
        directories::ProjectDirs::from("", "", "authfetch")
            .map(|dirs| Self::new(dirs.config_dir().join("config.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ConfigResult<serde_json::Value> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl std::fmt::Debug for FileConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigSource")
            .field("path", &self.path)
            .field("loaded", &self.data.initialized())
            .finish()
    }
}

#[async_trait::async_trait]
impl ConfigSource for FileConfigSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        let data = self.data.get_or_try_init(|| self.load()).await?;

        let value = key
            .split('.')
            .try_fold(data, |current, part| current.get(part));

        Ok(match value {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(v) => Some(v.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_source_reads_nested_keys() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let config = serde_json::json!({
            "base_url": "https://app.example.com",
            "timeout_ms": 15000,
            "identity": {
                "fast_ttl_ms": 2000
            }
        });
        tokio::fs::write(&config_path, config.to_string())
            .await
            .unwrap();

        let source = FileConfigSource::new(config_path);

        assert_eq!(
            source.get_raw("base_url").await.unwrap(),
            Some("https://app.example.com".to_string())
        );
        assert_eq!(
            source.get_raw("timeout_ms").await.unwrap(),
            Some("15000".to_string())
        );
        assert_eq!(
            source.get_raw("identity.fast_ttl_ms").await.unwrap(),
            Some("2000".to_string())
        );
        assert_eq!(source.get_raw("identity.missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_source_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let source = FileConfigSource::new(temp_dir.path().join("nonexistent.json"));

        assert_eq!(source.get_raw("base_url").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_source_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.json");
        tokio::fs::write(&config_path, "{ not json").await.unwrap();

        let source = FileConfigSource::new(config_path);
        assert!(source.get_raw("base_url").await.is_err());
    }
}
