//! Persistent per-user configuration (`~/.molbridge/config.json`).

use std::{
    collections::BTreeMap,
    fs,
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Stored keys. Unknown keys survive a load/save cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredConfig {
    /// Python interpreter recorded by `setup`, used to run `python -m pymol`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_path: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl StoredConfig {
    pub fn is_empty(&self) -> bool {
        self.python_path.is_none() && self.extra.is_empty()
    }

    /// All keys as display strings, in a stable order.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::with_capacity(self.extra.len() + 1);
        if let Some(path) = &self.python_path {
            entries.push(("python_path".to_string(), path.clone()));
        }
        for (key, value) in &self.extra {
            let shown = value
                .as_str()
                .map_or_else(|| value.to_string(), ToString::to_string);
            entries.push((key.clone(), shown));
        }
        entries
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored configuration. A missing file reads as empty.
    pub fn load(&self) -> Result<StoredConfig> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(StoredConfig::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoredConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Merge `update` over what is already stored and write it back.
    pub fn save(&self, update: &StoredConfig) -> Result<StoredConfig> {
        let mut merged = self.load()?;
        if update.python_path.is_some() {
            merged.python_path.clone_from(&update.python_path);
        }
        merged
            .extra
            .extend(update.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&merged)? + "\n")?;
        tracing::debug!("Saved configuration to {}", self.path.display());
        Ok(merged)
    }

    /// Configured interpreter, if any. Unreadable config counts as unset.
    pub fn python_path(&self) -> Option<String> {
        match self.load() {
            Ok(config) => config.python_path,
            Err(e) => {
                tracing::warn!("Ignoring unreadable {}: {e}", self.path.display());
                None
            }
        }
    }

    pub fn set_python_path(&self, python: &str) -> Result<()> {
        self.save(&StoredConfig {
            python_path: Some(python.to_string()),
            ..StoredConfig::default()
        })
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("nested").join("config.json"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.python_path(), None);
    }

    #[test]
    fn test_python_path_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set_python_path("/opt/conda/bin/python").unwrap();
        assert_eq!(
            store.python_path().as_deref(),
            Some("/opt/conda/bin/python")
        );
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            json!({ "theme": "dark", "python_path": "/usr/bin/python3" }).to_string(),
        )
        .unwrap();

        store.set_python_path("/usr/local/bin/python3").unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.python_path.as_deref(), Some("/usr/local/bin/python3"));
        assert_eq!(config.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(
            config.entries(),
            vec![
                ("python_path".to_string(), "/usr/local/bin/python3".to_string()),
                ("theme".to_string(), "dark".to_string()),
            ]
        );
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.load().is_err());
        assert_eq!(store.python_path(), None);
    }
}
