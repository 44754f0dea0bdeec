//! Suite loading
//!
//! Suites are compiled into the binary and registered in a [`SuiteCatalog`]
//! under a module name. A manifest file selects suites from the catalog.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::config::is_yaml_file;
use crate::error::SeismographError;
use crate::models::Runnable;
use crate::suite::Suite;

/// Builds a fresh suite. Called once per load.
pub type SuiteConstructor = fn() -> Suite;

pub trait SuiteLoader: Send + Sync {
    fn load_from_module(&self, module: &str) -> Result<Vec<Suite>>;

    fn load_from_path(&self, path: &Path) -> Result<Vec<Suite>>;
}

/// Suite manifest file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Restrict lookup to one module
    #[serde(default)]
    pub module: Option<String>,

    /// Suite names to load; empty means the whole module
    #[serde(default)]
    pub suites: Vec<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite manifest: {}", path.display()))?;

        let parsed = if is_yaml_file(path) {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| {
            SeismographError::Manifest {
                path: path.to_path_buf(),
                reason,
            }
            .into()
        })
    }
}

#[derive(Default, Clone)]
pub struct SuiteCatalog {
    modules: BTreeMap<String, Vec<SuiteConstructor>>,
}

impl SuiteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, module: impl Into<String>, constructor: SuiteConstructor) -> Self {
        self.modules.entry(module.into()).or_default().push(constructor);
        self
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    fn build_module(&self, module: &str) -> Result<Vec<Suite>> {
        let constructors = self
            .modules
            .get(module)
            .ok_or_else(|| SeismographError::UnknownModule(module.to_string()))?;
        Ok(constructors.iter().map(|build| build()).collect())
    }

    fn find(&self, module: Option<&str>, name: &str) -> Result<Suite> {
        let candidates: Vec<Suite> = match module {
            Some(module) => self.build_module(module)?,
            None => self
                .modules
                .values()
                .flatten()
                .map(|build| build())
                .collect(),
        };

        candidates
            .into_iter()
            .find(|suite| suite.name() == name)
            .ok_or_else(|| SeismographError::UnknownSuite(name.to_string()).into())
    }
}

impl SuiteLoader for SuiteCatalog {
    fn load_from_module(&self, module: &str) -> Result<Vec<Suite>> {
        let suites = self.build_module(module)?;
        debug!("Loaded {} suites from module \"{}\"", suites.len(), module);
        Ok(suites)
    }

    fn load_from_path(&self, path: &Path) -> Result<Vec<Suite>> {
        let manifest = Manifest::load(path)?;

        let suites = match (&manifest.module, manifest.suites.is_empty()) {
            (Some(module), true) => self.build_module(module)?,
            (None, true) => {
                return Err(SeismographError::Manifest {
                    path: path.to_path_buf(),
                    reason: "neither module nor suites given".to_string(),
                }
                .into())
            }
            (module, false) => manifest
                .suites
                .iter()
                .map(|name| self.find(module.as_deref(), name))
                .collect::<Result<Vec<_>>>()?,
        };

        debug!("Loaded {} suites from {}", suites.len(), path.display());
        Ok(suites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn smoke() -> Suite {
        Suite::new("smoke").case("ping", || Ok(()))
    }

    fn storage() -> Suite {
        Suite::new("storage").case("write", || Ok(()))
    }

    fn billing() -> Suite {
        Suite::new("billing").case("charge", || Ok(()))
    }

    fn catalog() -> SuiteCatalog {
        SuiteCatalog::new()
            .register("core", smoke)
            .register("core", storage)
            .register("payments", billing)
    }

    fn names(suites: &[Suite]) -> Vec<&str> {
        suites.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_load_from_module() {
        let suites = catalog().load_from_module("core").unwrap();
        assert_eq!(names(&suites), vec!["smoke", "storage"]);

        let err = catalog().load_from_module("missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SeismographError>(),
            Some(SeismographError::UnknownModule(m)) if m == "missing"
        ));
    }

    #[test]
    fn test_load_from_yaml_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("suites.yaml");
        std::fs::write(&path, "suites:\n  - billing\n  - smoke\n").unwrap();

        let suites = catalog().load_from_path(&path).unwrap();
        assert_eq!(names(&suites), vec!["billing", "smoke"]);
    }

    #[test]
    fn test_load_from_json_manifest_module_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("suites.json");
        std::fs::write(&path, r#"{"module": "payments"}"#).unwrap();

        let suites = catalog().load_from_path(&path).unwrap();
        assert_eq!(names(&suites), vec!["billing"]);
    }

    #[test]
    fn test_manifest_errors() {
        let dir = tempdir().unwrap();

        let scoped = dir.path().join("scoped.yaml");
        std::fs::write(&scoped, "module: payments\nsuites: [smoke]\n").unwrap();
        let err = catalog().load_from_path(&scoped).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SeismographError>(),
            Some(SeismographError::UnknownSuite(_))
        ));

        let empty = dir.path().join("empty.yaml");
        std::fs::write(&empty, "{}\n").unwrap();
        assert!(catalog().load_from_path(&empty).is_err());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let err = catalog().load_from_path(&broken).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SeismographError>(),
            Some(SeismographError::Manifest { .. })
        ));
    }
}
