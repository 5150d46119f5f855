/// Language Runtime Registry
///
/// Static catalog: language id → runtime adapter. Built once at start-up,
/// read-only afterwards, so it is shared behind an `Arc` without locking.
/// Lookups are case-insensitive on the language id.

use crate::catalog;
use crate::runtime::{LanguageRuntime, RuntimeVersion};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Caller errors: the request names something we do not run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Language not found: {0}")]
    LanguageNotFound(String),

    #[error("Unsupported {language} version: {version}. Supported versions are: {}", supported.join(", "))]
    VersionNotSupported {
        language: String,
        version: String,
        supported: Vec<String>,
    },
}

/// A runtime pinned to one of its supported versions
#[derive(Debug, Clone)]
pub struct ResolvedRuntime {
    pub runtime: Arc<LanguageRuntime>,
    pub version: RuntimeVersion,
}

impl ResolvedRuntime {
    pub fn id(&self) -> &str {
        &self.runtime.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    runtimes: BTreeMap<String, Arc<LanguageRuntime>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every builtin adapter
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(catalog::python());
        registry.register(catalog::java());
        registry
    }

    /// Register (or replace) a runtime under its lowercased id
    pub fn register(&mut self, runtime: LanguageRuntime) {
        self.runtimes
            .insert(runtime.id.to_lowercase(), Arc::new(runtime));
    }

    pub fn get(&self, language: &str) -> Result<&Arc<LanguageRuntime>, RegistryError> {
        self.runtimes
            .get(&language.to_lowercase())
            .ok_or_else(|| RegistryError::LanguageNotFound(language.to_string()))
    }

    /// Language ids in sorted order
    pub fn list_languages(&self) -> Vec<&str> {
        self.runtimes.keys().map(String::as_str).collect()
    }

    pub fn list_versions(&self, language: &str) -> Result<Vec<&str>, RegistryError> {
        Ok(self.get(language)?.version_names())
    }

    pub fn resolve(&self, language: &str, version: &str) -> Result<ResolvedRuntime, RegistryError> {
        let runtime = self.get(language)?;
        let pinned = runtime.version(version).cloned().ok_or_else(|| {
            RegistryError::VersionNotSupported {
                language: runtime.id.clone(),
                version: version.to_string(),
                supported: runtime.versions.iter().map(|v| v.version.clone()).collect(),
            }
        })?;

        Ok(ResolvedRuntime {
            runtime: Arc::clone(runtime),
            version: pinned,
        })
    }

    /// Resolve, falling back to the runtime's default version
    pub fn resolve_or_default(
        &self,
        language: &str,
        version: Option<&str>,
    ) -> Result<ResolvedRuntime, RegistryError> {
        match version {
            Some(v) if !v.trim().is_empty() => self.resolve(language, v.trim()),
            _ => {
                let runtime = self.get(language)?;
                let default = runtime.default_version.clone();
                self.resolve(language, &default)
            }
        }
    }
}
