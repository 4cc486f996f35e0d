//! Backend registry.
//!
//! Backends are looked up by name. A process installs one registry during
//! startup with [`install`]; afterwards it is read-only. Until something
//! is installed, [`global`] serves the built-in backends.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::{Backend, CLICKHOUSE, MYSQL, SQLITE};
use crate::error::{Result, SchemaError};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Name to backend table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    backends: BTreeMap<String, &'static dyn Backend>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `mysql`, `sqlite` and `clickhouse`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(&MYSQL);
        registry.register(&SQLITE);
        registry.register(&CLICKHOUSE);
        registry
    }

    /// Registers a backend under its own name, replacing any previous one.
    pub fn register(&mut self, backend: &'static dyn Backend) -> &mut Self {
        self.backends.insert(backend.name().to_string(), backend);
        self
    }

    /// Looks a backend up by name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownBackend`] for unregistered names.
    pub fn get(&self, name: &str) -> Result<&'static dyn Backend> {
        self.backends
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::UnknownBackend(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

/// Installs the process-wide registry.
///
/// Must be called before the first [`global`] lookup; registering
/// concurrently with lookups is a caller error.
///
/// # Errors
///
/// Returns the registry back when one is already installed.
pub fn install(registry: Registry) -> std::result::Result<(), Registry> {
    GLOBAL.set(registry)
}

/// The process-wide registry.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::with_builtin)
}

/// Looks a backend up in the process-wide registry.
///
/// # Errors
///
/// Returns [`SchemaError::UnknownBackend`] for unregistered names.
pub fn lookup(name: &str) -> Result<&'static dyn Backend> {
    global().get(name)
}
