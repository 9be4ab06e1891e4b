//! Opening a storage backend for bracket tables and stored results.
//!
//! Each backend crate exports one [`RepositoryFactory`]. A binary registers
//! the backends it links against and opens whichever one the `[database]`
//! section of its config names.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::repository::{RepositoryError, TaxRepository};

/// The `[database]` config section.
///
/// `connection_string` is handed to the backend untouched; for `sqlite` it
/// is a file path, a `sqlite:` URL or `:memory:`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub backend: String,
    pub connection_string: String,

    /// Load the backend's bundled statutory tables after migrating.
    pub seed_tables: bool,

    /// Where the backend reads its seed files from, if not its own default.
    pub seeds_dir: Option<PathBuf>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            connection_string: ":memory:".to_string(),
            seed_tables: true,
            seeds_dir: None,
        }
    }
}

#[async_trait]
pub trait RepositoryFactory: Send + Sync {
    /// Name matched against [`DbConfig::backend`].
    fn backend_name(&self) -> &'static str;

    /// Returns a migrated repository, seeded when `config.seed_tables` is set.
    async fn open(
        &self,
        config: &DbConfig,
    ) -> Result<Box<dyn TaxRepository>, RepositoryError>;
}

/// Backends linked into a binary, by name.
#[derive(Default)]
pub struct RepositoryRegistry {
    backends: BTreeMap<&'static str, Box<dyn RepositoryFactory>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a backend. A later factory with the same name replaces the
    /// earlier one.
    pub fn register(
        &mut self,
        factory: Box<dyn RepositoryFactory>,
    ) {
        self.backends.insert(factory.backend_name(), factory);
    }

    /// Registered backend names in alphabetical order.
    pub fn backends(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.backends.keys().copied()
    }

    /// Opens the backend named by `config.backend`.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::Configuration`] if no such backend is registered
    /// - whatever the backend reports while connecting or seeding
    pub async fn open(
        &self,
        config: &DbConfig,
    ) -> Result<Box<dyn TaxRepository>, RepositoryError> {
        let Some(factory) = self.backends.get(config.backend.as_str()) else {
            let known: Vec<_> = self.backends().collect();
            return Err(RepositoryError::Configuration(format!(
                "no '{}' backend in this build (have: {})",
                config.backend,
                known.join(", ")
            )));
        };

        debug!(
            backend = %config.backend,
            seed_tables = config.seed_tables,
            "opening repository"
        );
        factory.open(config).await
    }
}
