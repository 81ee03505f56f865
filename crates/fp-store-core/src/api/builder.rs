//! Builder for configuring FeatureProfileStore initialization.

use std::path::Path;
use std::sync::Arc;

use crate::artifacts::DirectoryResolver;
use crate::catalog::{CatalogBackend, SqliteCatalog};
use crate::config::Settings;
use crate::error::{Result, StoreError};
use crate::graphs::{AnomalyLookup, GraphRenderer, HttpAnomalyLookup, HttpGraphRenderer, MatchedGraphFetcher};
use crate::profile::{FeatureDictionary, FeatureProfileCreator};
use crate::FeatureProfileStore;

/// Builder for configuring FeatureProfileStore initialization.
///
/// # Example
///
/// ```rust,ignore
/// use fp_store_core::{FeatureProfileStore, Settings};
///
/// let store = FeatureProfileStore::builder(Settings::rooted_at("./skyline"))
///     .auto_create_dirs(true)
///     .build()
///     .await?;
/// ```
pub struct FeatureProfileStoreBuilder {
    settings: Settings,
    auto_create_dirs: bool,
    catalog: Option<Arc<dyn CatalogBackend>>,
    renderer: Option<Arc<dyn GraphRenderer>>,
    lookup: Option<Arc<dyn AnomalyLookup>>,
    dictionary: Option<FeatureDictionary>,
}

impl FeatureProfileStoreBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            auto_create_dirs: false,
            catalog: None,
            renderer: None,
            lookup: None,
            dictionary: None,
        }
    }

    /// Auto-create the data root, the profiles root and the database's
    /// parent directory if they don't exist.
    ///
    /// Default: `false` (directories must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Use this graph renderer instead of one built from `render_url`.
    pub fn with_renderer(mut self, renderer: Arc<dyn GraphRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Use this anomaly lookup instead of one built from `lookup_url`.
    pub fn with_anomaly_lookup(mut self, lookup: Arc<dyn AnomalyLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Replace the built-in feature-name dictionary.
    pub fn with_feature_dictionary(mut self, dictionary: FeatureDictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Use an already opened catalog instead of opening `database_path`.
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogBackend>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn create_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::io_with_path(e, dir))?;
        }
        Ok(())
    }

    /// Build the FeatureProfileStore instance.
    pub async fn build(self) -> Result<FeatureProfileStore> {
        self.settings.validate()?;

        let db_parent = self
            .settings
            .database_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);

        if self.auto_create_dirs {
            Self::create_dir(&self.settings.data_folder)?;
            Self::create_dir(&self.settings.profiles_folder)?;
            if let Some(parent) = &db_parent {
                Self::create_dir(parent)?;
            }
        } else if let Some(parent) = db_parent.as_ref().filter(|p| !p.exists()) {
            if self.catalog.is_none() {
                return Err(StoreError::Config {
                    message: format!("Database directory does not exist: {}", parent.display()),
                });
            }
        }

        let catalog: Arc<dyn CatalogBackend> = match self.catalog {
            Some(catalog) => catalog,
            None => {
                let path = self.settings.database_path.clone();
                let catalog = tokio::task::spawn_blocking(move || SqliteCatalog::open(path))
                    .await
                    .map_err(|e| StoreError::Other(format!("Catalog open task failed: {}", e)))??;
                Arc::new(catalog)
            }
        };

        // Missing service URLs leave graphs disabled; a bad URL is a config error.
        let renderer = match (self.renderer, &self.settings.render_url) {
            (Some(renderer), _) => Some(renderer),
            (None, Some(url)) => Some(Arc::new(HttpGraphRenderer::new(url, self.settings.auth.clone())?)
                as Arc<dyn GraphRenderer>),
            (None, None) => None,
        };
        let lookup = match (self.lookup, &self.settings.lookup_url) {
            (Some(lookup), _) => Some(lookup),
            (None, Some(url)) => Some(Arc::new(HttpAnomalyLookup::new(url, self.settings.auth.clone())?)
                as Arc<dyn AnomalyLookup>),
            (None, None) => None,
        };

        let settings = Arc::new(self.settings);
        let resolver = Arc::new(DirectoryResolver::new(&settings)?);
        let dictionary = Arc::new(self.dictionary.unwrap_or_default());
        let creator = FeatureProfileCreator::new(
            catalog.clone(),
            resolver.layout().clone(),
            settings.clone(),
            dictionary,
        );
        let graphs = MatchedGraphFetcher::new(catalog.clone(), renderer, lookup, settings.target_hours);

        tracing::info!(
            "Feature profile store ready (data: {}, profiles: {}, db: {})",
            settings.data_folder.display(),
            settings.profiles_folder.display(),
            settings.database_path.display()
        );

        Ok(FeatureProfileStore {
            settings,
            catalog,
            resolver,
            creator,
            graphs,
        })
    }
}
