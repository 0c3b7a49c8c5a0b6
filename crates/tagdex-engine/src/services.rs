//! Wiring of the services over one data directory.

use std::sync::Arc;

use tagdex_config::Config;
use tagdex_index::IndexError;

use crate::{
    Catalog, Clock, ProvenanceQueue, SearchService, SyncEngine, TagResolver, TagService, Upstream,
};

/// Every service over one catalog, sharing a single tag resolver.
pub struct Services {
    /// The stores.
    pub catalog: Catalog,
    /// Shared tag name resolution.
    pub resolver: Arc<TagResolver>,
    /// Record search.
    pub search: SearchService,
    /// Tag metadata and relationships.
    pub tags: TagService,
    /// Upstream synchronization.
    pub sync: SyncEngine,
}

impl Services {
    /// Opens the configured data directory and builds the services over it.
    pub fn open(
        config: &Config,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IndexError> {
        let catalog = Catalog::open(&config.storage)?;
        Ok(Self::with_catalog(catalog, config, upstream, clock))
    }

    /// Builds the services over an already opened catalog.
    pub fn with_catalog(
        catalog: Catalog,
        config: &Config,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolver = Arc::new(TagResolver::new(
            Arc::clone(&catalog.tags),
            Arc::clone(&upstream),
            &clock,
            &config.cache,
        ));
        Self {
            search: SearchService::new(catalog.clone(), Arc::clone(&resolver), clock, config),
            tags: TagService::new(Arc::clone(&catalog.tags), Arc::clone(&resolver)),
            sync: SyncEngine::new(catalog.clone(), upstream, Arc::clone(&resolver), config),
            resolver,
            catalog,
        }
    }

    /// Offers records accepted by sync passes to a source verification queue.
    #[must_use]
    pub fn with_provenance(mut self, queue: ProvenanceQueue) -> Self {
        self.sync = self.sync.with_provenance(queue);
        self
    }
}
