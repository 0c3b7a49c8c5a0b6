//! Tag name resolution.
//!
//! Names resolve through, in order: the alias table, a cache of recent hits, the tag
//! directory, a cache of recent misses, and finally the upstream catalog. Concurrent
//! upstream lookups of the same name share one request.

use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use parking_lot::Mutex;
use tagdex_config::CacheSettings;
use tagdex_document::Tag;
use tagdex_index::{IndexError, TagDirectory};
use tagdex_query::{ParsedQuery, Resolutions, is_wildcard};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{Clock, TtlCache, Upstream, UpstreamError};

/// A shared upstream lookup.
type Pending = Arc<OnceCell<Option<Tag>>>;

/// Resolves tag names to canonical tags, fetching unknown ones lazily.
pub struct TagResolver {
    /// Local taxonomy; fetched tags are added to it.
    directory: Arc<TagDirectory>,
    /// Source of tags not yet known locally.
    upstream: Arc<dyn Upstream>,
    /// Recently resolved names.
    found: TtlCache<String, Tag>,
    /// Names recently confirmed unknown upstream.
    missing: TtlCache<String, ()>,
    /// Upstream lookups in progress, by name.
    in_flight: Mutex<HashMap<String, Pending>>,
}

impl TagResolver {
    /// Creates a resolver with caches sized and aged per `settings`.
    pub fn new(
        directory: Arc<TagDirectory>,
        upstream: Arc<dyn Upstream>,
        clock: &Arc<dyn Clock>,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            directory,
            upstream,
            found: TtlCache::new(Arc::clone(clock), settings.positive_ttl(), settings.capacity),
            missing: TtlCache::new(Arc::clone(clock), settings.negative_ttl(), settings.capacity),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical id for a query name, following aliases.
    pub async fn resolve(&self, name: &str) -> Result<Option<u64>, UpstreamError> {
        if let Some(id) = self.directory.alias_target(name) {
            return Ok(Some(id));
        }
        Ok(self.tag(name).await?.map(|t| t.id))
    }

    /// The tag with exactly this canonical name.
    pub async fn tag(&self, name: &str) -> Result<Option<Tag>, UpstreamError> {
        if let Some(tag) = self.found.get(name) {
            return Ok(Some(tag));
        }
        if let Some(tag) = self.directory.by_name(name) {
            self.found.insert(name.to_string(), tag.clone());
            return Ok(Some(tag));
        }
        if self.missing.get(name).is_some() {
            return Ok(None);
        }
        self.fetch(name).await
    }

    /// Drops any cached outcome for `name`, after a rename or a new alias.
    pub fn forget(&self, name: &str) {
        self.found.remove(name);
        self.missing.remove(name);
    }

    /// Ids of every known tag matching a wildcard.
    pub fn expand(&self, pattern: &str) -> Result<Vec<u64>, IndexError> {
        self.directory.match_pattern(pattern)
    }

    /// Resolves every literal of a parsed query.
    ///
    /// Failures degrade to "unknown" so a struggling upstream never fails a search.
    pub async fn resolve_query(&self, query: &ParsedQuery) -> Resolutions {
        let mut names = query.root.literals();
        names.sort_unstable();
        names.dedup();

        let lookups = names.iter().map(|name| self.resolve_literal(name));
        let ids = join_all(lookups).await;

        let mut resolutions = Resolutions::new();
        for (name, ids) in names.into_iter().zip(ids) {
            resolutions.insert(name, ids);
        }
        resolutions
    }

    /// Ids for one literal, empty when unknown or when resolution failed.
    async fn resolve_literal(&self, name: &str) -> Vec<u64> {
        if is_wildcard(name) {
            return self.expand(name).unwrap_or_else(|e| {
                warn!(pattern = name, error = %e, "wildcard expansion failed");
                Vec::new()
            });
        }
        match self.resolve(name).await {
            Ok(id) => id.into_iter().collect(),
            Err(e) => {
                warn!(tag = name, error = %e, "tag resolution failed, treating as unknown");
                Vec::new()
            }
        }
    }

    /// Looks a name up upstream, joining any lookup already running for it.
    async fn fetch(&self, name: &str) -> Result<Option<Tag>, UpstreamError> {
        let pending = Arc::clone(self.in_flight.lock().entry(name.to_string()).or_default());
        let result = pending
            .get_or_try_init(|| self.fetch_uncached(name))
            .await
            .cloned();

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(name).is_some_and(|p| Arc::ptr_eq(p, &pending)) {
            in_flight.remove(name);
        }
        result
    }

    /// Performs the upstream lookup and records the outcome in the caches.
    async fn fetch_uncached(&self, name: &str) -> Result<Option<Tag>, UpstreamError> {
        let tag = self
            .upstream
            .tag_by_name(name)
            .await?
            .and_then(|payload| payload.to_tag());
        match &tag {
            Some(tag) => {
                debug!(tag = name, id = tag.id, "fetched new tag");
                self.directory.upsert_tag(tag.clone());
                self.found.insert(name.to_string(), tag.clone());
            }
            None => {
                debug!(tag = name, "tag unknown upstream");
                self.missing.insert(name.to_string(), ());
            }
        }
        Ok(tag)
    }
}
