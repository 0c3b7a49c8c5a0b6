//! The sync engine.
//!
//! A pass runs every stage in order:
//!
//! 1. [`Stage::FetchingNew`] pulls records newer than the newest indexed id.
//! 2. [`Stage::ApplyingUpdates`] walks recently changed records until it meets one already
//!    up to date.
//! 3. [`Stage::ReconcilingMisses`] fetches parents that children are still waiting for.
//! 4. [`Stage::RefreshingTagMetadata`] picks up renamed and recategorized tags.
//! 5. [`Stage::RefreshingAliases`] and [`Stage::RefreshingImplications`] extend the
//!    taxonomy from the last known id.
//!
//! A failing stage aborts the pass; [`SyncEngine::run`] waits and starts over. Shutdown is
//! honored between pages and stages, and the tag directory and hanging links are saved after
//! every index write, so an interrupted pass never leaves the stores out of step.

mod export;
mod transform;
mod writer;

use std::{
    collections::{HashMap, HashSet},
    fmt,
    future::Future,
    path::PathBuf,
    sync::Arc,
};

use chrono::NaiveDate;
pub use export::{ResyncReport, export_names};
use serde::Serialize;
use tagdex_config::{Config, SyncSettings};
use tagdex_document::{Record, TagAlias, TagCategory, TagImplication};
use tagdex_index::TagChange;
use tokio::{sync::watch, task, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    Catalog, ProvenanceQueue, SyncError, TagResolver, Upstream,
    upstream::{AliasPayload, PostPayload},
};

/// Failed lookups after which a missing parent stops being requested.
pub const MAX_PARENT_LOOKUPS: u32 = 5;

/// Where the engine is within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Between passes.
    Idle,
    /// Fetching records newer than the newest indexed one.
    FetchingNew,
    /// Applying changes to existing records.
    ApplyingUpdates,
    /// Fetching parents that children are waiting for.
    ReconcilingMisses,
    /// Refreshing tag names and categories.
    RefreshingTagMetadata,
    /// Extending the alias table.
    RefreshingAliases,
    /// Extending the implication graph.
    RefreshingImplications,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FetchingNew => "fetching-new",
            Self::ApplyingUpdates => "applying-updates",
            Self::ReconcilingMisses => "reconciling-misses",
            Self::RefreshingTagMetadata => "refreshing-tag-metadata",
            Self::RefreshingAliases => "refreshing-aliases",
            Self::RefreshingImplications => "refreshing-implications",
        };
        f.write_str(name)
    }
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Records added by [`Stage::FetchingNew`].
    pub new_records: usize,
    /// Records changed by [`Stage::ApplyingUpdates`].
    pub updated_records: usize,
    /// Waiting parents fetched by [`Stage::ReconcilingMisses`].
    pub reconciled_parents: usize,
    /// Tags inserted, renamed or recategorized.
    pub tags_refreshed: usize,
    /// Records patched by category migrations.
    pub migrated_records: usize,
    /// Aliases stored or removed.
    pub aliases: usize,
    /// Implications stored or removed.
    pub implications: usize,
    /// Records the index refused.
    pub failed_records: usize,
}

/// Keeps a catalog in step with the upstream.
pub struct SyncEngine {
    /// Stores written to.
    catalog: Catalog,
    /// Source of records and taxonomy.
    upstream: Arc<dyn Upstream>,
    /// Tag name resolution shared with the search side.
    resolver: Arc<TagResolver>,
    /// Paging, batching and pacing.
    settings: SyncSettings,
    /// Where exports are downloaded.
    exports_dir: PathBuf,
    /// Verification queue for freshly ingested records.
    provenance: Option<ProvenanceQueue>,
    /// Current stage.
    stage: watch::Sender<Stage>,
}

impl SyncEngine {
    /// Creates an engine.
    pub fn new(
        catalog: Catalog,
        upstream: Arc<dyn Upstream>,
        resolver: Arc<TagResolver>,
        config: &Config,
    ) -> Self {
        let (stage, _) = watch::channel(Stage::Idle);
        Self {
            catalog,
            upstream,
            resolver,
            settings: config.sync.clone(),
            exports_dir: config.storage.exports_dir(),
            provenance: None,
            stage,
        }
    }

    /// Offers ingested records to a verification queue.
    #[must_use]
    pub fn with_provenance(mut self, queue: ProvenanceQueue) -> Self {
        self.provenance = Some(queue);
        self
    }

    /// The stage currently running.
    pub fn stage(&self) -> Stage {
        *self.stage.borrow()
    }

    /// Watches stage changes.
    pub fn stage_receiver(&self) -> watch::Receiver<Stage> {
        self.stage.subscribe()
    }

    /// Runs passes until `shutdown` fires. Failures are logged and retried, never returned.
    ///
    /// A pass in progress stops at the next page or stage boundary and saves what it wrote.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval = ?self.settings.interval(), "sync engine started");
        while !shutdown.is_cancelled() {
            let result = self.pass(&shutdown).await;
            if shutdown.is_cancelled() {
                match result {
                    Ok(report) => info!(?report, "sync pass ended for shutdown"),
                    Err(e) => warn!(error = %e, "sync pass failed during shutdown"),
                }
                break;
            }
            let pause = match result {
                Ok(report) => {
                    info!(?report, "sync pass complete");
                    self.settings.interval()
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, backoff = ?self.settings.retry_backoff(), "sync pass interrupted, retrying");
                    self.settings.retry_backoff()
                }
                Err(e) => {
                    error!(error = %e, backoff = ?self.settings.retry_backoff(), "sync pass failed");
                    self.settings.retry_backoff()
                }
            };
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = time::sleep(pause) => {}
            }
        }
        self.stage.send_replace(Stage::Idle);
        info!("sync engine stopped");
    }

    /// Runs every stage once.
    pub async fn run_pass(&self) -> Result<PassReport, SyncError> {
        self.pass(&CancellationToken::new()).await
    }

    /// Runs the stages until done or until `shutdown` fires, then saves.
    async fn pass(&self, shutdown: &CancellationToken) -> Result<PassReport, SyncError> {
        let mut report = PassReport::default();
        let result = self.run_stages(&mut report, shutdown).await;
        self.stage.send_replace(Stage::Idle);
        self.save().await?;
        result.map(|()| report)
    }

    /// Rebuilds the catalog from the upstream's daily export for `date`.
    pub async fn resync(&self, date: NaiveDate) -> Result<ResyncReport, SyncError> {
        let report = export::resync(self, date).await;
        self.save().await?;
        report
    }

    /// Runs the stages in order, stopping at the first failure or once `shutdown` fires.
    async fn run_stages(
        &self,
        report: &mut PassReport,
        shutdown: &CancellationToken,
    ) -> Result<(), SyncError> {
        let (new, failed) = self
            .in_stage(Stage::FetchingNew, self.fetch_new(shutdown))
            .await?;
        report.new_records = new;
        report.failed_records += failed;
        if stopping(shutdown, Stage::ApplyingUpdates) {
            return Ok(());
        }

        let (updated, failed) = self
            .in_stage(Stage::ApplyingUpdates, self.apply_updates(shutdown))
            .await?;
        report.updated_records = updated;
        report.failed_records += failed;
        if stopping(shutdown, Stage::ReconcilingMisses) {
            return Ok(());
        }

        report.reconciled_parents = self
            .in_stage(Stage::ReconcilingMisses, self.reconcile_misses())
            .await?;

        let (tags, migrated) = self
            .in_stage(Stage::RefreshingTagMetadata, self.refresh_tag_metadata())
            .await?;
        report.tags_refreshed = tags;
        report.migrated_records = migrated;
        if stopping(shutdown, Stage::RefreshingAliases) {
            return Ok(());
        }

        report.aliases = self
            .in_stage(Stage::RefreshingAliases, self.refresh_aliases())
            .await?;
        if stopping(shutdown, Stage::RefreshingImplications) {
            return Ok(());
        }
        report.implications = self
            .in_stage(Stage::RefreshingImplications, self.refresh_implications())
            .await?;
        Ok(())
    }

    /// Runs `work` as `stage`, logging a failure with its stage.
    async fn in_stage<T>(
        &self,
        stage: Stage,
        work: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        self.stage.send_replace(stage);
        debug!(%stage, "stage started");
        work.await.inspect_err(|e| {
            if e.is_transient() {
                warn!(%stage, error = %e, "stage aborted");
            } else {
                error!(%stage, error = ?e, "stage failed");
            }
        })
    }

    /// Pages through records newer than the newest indexed id.
    async fn fetch_new(&self, shutdown: &CancellationToken) -> Result<(usize, usize), SyncError> {
        let index = Arc::clone(&self.catalog.index);
        let mut after = blocking(move || Ok(index.latest_id()?.unwrap_or(0))).await?;
        let (mut written, mut failed) = (0, 0);
        loop {
            let page = self
                .upstream
                .posts_after(after, self.settings.page_size)
                .await?;
            let Some(max_id) = page.iter().map(|p| p.id).max() else {
                break;
            };
            after = after.max(max_id);
            let full = page.len() >= self.settings.page_size;

            let summary = self.ingest(page).await?;
            written += summary.0;
            failed += summary.1;
            if !full || shutdown.is_cancelled() {
                break;
            }
        }
        Ok((written, failed))
    }

    /// Walks records by change time until one is already up to date.
    async fn apply_updates(&self, shutdown: &CancellationToken) -> Result<(usize, usize), SyncError> {
        let (mut written, mut failed) = (0, 0);
        for page in 1..=self.settings.max_update_pages {
            let posts = self
                .upstream
                .posts_by_change(page, self.settings.page_size)
                .await?;
            let full = posts.len() >= self.settings.page_size;

            let ids: Vec<u64> = posts.iter().map(|p| p.id).collect();
            let index = Arc::clone(&self.catalog.index);
            let stored: HashMap<u64, _> = blocking(move || Ok(index.get_many(&ids)?))
                .await?
                .into_iter()
                .map(|r| (r.id, r.updated_at))
                .collect();

            let mut changed = Vec::with_capacity(posts.len());
            let mut caught_up = false;
            for post in posts {
                if stored.get(&post.id) == Some(&post.changed_at()) {
                    caught_up = true;
                    break;
                }
                changed.push(post);
            }

            let summary = self.ingest(changed).await?;
            written += summary.0;
            failed += summary.1;
            if caught_up || !full || shutdown.is_cancelled() {
                break;
            }
        }
        Ok((written, failed))
    }

    /// Fetches parents named by hanging relationships.
    ///
    /// A parent the upstream keeps not returning is given up on after
    /// [`MAX_PARENT_LOOKUPS`] passes.
    async fn reconcile_misses(&self) -> Result<usize, SyncError> {
        let parents = self.catalog.hanging.parent_ids();
        if parents.is_empty() {
            return Ok(0);
        }
        let posts = self.upstream.posts_by_ids(&parents).await?;
        debug!(waiting = parents.len(), found = posts.len(), "fetched waiting parents");
        let found: HashSet<u64> = posts.iter().map(|p| p.id).collect();
        let absent: Vec<u64> = parents.into_iter().filter(|id| !found.contains(id)).collect();

        let (written, _) = self.ingest(posts).await?;
        let expired = self
            .catalog
            .hanging
            .record_misses(&absent, MAX_PARENT_LOOKUPS);
        for hanging in &expired {
            warn!(
                parent_id = hanging.parent_id,
                children = hanging.children.len(),
                "parent never found upstream, dropping hanging link"
            );
        }
        if !absent.is_empty() {
            self.save().await?;
        }
        Ok(written)
    }

    /// Applies tag changes newer than the stored watermark.
    ///
    /// Without a watermark only the first page is read.
    async fn refresh_tag_metadata(&self) -> Result<(usize, usize), SyncError> {
        let watermark = self.catalog.tags.tag_watermark();
        let mut newest = watermark;
        let mut refreshed = 0;
        let mut migrations = Vec::new();

        for page in 1..=self.settings.max_update_pages {
            let tags = self.upstream.tags_by_update(page).await?;
            if tags.is_empty() {
                break;
            }
            let mut caught_up = false;
            for payload in tags {
                if let (Some(mark), Some(at)) = (watermark, payload.updated_at) {
                    if at <= mark {
                        caught_up = true;
                        break;
                    }
                }
                newest = newest.max(payload.updated_at);
                let Some(tag) = payload.to_tag() else {
                    continue;
                };
                let (id, category) = (tag.id, tag.category);
                match self.catalog.tags.upsert_tag(tag) {
                    TagChange::Unchanged => continue,
                    TagChange::Inserted => {}
                    TagChange::Updated {
                        renamed_from,
                        moved_from,
                    } => {
                        if let Some(old) = renamed_from {
                            debug!(tag_id = id, old = %old, new = %payload.name, "tag renamed");
                            self.resolver.forget(&old);
                        }
                        if moved_from.is_some() {
                            migrations.push((id, category));
                        }
                    }
                }
                self.resolver.forget(&payload.name);
                refreshed += 1;
            }
            if caught_up || watermark.is_none() {
                break;
            }
        }

        let mut migrated = 0;
        for (tag_id, category) in migrations {
            migrated += self.migrate_category(tag_id, category).await?;
        }
        if let Some(newest) = newest {
            self.catalog.tags.set_tag_watermark(newest);
        }
        Ok((refreshed, migrated))
    }

    /// Moves a tag into another category bucket on every record carrying it.
    async fn migrate_category(&self, tag_id: u64, category: TagCategory) -> Result<usize, SyncError> {
        let catalog = self.catalog.clone();
        let batch_size = self.settings.batch_size;
        let migrated = blocking(move || {
            let mut records = catalog.index.records_with_tag(tag_id)?;
            records.retain_mut(|r| r.tags.category_of(tag_id) != Some(category) && r.tags.move_tag(tag_id, category));
            let migrated = writer::patch_records(&catalog, &records, batch_size);
            catalog.save()?;
            Ok(migrated)
        })
        .await?;
        info!(tag_id, category = category.name(), records = migrated, "migrated tag category");
        Ok(migrated)
    }

    /// Extends the alias table past the newest stored alias.
    async fn refresh_aliases(&self) -> Result<usize, SyncError> {
        let mut after = self.catalog.tags.latest_alias_id();
        let mut changed = 0;
        loop {
            let page = self
                .upstream
                .aliases_after(after, self.settings.alias_page_size)
                .await?;
            let Some(max_id) = page.iter().map(|a| a.id).max() else {
                break;
            };
            after = after.max(max_id);
            let full = page.len() >= self.settings.alias_page_size;
            changed += self.apply_aliases(&page).await?;
            if !full {
                break;
            }
        }
        Ok(changed)
    }

    /// Stores active aliases and drops inactive ones.
    async fn apply_aliases(&self, aliases: &[AliasPayload]) -> Result<usize, SyncError> {
        let mut changed = 0;
        for alias in aliases {
            if !alias.is_active() {
                changed += usize::from(self.catalog.tags.remove_alias(alias.id));
                continue;
            }
            let Some(target) = self.resolver.tag(&alias.consequent_name).await? else {
                warn!(alias_id = alias.id, tag = %alias.consequent_name, "alias target unknown");
                continue;
            };
            let antecedent = alias.antecedent_name.to_lowercase();
            self.resolver.forget(&antecedent);
            self.catalog.tags.put_alias(TagAlias {
                id: alias.id,
                antecedent_name: antecedent,
                consequent_id: target.id,
                updated_at: alias.updated_at,
            });
            changed += 1;
        }
        Ok(changed)
    }

    /// Extends the implication graph past the newest stored implication.
    async fn refresh_implications(&self) -> Result<usize, SyncError> {
        let mut after = self.catalog.tags.latest_implication_id();
        let mut changed = 0;
        loop {
            let page = self
                .upstream
                .implications_after(after, self.settings.alias_page_size)
                .await?;
            let Some(max_id) = page.iter().map(|a| a.id).max() else {
                break;
            };
            after = after.max(max_id);
            let full = page.len() >= self.settings.alias_page_size;

            for implication in &page {
                if !implication.is_active() {
                    changed += usize::from(self.catalog.tags.remove_implication(implication.id));
                    continue;
                }
                let antecedent = self.resolver.tag(&implication.antecedent_name).await?;
                let consequent = self.resolver.tag(&implication.consequent_name).await?;
                let (Some(antecedent), Some(consequent)) = (antecedent, consequent) else {
                    warn!(implication_id = implication.id, "implication names unknown tags");
                    continue;
                };
                let Some(stored) = TagImplication::new(
                    implication.id,
                    antecedent.id,
                    consequent.id,
                    implication.updated_at,
                ) else {
                    continue;
                };
                self.catalog.tags.put_implication(stored);
                changed += 1;
            }
            if !full {
                break;
            }
        }
        Ok(changed)
    }

    /// Transforms and writes upstream records. Returns `(written, failed)`.
    async fn ingest(&self, posts: Vec<PostPayload>) -> Result<(usize, usize), SyncError> {
        if posts.is_empty() {
            return Ok((0, 0));
        }
        let records =
            transform::to_records(&self.resolver, posts, self.settings.concurrency).await?;
        self.write(records).await
    }

    /// Writes records off the async runtime and offers accepted ones for verification.
    async fn write(&self, records: Vec<Record>) -> Result<(usize, usize), SyncError> {
        let catalog = self.catalog.clone();
        let batch_size = self.settings.batch_size;
        let summary =
            blocking(move || writer::write_records(&catalog, records, batch_size)).await?;
        debug!(
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            "records written"
        );
        if let Some(queue) = &self.provenance {
            for record in &summary.accepted {
                queue.offer(record);
            }
        }
        Ok((summary.written, summary.failed))
    }

    /// Persists the tag directory and hanging links.
    async fn save(&self) -> Result<(), SyncError> {
        let catalog = self.catalog.clone();
        blocking(move || Ok(catalog.save()?)).await
    }
}

/// Returns true when `shutdown` has fired, logging the stage that will not run.
fn stopping(shutdown: &CancellationToken, next: Stage) -> bool {
    let stop = shutdown.is_cancelled();
    if stop {
        info!(skipped = %next, "shutdown requested, ending pass early");
    }
    stop
}

/// Runs blocking index work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
}
