//! In-memory catalog.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{fs, time};

use super::{AliasPayload, PostPayload, TagPayload, Upstream, UpstreamError};

/// Catalog contents.
#[derive(Debug, Default)]
struct Contents {
    /// Records by id.
    posts: BTreeMap<u64, PostPayload>,
    /// Tags by name.
    tags: HashMap<String, TagPayload>,
    /// Aliases by id.
    aliases: BTreeMap<u64, AliasPayload>,
    /// Implications by id.
    implications: BTreeMap<u64, AliasPayload>,
    /// Export file contents by name.
    exports: HashMap<String, Vec<u8>>,
}

/// A catalog held in memory.
///
/// Serves the same endpoints as the real API from canned data and counts tag lookups so
/// callers can check caching. Can be switched into a rate-limited state.
#[derive(Debug, Default)]
pub struct MemoryUpstream {
    /// Canned data.
    contents: Mutex<Contents>,
    /// Calls to [`Upstream::tag_by_name`].
    tag_lookups: AtomicUsize,
    /// When set every call fails as rate limited.
    throttled: AtomicBool,
    /// Delay added to tag lookups.
    tag_delay: Mutex<Duration>,
}

impl MemoryUpstream {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a record.
    pub fn put_post(&self, post: PostPayload) {
        self.contents.lock().posts.insert(post.id, post);
    }

    /// Adds or replaces a tag.
    pub fn put_tag(&self, tag: TagPayload) {
        self.contents.lock().tags.insert(tag.name.clone(), tag);
    }

    /// Adds or replaces an alias.
    pub fn put_alias(&self, alias: AliasPayload) {
        self.contents.lock().aliases.insert(alias.id, alias);
    }

    /// Adds or replaces an implication.
    pub fn put_implication(&self, implication: AliasPayload) {
        self.contents
            .lock()
            .implications
            .insert(implication.id, implication);
    }

    /// Publishes an export file.
    pub fn put_export(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.contents.lock().exports.insert(name.into(), bytes);
    }

    /// Number of tag lookups served so far.
    pub fn tag_lookups(&self) -> usize {
        self.tag_lookups.load(Ordering::SeqCst)
    }

    /// Makes every call fail as rate limited, or restores service.
    pub fn set_throttled(&self, throttled: bool) {
        self.throttled.store(throttled, Ordering::SeqCst);
    }

    /// Slows tag lookups down, so concurrent callers overlap.
    pub fn set_tag_delay(&self, delay: Duration) {
        *self.tag_delay.lock() = delay;
    }

    /// Fails when throttled.
    fn check(&self, endpoint: &str) -> Result<(), UpstreamError> {
        if self.throttled.load(Ordering::SeqCst) {
            return Err(UpstreamError::RateLimited {
                url: format!("memory://{endpoint}"),
            });
        }
        Ok(())
    }
}

/// One-based page `page` of `items`.
fn page_of<T: Clone>(items: &[T], page: usize, limit: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(limit);
    items.iter().skip(start).take(limit).cloned().collect()
}

#[async_trait]
impl Upstream for MemoryUpstream {
    async fn posts_after(&self, after_id: u64, limit: usize) -> Result<Vec<PostPayload>, UpstreamError> {
        self.check("posts_after")?;
        let contents = self.contents.lock();
        Ok(contents
            .posts
            .range(after_id.saturating_add(1)..)
            .take(limit)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn posts_by_change(&self, page: usize, limit: usize) -> Result<Vec<PostPayload>, UpstreamError> {
        self.check("posts_by_change")?;
        let mut posts: Vec<PostPayload> = self.contents.lock().posts.values().cloned().collect();
        posts.sort_by(|a, b| b.changed_at().cmp(&a.changed_at()).then(b.id.cmp(&a.id)));
        Ok(page_of(&posts, page, limit))
    }

    async fn posts_by_ids(&self, ids: &[u64]) -> Result<Vec<PostPayload>, UpstreamError> {
        self.check("posts_by_ids")?;
        let contents = self.contents.lock();
        Ok(ids
            .iter()
            .filter_map(|id| contents.posts.get(id).cloned())
            .collect())
    }

    async fn tag_by_name(&self, name: &str) -> Result<Option<TagPayload>, UpstreamError> {
        self.tag_lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.tag_delay.lock();
        if !delay.is_zero() {
            time::sleep(delay).await;
        }
        self.check("tag_by_name")?;
        Ok(self.contents.lock().tags.get(name).cloned())
    }

    async fn tags_by_update(&self, page: usize) -> Result<Vec<TagPayload>, UpstreamError> {
        self.check("tags_by_update")?;
        let mut tags: Vec<TagPayload> = self.contents.lock().tags.values().cloned().collect();
        tags.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(page_of(&tags, page, 320))
    }

    async fn aliases_after(&self, after_id: u64, limit: usize) -> Result<Vec<AliasPayload>, UpstreamError> {
        self.check("aliases_after")?;
        let contents = self.contents.lock();
        Ok(contents
            .aliases
            .range(after_id.saturating_add(1)..)
            .take(limit)
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn implications_after(
        &self,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<AliasPayload>, UpstreamError> {
        self.check("implications_after")?;
        let contents = self.contents.lock();
        Ok(contents
            .implications
            .range(after_id.saturating_add(1)..)
            .take(limit)
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn fetch_export(&self, name: &str, dir: &Path) -> Result<PathBuf, UpstreamError> {
        self.check("fetch_export")?;
        let bytes = self
            .contents
            .lock()
            .exports
            .get(name)
            .cloned()
            .ok_or_else(|| UpstreamError::Status {
                status: 404,
                url: format!("memory://exports/{name}"),
            })?;
        fs::create_dir_all(dir).await?;
        let dest = dir.join(name);
        fs::write(&dest, bytes).await?;
        Ok(dest)
    }
}
