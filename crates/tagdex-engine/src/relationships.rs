//! Tag metadata and implication lookups by name.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use tagdex_document::Tag;
use tagdex_index::TagDirectory;
use tracing::warn;

use crate::{SearchError, TagResolver};

/// Most names one lookup may carry.
pub const MAX_LOOKUP_NAMES: usize = 150;

/// Which direct relations to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Tags this tag implies.
    Parents,
    /// Tags implying this tag.
    Children,
}

/// Direct relations of one tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRelations {
    /// The tag itself, after alias dereference.
    pub tag: Tag,
    /// Direct parents, when asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<Tag>>,
    /// Direct children, when asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Tag>>,
}

/// Answers tag metadata and relationship requests.
pub struct TagService {
    /// Local taxonomy.
    directory: Arc<TagDirectory>,
    /// Name resolution, aliases included.
    resolver: Arc<TagResolver>,
}

impl TagService {
    /// Creates a tag service.
    pub fn new(directory: Arc<TagDirectory>, resolver: Arc<TagResolver>) -> Self {
        Self {
            directory,
            resolver,
        }
    }

    /// Known tags for the given names. Unknown names are left out.
    pub async fn lookup(&self, names: &[String]) -> Result<Vec<Tag>, SearchError> {
        let mut tags = Vec::new();
        for (_, tag) in self.resolve_all(names).await? {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    /// Direct parents and/or children per name.
    pub async fn relationships(
        &self,
        names: &[String],
        include: &[Relation],
    ) -> Result<BTreeMap<String, TagRelations>, SearchError> {
        let mut out = BTreeMap::new();
        for (name, tag) in self.resolve_all(names).await? {
            let parents = include
                .contains(&Relation::Parents)
                .then(|| self.tags(&self.directory.parents(tag.id)));
            let children = include
                .contains(&Relation::Children)
                .then(|| self.tags(&self.directory.children(tag.id)));
            out.insert(
                name,
                TagRelations {
                    tag,
                    parents,
                    children,
                },
            );
        }
        Ok(out)
    }

    /// Every ancestor per name.
    pub async fn all_parents(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, Vec<Tag>>, SearchError> {
        let mut out = BTreeMap::new();
        for (name, tag) in self.resolve_all(names).await? {
            out.insert(name, self.tags(&self.directory.all_parents(tag.id)));
        }
        Ok(out)
    }

    /// Resolves names to tags, skipping unknown ones.
    async fn resolve_all(&self, names: &[String]) -> Result<Vec<(String, Tag)>, SearchError> {
        if names.len() > MAX_LOOKUP_NAMES {
            return Err(SearchError::TooManyNames {
                max: MAX_LOOKUP_NAMES,
                got: names.len(),
            });
        }
        let mut resolved = Vec::with_capacity(names.len());
        for raw in names {
            let name = raw.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            let id = match self.resolver.resolve(&name).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(tag = %name, error = %e, "tag lookup failed, treating as unknown");
                    None
                }
            };
            if let Some(tag) = id.and_then(|id| self.directory.tag(id)) {
                resolved.push((name, tag));
            }
        }
        Ok(resolved)
    }

    /// Tags for ids, skipping any the directory no longer holds.
    fn tags(&self, ids: &[u64]) -> Vec<Tag> {
        ids.iter().filter_map(|id| self.directory.tag(*id)).collect()
    }
}
