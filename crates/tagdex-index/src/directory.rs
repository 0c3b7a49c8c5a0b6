//! The tag directory.
//!
//! Holds the tag taxonomy the query language resolves against: canonical tags, aliases and
//! implications, plus the watermark of the last tag metadata refresh. The directory lives
//! in memory behind a read-write lock and is persisted as JSON.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tagdex_document::{Tag, TagAlias, TagCategory, TagImplication};
use tracing::debug;

use crate::{
    IndexError,
    persist::{load_json, save_json},
};

/// Characters that `globset` would treat as syntax.
const GLOB_SYNTAX: &[char] = &['[', ']', '{', '}', '\\', '!', ','];

/// What changed when a tag was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagChange {
    /// The tag was not known before.
    Inserted,
    /// Nothing changed.
    Unchanged,
    /// The name or category changed.
    Updated {
        /// Previous name, when renamed.
        renamed_from: Option<String>,
        /// Previous category, when moved.
        moved_from: Option<TagCategory>,
    },
}

/// Persisted portion of the directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Taxonomy {
    /// Canonical tags by id.
    tags: BTreeMap<u64, Tag>,
    /// Active aliases by alias id.
    aliases: BTreeMap<u64, TagAlias>,
    /// Active implications by implication id.
    implications: BTreeMap<u64, TagImplication>,
    /// Update time of the newest tag seen by the metadata refresh.
    tag_watermark: Option<DateTime<Utc>>,
}

/// Taxonomy plus lookup tables derived from it.
#[derive(Debug, Default)]
struct State {
    /// Persisted data.
    taxonomy: Taxonomy,
    /// Tag id by name.
    by_name: HashMap<String, u64>,
    /// Canonical tag id by alias name.
    alias_targets: HashMap<String, u64>,
    /// Implied tags by implying tag.
    parents: HashMap<u64, BTreeSet<u64>>,
    /// Implying tags by implied tag.
    children: HashMap<u64, BTreeSet<u64>>,
}

impl State {
    /// Builds lookup tables for a loaded taxonomy.
    fn new(taxonomy: Taxonomy) -> Self {
        let mut state = Self {
            taxonomy,
            ..Self::default()
        };
        state.by_name = state
            .taxonomy
            .tags
            .values()
            .map(|t| (t.name.clone(), t.id))
            .collect();
        state.alias_targets = state
            .taxonomy
            .aliases
            .values()
            .map(|a| (a.antecedent_name.clone(), a.consequent_id))
            .collect();
        let edges: Vec<TagImplication> = state.taxonomy.implications.values().copied().collect();
        for edge in edges {
            state.link(&edge);
        }
        state
    }

    /// Adds an implication edge to the lookup tables.
    fn link(&mut self, edge: &TagImplication) {
        self.parents
            .entry(edge.antecedent_id)
            .or_default()
            .insert(edge.consequent_id);
        self.children
            .entry(edge.consequent_id)
            .or_default()
            .insert(edge.antecedent_id);
    }

    /// Removes an implication edge from the lookup tables.
    fn unlink(&mut self, edge: &TagImplication) {
        if let Some(set) = self.parents.get_mut(&edge.antecedent_id) {
            set.remove(&edge.consequent_id);
        }
        if let Some(set) = self.children.get_mut(&edge.consequent_id) {
            set.remove(&edge.antecedent_id);
        }
    }
}

/// In-memory tag taxonomy, optionally backed by a JSON file.
#[derive(Debug)]
pub struct TagDirectory {
    /// Backing file, `None` for an in-memory directory.
    path: Option<PathBuf>,
    /// Taxonomy and lookups.
    state: RwLock<State>,
}

impl TagDirectory {
    /// Creates an empty directory that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(State::default()),
        }
    }

    /// Loads a directory from `path`, starting empty when the file does not exist.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let taxonomy: Taxonomy = load_json(path)?;
        debug!(
            tags = taxonomy.tags.len(),
            aliases = taxonomy.aliases.len(),
            implications = taxonomy.implications.len(),
            "loaded tag directory"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(State::new(taxonomy)),
        })
    }

    /// Writes the directory to its backing file.
    pub fn save(&self) -> Result<(), IndexError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let state = self.state.read();
        save_json(path, &state.taxonomy)
    }

    /// Number of known tags.
    pub fn len(&self) -> usize {
        self.state.read().taxonomy.tags.len()
    }

    /// Returns true when no tags are known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tag with the given id.
    pub fn tag(&self, id: u64) -> Option<Tag> {
        self.state.read().taxonomy.tags.get(&id).cloned()
    }

    /// Tag with the given canonical name.
    pub fn by_name(&self, name: &str) -> Option<Tag> {
        let state = self.state.read();
        let id = state.by_name.get(name)?;
        state.taxonomy.tags.get(id).cloned()
    }

    /// Canonical tag id an alias name rewrites to.
    pub fn alias_target(&self, name: &str) -> Option<u64> {
        self.state.read().alias_targets.get(name).copied()
    }

    /// Resolves a name locally: alias first, then canonical name.
    pub fn resolve_name(&self, name: &str) -> Option<u64> {
        let state = self.state.read();
        state
            .alias_targets
            .get(name)
            .or_else(|| state.by_name.get(name))
            .copied()
    }

    /// Ids of every tag whose name matches a `*`/`?` wildcard, ascending.
    ///
    /// Every other character matches itself.
    pub fn match_pattern(&self, pattern: &str) -> Result<Vec<u64>, IndexError> {
        let matcher = GlobBuilder::new(&escape_glob(pattern))
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| IndexError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?
            .compile_matcher();

        let state = self.state.read();
        let mut ids: Vec<u64> = state
            .by_name
            .iter()
            .filter(|(name, _)| matcher.is_match(name.as_str()))
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Stores a tag, keeping the locally maintained post count of an existing entry.
    pub fn upsert_tag(&self, tag: Tag) -> TagChange {
        let mut state = self.state.write();
        let previous = state.taxonomy.tags.get(&tag.id).cloned();
        let change = match &previous {
            None => TagChange::Inserted,
            Some(old) if old.name == tag.name && old.category == tag.category => {
                TagChange::Unchanged
            }
            Some(old) => TagChange::Updated {
                renamed_from: (old.name != tag.name).then(|| old.name.clone()),
                moved_from: (old.category != tag.category).then_some(old.category),
            },
        };

        let mut stored = tag;
        if let Some(old) = &previous {
            stored.post_count = old.post_count;
            if stored.updated_at.is_none() {
                stored.updated_at = old.updated_at;
            }
            if old.name != stored.name {
                state.by_name.remove(&old.name);
            }
        }
        state.by_name.insert(stored.name.clone(), stored.id);
        state.taxonomy.tags.insert(stored.id, stored);
        change
    }

    /// Applies signed post-count deltas. Unknown tag ids are ignored.
    pub fn adjust_post_counts(&self, deltas: &HashMap<u64, i64>) {
        let mut state = self.state.write();
        for (id, delta) in deltas {
            if let Some(tag) = state.taxonomy.tags.get_mut(id) {
                tag.adjust_post_count(*delta);
            }
        }
    }

    /// Replaces every post count; tags absent from `counts` drop to zero.
    pub fn set_post_counts(&self, counts: &HashMap<u64, u64>) {
        let mut state = self.state.write();
        for tag in state.taxonomy.tags.values_mut() {
            tag.post_count = counts.get(&tag.id).copied().unwrap_or(0);
        }
    }

    /// Stores or replaces an alias.
    pub fn put_alias(&self, alias: TagAlias) {
        let mut state = self.state.write();
        if let Some(old) = state.taxonomy.aliases.get(&alias.id).cloned() {
            state.alias_targets.remove(&old.antecedent_name);
        }
        state
            .alias_targets
            .insert(alias.antecedent_name.clone(), alias.consequent_id);
        state.taxonomy.aliases.insert(alias.id, alias);
    }

    /// Removes an alias by id. Returns true when it existed.
    pub fn remove_alias(&self, id: u64) -> bool {
        let mut state = self.state.write();
        let Some(old) = state.taxonomy.aliases.remove(&id) else {
            return false;
        };
        state.alias_targets.remove(&old.antecedent_name);
        true
    }

    /// Highest stored alias id, zero when none.
    pub fn latest_alias_id(&self) -> u64 {
        self.state
            .read()
            .taxonomy
            .aliases
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    /// Stores or replaces an implication.
    pub fn put_implication(&self, implication: TagImplication) {
        let mut state = self.state.write();
        if let Some(old) = state.taxonomy.implications.get(&implication.id).copied() {
            state.unlink(&old);
        }
        state.link(&implication);
        state.taxonomy.implications.insert(implication.id, implication);
    }

    /// Removes an implication by id. Returns true when it existed.
    pub fn remove_implication(&self, id: u64) -> bool {
        let mut state = self.state.write();
        let Some(old) = state.taxonomy.implications.remove(&id) else {
            return false;
        };
        state.unlink(&old);
        true
    }

    /// Highest stored implication id, zero when none.
    pub fn latest_implication_id(&self) -> u64 {
        self.state
            .read()
            .taxonomy
            .implications
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    /// Tags directly implied by `tag_id`.
    pub fn parents(&self, tag_id: u64) -> Vec<u64> {
        let state = self.state.read();
        state
            .parents
            .get(&tag_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Tags directly implying `tag_id`.
    pub fn children(&self, tag_id: u64) -> Vec<u64> {
        let state = self.state.read();
        state
            .children
            .get(&tag_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every tag reachable from `tag_id` through implications, ascending.
    ///
    /// Cycles in the implication graph are tolerated; the tag itself is never included.
    pub fn all_parents(&self, tag_id: u64) -> Vec<u64> {
        let state = self.state.read();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([tag_id]);
        while let Some(current) = queue.pop_front() {
            let Some(parents) = state.parents.get(&current) else {
                continue;
            };
            for parent in parents {
                if *parent != tag_id && seen.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Update time of the newest tag seen by the metadata refresh.
    pub fn tag_watermark(&self) -> Option<DateTime<Utc>> {
        self.state.read().taxonomy.tag_watermark
    }

    /// Advances the metadata refresh watermark. Older values are ignored.
    pub fn set_tag_watermark(&self, at: DateTime<Utc>) {
        let mut state = self.state.write();
        let current = &mut state.taxonomy.tag_watermark;
        if current.is_none_or(|c| c < at) {
            *current = Some(at);
        }
    }
}

/// Escapes everything but `*` and `?` for `globset`.
fn escape_glob(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if GLOB_SYNTAX.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
