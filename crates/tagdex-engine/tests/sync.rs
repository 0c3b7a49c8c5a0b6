#![allow(clippy::tests_outside_test_module)]
//! End-to-end sync passes against an in-memory upstream.

use std::{
    collections::BTreeMap,
    io::Write,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use flate2::{Compression, write::GzEncoder};
use tagdex_config::Config;
use tagdex_document::{Record, TagCategory};
use tagdex_engine::{
    MAX_PARENT_LOOKUPS, ManualClock, MemoryUpstream, ProvenanceChecker, ProvenanceQueue,
    ProvenanceRegistry, Relation, SearchParams, Services, Stage, UpstreamError, Verdict,
    export_names,
    upstream::{AliasPayload, FilePayload, PostPayload, RelationshipsPayload, ScorePayload, TagPayload},
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A data directory, an upstream and the services over them.
struct Harness {
    /// Keeps the data directory alive.
    _dir: TempDir,
    /// The fake catalog.
    upstream: Arc<MemoryUpstream>,
    /// Services under test.
    services: Services,
}

impl Harness {
    /// Fresh services over an empty data directory.
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let upstream = Arc::new(MemoryUpstream::new());
        let services = open(dir.path(), &upstream);
        Self {
            _dir: dir,
            upstream,
            services,
        }
    }

    /// Record ids returned for a query.
    async fn search(&self, query: &str) -> Vec<u64> {
        let params = SearchParams {
            query: query.into(),
            ..SearchParams::default()
        };
        let page = self.services.search.search(&params).await.unwrap();
        page.records.iter().map(|r| r.id).collect()
    }
}

/// Small pages so every stage walks several of them.
fn config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.sync.page_size = 2;
    config.sync.alias_page_size = 2;
    config
}

/// Services over `data_dir`, reading from `upstream`.
fn open(data_dir: &Path, upstream: &Arc<MemoryUpstream>) -> Services {
    Services::open(
        &config(data_dir),
        upstream.clone(),
        Arc::new(ManualClock::default()),
    )
    .unwrap()
}

/// A fixed point in time, `minutes` after a base.
fn at(minutes: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + minutes * 60, 0)
        .single()
        .unwrap()
}

/// A tag payload.
fn tag(id: u64, name: &str, category: u8, minutes: i64) -> TagPayload {
    TagPayload {
        id,
        name: name.into(),
        category,
        post_count: 0,
        updated_at: Some(at(minutes)),
    }
}

/// A record payload tagged with `tags`, changed `minutes` after the base.
fn post(id: u64, tags: &[&str], parent_id: Option<u64>, minutes: i64) -> PostPayload {
    PostPayload {
        id,
        created_at: at(id as i64),
        updated_at: Some(at(minutes)),
        file: FilePayload {
            width: 100,
            height: 100,
            ext: "png".into(),
            size: 1024,
            md5: Some(format!("{id:032x}")),
        },
        score: ScorePayload { total: 1 },
        tags: BTreeMap::from([(
            "general".to_string(),
            tags.iter().map(|t| (*t).to_string()).collect(),
        )]),
        rating: "s".into(),
        fav_count: 0,
        comment_count: 0,
        sources: Vec::new(),
        relationships: RelationshipsPayload {
            parent_id,
            children: Vec::new(),
        },
        flags: Default::default(),
        uploader_id: Some(1),
        approver_id: None,
        duration: None,
    }
}

/// An alias or implication payload.
fn link(id: u64, antecedent: &str, consequent: &str, status: &str) -> AliasPayload {
    AliasPayload {
        id,
        antecedent_name: antecedent.into(),
        consequent_name: consequent.into(),
        status: status.into(),
        updated_at: None,
    }
}

/// Gzip-compressed bytes of `text`.
fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn first_pass_ingests_everything() {
    let h = Harness::new();
    h.upstream.put_tag(tag(1, "wolf", 5, 0));
    h.upstream.put_tag(tag(2, "blue_eyes", 0, 0));
    for id in 1..=5 {
        h.upstream.put_post(post(id, &["wolf", "blue_eyes"], None, id as i64));
    }

    let report = h.services.sync.run_pass().await.unwrap();
    assert_eq!(report.new_records, 5);
    assert_eq!(h.services.sync.stage(), Stage::Idle);
    assert_eq!(h.search("wolf").await, vec![5, 4, 3, 2, 1]);

    let wolf = h.services.catalog.tags.by_name("wolf").unwrap();
    assert_eq!(wolf.category, TagCategory::Species);
    assert_eq!(wolf.post_count, 5);
}

#[tokio::test]
async fn second_pass_applies_only_changes() {
    let h = Harness::new();
    h.upstream.put_tag(tag(1, "wolf", 5, 0));
    h.upstream.put_tag(tag(2, "fox", 5, 0));
    for id in 1..=3 {
        h.upstream.put_post(post(id, &["wolf"], None, id as i64));
    }
    h.services.sync.run_pass().await.unwrap();

    h.upstream.put_post(post(2, &["fox"], None, 10));
    let report = h.services.sync.run_pass().await.unwrap();
    assert_eq!(report.new_records, 0);
    assert_eq!(report.updated_records, 1);
    assert_eq!(h.search("fox").await, vec![2]);
    assert_eq!(h.search("wolf").await, vec![3, 1]);
    assert_eq!(h.services.catalog.tags.by_name("wolf").unwrap().post_count, 2);
}

#[tokio::test]
async fn waiting_parents_are_fetched_by_id() {
    let h = Harness::new();
    h.upstream.put_tag(tag(1, "wolf", 5, 0));
    h.upstream.put_post(post(10, &["wolf"], Some(8), 20));
    h.services.sync.run_pass().await.unwrap();
    assert_eq!(h.services.catalog.hanging.parent_ids(), vec![8]);

    h.upstream.put_post(post(8, &["wolf"], None, 5));
    let report = h.services.sync.run_pass().await.unwrap();
    assert_eq!(report.reconciled_parents, 1);
    assert!(h.services.catalog.hanging.is_empty());

    let parent = h.services.catalog.index.get(8).unwrap().unwrap();
    assert_eq!(parent.children.into_iter().collect::<Vec<_>>(), vec![10]);
    assert_eq!(h.search("isparent:true").await, vec![8]);
}

#[tokio::test]
async fn missing_parents_are_given_up_on() {
    let h = Harness::new();
    h.upstream.put_tag(tag(1, "wolf", 5, 0));
    h.upstream.put_post(post(10, &["wolf"], Some(8), 20));

    for _ in 1..MAX_PARENT_LOOKUPS {
        h.services.sync.run_pass().await.unwrap();
    }
    assert_eq!(h.services.catalog.hanging.parent_ids(), vec![8]);
    assert_eq!(
        h.services.catalog.hanging.get(8).unwrap().misses,
        MAX_PARENT_LOOKUPS - 1
    );

    let report = h.services.sync.run_pass().await.unwrap();
    assert_eq!(report.reconciled_parents, 0);
    assert!(h.services.catalog.hanging.is_empty());
}

#[tokio::test]
async fn shutdown_mid_pass_keeps_stores_in_step() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(MemoryUpstream::new());
    upstream.put_tag(tag(1, "wolf", 5, 0));
    for id in 1..=4 {
        let parent = (id == 4).then_some(99);
        upstream.put_post(post(id, &["wolf"], parent, id as i64));
    }
    let services = open(dir.path(), &upstream);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    let mut stages = services.sync.stage_receiver();
    let watcher = tokio::spawn(async move {
        while stages.changed().await.is_ok() {
            let stage = *stages.borrow();
            if stage != Stage::FetchingNew {
                trigger.cancel();
                break;
            }
        }
    });
    services.sync.run(shutdown).await;
    watcher.await.unwrap();
    assert_eq!(services.sync.stage(), Stage::Idle);
    drop(services);

    let reopened = open(dir.path(), &upstream);
    assert_eq!(reopened.catalog.index.num_records(), 4);
    let wolf = reopened.catalog.tags.by_name("wolf").map(|t| t.post_count);
    assert_eq!(wolf, Some(4));
    assert_eq!(reopened.catalog.hanging.parent_ids(), vec![99]);
}

#[tokio::test]
async fn cancelled_engine_starts_no_pass() {
    let h = Harness::new();
    h.upstream.put_tag(tag(1, "wolf", 5, 0));
    h.upstream.put_post(post(1, &["wolf"], None, 1));

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    h.services.sync.run(shutdown).await;
    assert_eq!(h.services.catalog.index.num_records(), 0);
}

#[tokio::test]
async fn recategorized_tags_move_between_buckets() {
    let h = Harness::new();
    h.upstream.put_tag(tag(1, "wolf", 0, 0));
    h.upstream.put_post(post(1, &["wolf"], None, 1));
    h.upstream.put_post(post(2, &["wolf"], None, 2));
    h.services.sync.run_pass().await.unwrap();
    assert!(h.search("spectags:1").await.is_empty());

    h.upstream.put_tag(tag(1, "wolf", 5, 60));
    let report = h.services.sync.run_pass().await.unwrap();
    assert_eq!(report.tags_refreshed, 1);
    assert_eq!(report.migrated_records, 2);

    let record = h.services.catalog.index.get(1).unwrap().unwrap();
    assert_eq!(record.tags.category_of(1), Some(TagCategory::Species));
    assert_eq!(h.search("spectags:1").await, vec![2, 1]);
    assert_eq!(h.search("wolf").await, vec![2, 1]);
}

#[tokio::test]
async fn taxonomy_follows_aliases_and_implications() {
    let h = Harness::new();
    h.upstream.put_tag(tag(1, "wolf", 5, 0));
    h.upstream.put_tag(tag(2, "canine", 5, 0));
    h.upstream.put_post(post(1, &["wolf"], None, 1));
    h.upstream.put_alias(link(1, "canis_lupus", "wolf", "active"));
    h.upstream.put_alias(link(2, "wolfie", "wolf", "deleted"));
    h.upstream.put_alias(link(3, "lobo", "wolf", "active"));
    h.upstream.put_implication(link(1, "wolf", "canine", "active"));
    h.upstream.put_implication(link(2, "wolf", "wolf", "active"));

    let report = h.services.sync.run_pass().await.unwrap();
    assert_eq!(report.aliases, 2);
    assert_eq!(report.implications, 1);

    assert_eq!(h.search("canis_lupus").await, vec![1]);
    assert_eq!(h.search("lobo").await, vec![1]);
    assert!(h.search("wolfie").await.is_empty());

    let names = vec!["canis_lupus".to_string()];
    let relations = h
        .services
        .tags
        .relationships(&names, &[Relation::Parents])
        .await
        .unwrap();
    let parents = relations["canis_lupus"].parents.clone().unwrap();
    assert_eq!(parents.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["canine"]);
}

#[tokio::test]
async fn rate_limiting_does_not_advance_state() {
    let h = Harness::new();
    h.upstream.put_tag(tag(1, "wolf", 5, 0));
    h.upstream.put_post(post(1, &["wolf"], None, 1));
    h.upstream.set_throttled(true);

    let err = h.services.sync.run_pass().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(h.services.sync.stage(), Stage::Idle);
    assert_eq!(h.services.catalog.index.num_records(), 0);

    h.upstream.set_throttled(false);
    let report = h.services.sync.run_pass().await.unwrap();
    assert_eq!(report.new_records, 1);
}

#[tokio::test]
async fn export_rebuilds_the_catalog() {
    let h = Harness::new();
    let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    let [tags_name, aliases_name, posts_name] = export_names(date);

    h.upstream.put_export(
        tags_name,
        gzip("id,name,category,post_count\n1,wolf,5,900\n2,blue_eyes,0,300\n"),
    );
    h.upstream.put_export(
        aliases_name,
        gzip(concat!(
            "id,antecedent_name,consequent_name,created_at,status\n",
            "1,canis_lupus,wolf,2020-01-01 00:00:00.000,active\n",
        )),
    );
    h.upstream.put_export(
        posts_name,
        gzip(concat!(
            "id,uploader_id,created_at,md5,source,rating,image_width,image_height,tag_string,",
            "fav_count,file_ext,parent_id,change_seq,approver_id,file_size,comment_count,",
            "description,duration,updated_at,is_deleted,is_pending,is_flagged,score,up_score,",
            "down_score,is_rating_locked,is_status_locked,is_note_locked\n",
            "2,5,2024-03-01 10:00:00.000,bbbb,https://art.example/2,s,800,600,wolf blue_eyes,",
            "3,png,1,77,,1000,0,,,2024-03-02 10:00:00.000,f,f,f,4,4,0,f,f,f\n",
            "1,5,2024-03-01 09:00:00.000,aaaa,,q,640,480,wolf,",
            "1,jpg,,78,9,2000,2,,,2024-03-02 09:00:00.000,f,f,f,2,2,0,f,f,f\n",
            "3,5,2024-03-01 11:00:00.000,cccc,,e,640,480,wolf,",
            "0,jpg,,79,,3000,0,,,2024-03-02 11:00:00.000,t,f,f,0,0,0,f,f,f\n",
        )),
    );

    let report = h.services.sync.resync(date).await.unwrap();
    assert_eq!(report.tags, 2);
    assert_eq!(report.records, 3);
    assert_eq!(report.written, 3);
    assert_eq!(report.aliases, 1);

    let tags = &h.services.catalog.tags;
    assert_eq!(tags.by_name("wolf").unwrap().post_count, 2);
    assert_eq!(tags.by_name("blue_eyes").unwrap().post_count, 1);

    let parent = h.services.catalog.index.get(1).unwrap().unwrap();
    assert_eq!(parent.children.into_iter().collect::<Vec<_>>(), vec![2]);
    assert!(h.services.catalog.hanging.is_empty());

    assert_eq!(h.search("canis_lupus").await, vec![2, 1]);
    assert_eq!(h.search("canis_lupus status:any").await, vec![3, 2, 1]);
    assert_eq!(h.search("source:*art.example*").await, vec![2]);
    assert_eq!(h.upstream.tag_lookups(), 0);
}

/// Accepts sources on one host and counts verifications.
#[derive(Default)]
struct ArtChecker {
    /// Verifications performed.
    calls: AtomicUsize,
}

#[async_trait]
impl ProvenanceChecker for ArtChecker {
    fn name(&self) -> &str {
        "art"
    }

    fn supports(&self, url: &Url) -> bool {
        url.host_str() == Some("art.example")
    }

    async fn verify(&self, _record: &Record, _source: &Url) -> Result<Verdict, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Verdict::Match)
    }
}

#[tokio::test]
async fn pending_records_are_offered_for_verification() {
    let checker = Arc::new(ArtChecker::default());
    let mut registry = ProvenanceRegistry::new();
    registry.register(checker.clone());
    let (queue, worker) = ProvenanceQueue::new(registry, 8);

    let mut h = Harness::new();
    h.services = h.services.with_provenance(queue);
    h.upstream.put_tag(tag(1, "wolf", 5, 0));

    let mut sourced = post(1, &["wolf"], None, 1);
    sourced.flags.pending = true;
    sourced.sources = vec!["https://art.example/works/1".into()];
    let mut unsourced = post(2, &["wolf"], None, 2);
    unsourced.flags.pending = true;
    let mut approved = post(3, &["wolf"], None, 3);
    approved.sources = vec!["https://art.example/works/3".into()];
    for p in [sourced, unsourced, approved] {
        h.upstream.put_post(p);
    }

    let report = h.services.sync.run_pass().await.unwrap();
    assert_eq!(report.new_records, 3);

    drop(h);
    worker.run(CancellationToken::new()).await;
    assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
}
