use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use tagdex_document::{Rating, Record, RecordFlags, TagBuckets, TagCategory};
use tagdex_query::{CompileOptions, QueryCompiler, RankingPlanner, Resolutions, parse};

use super::*;

/// Creation time of record zero in the fixture.
const BASE_TS: i64 = 1_700_000_000;

/// Builds a plain safe record tagged with general tags.
fn record(id: u64, tags: &[u64]) -> Record {
    let mut buckets = TagBuckets::new();
    for tag in tags {
        buckets.insert(TagCategory::General, *tag);
    }
    let created = DateTime::from_timestamp(BASE_TS + id as i64 * 60, 0).unwrap_or_default();
    Record {
        id,
        tags: buckets,
        uploader_id: 1,
        approver_id: None,
        created_at: created,
        updated_at: created,
        content_hash: format!("{id:032x}"),
        sources: vec![],
        rating: Rating::Safe,
        width: 100,
        height: 100,
        duration: 0.0,
        favorite_count: 0,
        score: 0,
        parent_id: None,
        children: BTreeSet::new(),
        file_type: "png".into(),
        file_size: 10,
        comment_count: 0,
        flags: RecordFlags::default(),
    }
}

/// Six records: tag 1 is `blue_eyes`, 2 is `red_eyes`, 3 is `wolf`. Record 3 is deleted.
fn fixture() -> RecordIndex {
    let index = RecordIndex::in_memory().unwrap();

    let mut one = record(1, &[1]);
    one.score = 10;
    one.height = 50;

    let mut two = record(2, &[2]);
    two.rating = Rating::Explicit;
    two.score = 5;

    let mut three = record(3, &[1, 2]);
    three.score = -1;
    three.flags.deleted = true;

    let mut four = record(4, &[3]);
    four.score = 20;
    four.sources = vec!["https://www.furaffinity.net/view/1".into()];

    let mut five = record(5, &[1, 3]);
    five.rating = Rating::Questionable;
    five.parent_id = Some(4);

    let mut six = record(6, &[2]);
    six.score = 3;
    six.width = 300;

    let report = index
        .write_batch(&[one, two, three, four, five, six])
        .unwrap();
    assert!(report.is_clean());
    index
}

/// Name lookups for the fixture's tags.
fn resolutions() -> Resolutions {
    let mut ids = Resolutions::new();
    ids.insert("blue_eyes", vec![1]);
    ids.insert("red_eyes", vec![2]);
    ids.insert("wolf", vec![3]);
    ids
}

/// Compiles a query string into a request.
fn request(query: &str, limit: usize, cursor: Option<Cursor>) -> SearchRequest {
    request_with(query, limit, cursor, &CompileOptions::default(), false)
}

/// Compiles a query string with exclusions and an optional reversal.
fn request_with(
    query: &str,
    limit: usize,
    cursor: Option<Cursor>,
    options: &CompileOptions,
    reverse: bool,
) -> SearchRequest {
    let parsed = parse(query).unwrap();
    let compiled = QueryCompiler::new().compile(&parsed, &resolutions(), options);
    let now = DateTime::from_timestamp(BASE_TS + 3600, 0).unwrap();
    let plan = RankingPlanner::default().plan(parsed.order(), reverse, now);
    SearchRequest {
        query: compiled,
        plan,
        limit,
        cursor,
        max_offset: 10_000,
    }
}

/// Ids of a page in order.
fn ids(page: &SearchPage) -> Vec<u64> {
    page.records.iter().map(|r| r.id).collect()
}

/// Runs a query and returns the ids of the first page.
fn search_ids(index: &RecordIndex, query: &str) -> Vec<u64> {
    ids(&index.search(&request(query, 50, None)).unwrap())
}

#[test]
fn union_with_rating_filter() {
    let index = fixture();
    assert_eq!(search_ids(&index, "blue_eyes ~ red_eyes rating:s"), vec![6, 1]);
}

#[test]
fn empty_query_lists_live_records_newest_first() {
    let index = fixture();
    assert_eq!(search_ids(&index, ""), vec![6, 5, 4, 2, 1]);
}

#[test]
fn status_opt_in_shows_deleted() {
    let index = fixture();
    assert_eq!(search_ids(&index, "status:deleted"), vec![3]);
    assert_eq!(search_ids(&index, "status:any"), vec![6, 5, 4, 3, 2, 1]);
}

#[test]
fn negation_and_negated_union() {
    let index = fixture();
    assert_eq!(search_ids(&index, "-wolf"), vec![6, 2, 1]);
    assert_eq!(search_ids(&index, "blue_eyes ~ -wolf"), vec![6, 5, 2, 1]);
}

#[test]
fn unknown_tag_is_dropped() {
    let index = fixture();
    assert_eq!(search_ids(&index, "wolf nonexistent"), vec![5, 4]);
}

#[test]
fn numeric_and_relationship_predicates() {
    let index = fixture();
    assert_eq!(search_ids(&index, "score:>=5"), vec![4, 2, 1]);
    assert_eq!(search_ids(&index, "ischild:true"), vec![5]);
    assert_eq!(search_ids(&index, "parent:4"), vec![5]);
    assert_eq!(search_ids(&index, "width:300"), vec![6]);
}

#[test]
fn source_wildcard_matches_substring() {
    let index = fixture();
    assert_eq!(search_ids(&index, "source:*furaffinity*"), vec![4]);
    assert_eq!(search_ids(&index, "source:none blue_eyes"), vec![5, 1]);
}

#[test]
fn field_orders_break_ties_on_id() {
    let index = fixture();
    assert_eq!(search_ids(&index, "order:score"), vec![4, 1, 2, 6, 5]);
    assert_eq!(search_ids(&index, "order:score_asc"), vec![5, 6, 2, 1, 4]);
    assert_eq!(search_ids(&index, "order:landscape"), vec![6, 1, 5, 4, 2]);
}

#[test]
fn reverse_flips_the_ordering() {
    let index = fixture();
    let page = index
        .search(&request_with("", 50, None, &CompileOptions::default(), true))
        .unwrap();
    assert_eq!(ids(&page), vec![1, 2, 4, 5, 6]);
}

#[test]
fn exclusions_drop_ids_and_hashes() {
    let index = fixture();
    let options = CompileOptions {
        exclude_ids: vec![6],
        exclude_hashes: vec![format!("{:032X}", 1)],
    };
    let page = index
        .search(&request_with("", 50, None, &options, false))
        .unwrap();
    assert_eq!(ids(&page), vec![5, 4, 2]);
}

#[test]
fn cursor_walks_every_record_once() {
    let index = fixture();
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = index.search(&request("", 2, cursor)).unwrap();
        assert!(page.records.len() <= 2);
        seen.extend(ids(&page));
        match page.next_cursor {
            Some(token) => cursor = Some(Cursor::decode(&token).unwrap()),
            None => break,
        }
    }
    assert_eq!(seen, vec![6, 5, 4, 2, 1]);
}

#[test]
fn cursor_resumes_field_ordering() {
    let index = fixture();
    let first = index.search(&request("order:score", 2, None)).unwrap();
    assert_eq!(ids(&first), vec![4, 1]);
    let token = first.next_cursor.unwrap();
    let second = index
        .search(&request("order:score", 2, Some(Cursor::decode(&token).unwrap())))
        .unwrap();
    assert_eq!(ids(&second), vec![2, 6]);
}

#[test]
fn last_page_has_no_cursor() {
    let index = fixture();
    let page = index.search(&request("", 5, None)).unwrap();
    assert_eq!(page.records.len(), 5);
    assert!(page.next_cursor.is_none());
}

#[test]
fn page_numbers_become_offsets() {
    let index = fixture();
    let page = index.search(&request("", 2, Some(Cursor::Page(2)))).unwrap();
    assert_eq!(ids(&page), vec![4, 2]);
}

#[test]
fn deep_pages_are_refused() {
    let index = fixture();
    let mut deep = request("", 50, Some(Cursor::Page(300)));
    deep.max_offset = 1000;
    let err = index.search(&deep).unwrap_err();
    assert!(matches!(err, IndexError::PageTooDeep { page: 300, .. }));
    assert!(err.is_client_error());
}

#[test]
fn seeded_random_is_repeatable() {
    let index = fixture();
    let first = search_ids(&index, "order:random:42");
    let second = search_ids(&index, "random:42");
    assert_eq!(first, second);
    let set: HashSet<u64> = first.iter().copied().collect();
    assert_eq!(set, HashSet::from([1, 2, 4, 5, 6]));
}

#[test]
fn seeded_random_pages_resume() {
    let index = fixture();
    let all = search_ids(&index, "order:random:42");
    let first = index.search(&request("order:random:42", 3, None)).unwrap();
    let token = first.next_cursor.clone().unwrap();
    let second = index
        .search(&request("order:random:42", 3, Some(Cursor::decode(&token).unwrap())))
        .unwrap();
    let mut joined = ids(&first);
    joined.extend(ids(&second));
    assert_eq!(joined, all);
}

#[test]
fn unseeded_random_never_offers_cursor() {
    let index = fixture();
    let page = index.search(&request("order:random", 2, None)).unwrap();
    assert_eq!(page.records.len(), 2);
    assert!(page.next_cursor.is_none());
}

#[test]
fn hot_rank_orders_recent_positive_scores() {
    let index = fixture();
    assert_eq!(search_ids(&index, "order:rank"), vec![4, 1, 2, 6]);
}

#[test]
fn hot_rank_window_drops_old_records() {
    let index = fixture();
    let mut old = record(7, &[]);
    old.score = 100;
    old.created_at -= TimeDelta::days(30);
    index.write_batch(&[old]).unwrap();
    assert_eq!(search_ids(&index, "order:rank"), vec![4, 1, 2, 6]);
    assert_eq!(search_ids(&index, "order:score")[0], 7);
}
