//! Search execution and pagination.
//!
//! A compiled tree and a ranking plan are translated to a Tantivy query and collected with
//! a custom sort key. One extra hit is fetched to decide whether a next page exists.
//!
//! Pagination works two ways:
//!
//! - **Page numbers** become offsets and stop at `max_offset`.
//! - **Cursors** carry the sort key of the last hit and reach any depth. Unseeded random
//!   orderings cannot be resumed and never hand out a cursor.

mod cursor;
mod sort;

pub use cursor::{Cursor, SortKey, page_offset};
use sort::KeyScorer;
use tagdex_document::Record;
use tagdex_query::{BoolQuery, RankingPlan};
use tantivy::{DocId, SegmentReader, collector::TopDocs};
use tracing::debug;

use crate::{IndexError, RecordIndex};

/// A fully compiled search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Compiled boolean tree.
    pub query: BoolQuery,
    /// Ordering plus any filters it requires.
    pub plan: RankingPlan,
    /// Page size, already clamped by the caller.
    pub limit: usize,
    /// Where the page starts; `None` is the first page.
    pub cursor: Option<Cursor>,
    /// Deepest offset reachable with page numbers.
    pub max_offset: usize,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    /// Matching records in ranking order.
    pub records: Vec<Record>,
    /// Token for the following page, when there is one.
    pub next_cursor: Option<String>,
}

/// Runs a search against the committed state of the index.
pub(crate) fn execute(index: &RecordIndex, request: &SearchRequest) -> Result<SearchPage, IndexError> {
    let query = index
        .translator()
        .translate(&request.query, &request.plan.filters)?;
    let limit = request.limit.max(1);

    let (offset, after) = match request.cursor {
        None => (0, None),
        Some(Cursor::Page(page)) => (page_offset(page, limit, request.max_offset)?, None),
        Some(Cursor::After(key)) => (0, Some(key)),
    };

    let scorer = KeyScorer::new(request.plan.ordering.clone(), after);
    let collector = TopDocs::with_limit(limit + 1)
        .and_offset(offset)
        .custom_score(move |segment: &SegmentReader| {
            let mut keys = scorer.for_segment(segment);
            move |doc: DocId| keys.key(doc)
        });

    let searcher = index.searcher();
    let mut hits: Vec<_> = searcher
        .search(query.as_ref(), &collector)
        .map_err(|e| IndexError::search(&e))?
        .into_iter()
        .filter(|(key, _)| !key.is_excluded())
        .collect();

    let has_more = hits.len() > limit;
    hits.truncate(limit);

    let next_cursor = match hits.last() {
        Some((key, _)) if has_more && request.plan.supports_cursor() => {
            Some(Cursor::encode(*key))
        }
        _ => None,
    };

    let records = hits
        .iter()
        .map(|(_, address)| index.load(&searcher, *address))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        hits = records.len(),
        offset,
        has_more,
        "search executed"
    );
    Ok(SearchPage {
        records,
        next_cursor,
    })
}

#[cfg(test)]
mod tests;
