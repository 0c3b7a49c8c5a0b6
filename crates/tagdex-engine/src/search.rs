//! The search surface: query text in, record views out.

use std::sync::Arc;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tagdex_config::{Config, SearchSettings};
use tagdex_index::{Cursor, RecordView, SearchRequest};
use tagdex_query::{CompileOptions, HotRank, QueryCompiler, RankingPlanner, parse};
use tokio::task;
use tracing::{debug, error};

use crate::{Catalog, Clock, ErrorResponse, SearchError, TagResolver};

/// One search request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Query in the tag language.
    pub query: String,
    /// Page size; the configured default when absent.
    pub limit: Option<usize>,
    /// One-based page number. Ignored when `cursor` is set.
    pub page: Option<usize>,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// Flip the order.
    pub reverse: bool,
    /// Record ids to leave out.
    pub exclude_ids: Vec<u64>,
    /// Content hashes to leave out.
    pub exclude_hashes: Vec<String>,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Matching records in order.
    pub records: Vec<RecordView>,
    /// Cursor for the next page, when one can be resumed.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// How a query was understood, for debugging.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Parsed group tree.
    pub parsed: String,
    /// Compiled boolean tree.
    pub compiled: String,
    /// Ordering and ordering filters.
    pub plan: String,
}

/// Answers searches against a catalog.
pub struct SearchService {
    /// Stores searched.
    catalog: Catalog,
    /// Tag name resolution.
    resolver: Arc<TagResolver>,
    /// Ordering plans.
    planner: RankingPlanner,
    /// Source of "now" for time-windowed orderings.
    clock: Arc<dyn Clock>,
    /// Page size and depth limits.
    settings: SearchSettings,
    /// Root of derived asset URLs.
    asset_base: String,
}

impl SearchService {
    /// Creates a search service.
    pub fn new(
        catalog: Catalog,
        resolver: Arc<TagResolver>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let window = i64::try_from(config.search.rank_window_hours).unwrap_or(i64::MAX);
        let planner = RankingPlanner::new(
            Arc::new(HotRank::default()),
            TimeDelta::try_hours(window).unwrap_or(TimeDelta::MAX),
        );
        Self {
            catalog,
            resolver,
            planner,
            clock,
            settings: config.search.clone(),
            asset_base: config.assets.base_url.clone(),
        }
    }

    /// Runs a search.
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResponse, SearchError> {
        let request = self.prepare(params).await?;
        let catalog = self.catalog.clone();
        let asset_base = self.asset_base.clone();

        let page = task::spawn_blocking(move || {
            let page = catalog.index.search(&request)?;
            let records = page
                .records
                .into_iter()
                .map(|record| RecordView::new(record, &catalog.tags, &asset_base))
                .collect();
            Ok::<_, SearchError>(SearchResponse {
                records,
                next_cursor: page.next_cursor,
            })
        })
        .await
        .map_err(|e| SearchError::Task(e.to_string()))??;

        debug!(query = %params.query, hits = page.records.len(), "search served");
        Ok(page)
    }

    /// Runs a search, mapping failures to the error body callers see.
    ///
    /// Server-side failures are logged in full; the body carries no detail.
    pub async fn respond(&self, params: &SearchParams) -> Result<SearchResponse, ErrorResponse> {
        self.search(params).await.map_err(|e| {
            if !e.is_client_error() {
                error!(query = %params.query, error = %e, "search failed");
            }
            e.response()
        })
    }

    /// Describes how a query is parsed, compiled and ordered, without running it.
    pub async fn explain(&self, params: &SearchParams) -> Result<Explanation, SearchError> {
        let parsed = parse(&params.query)?;
        let request = self.prepare(params).await?;
        Ok(Explanation {
            parsed: parsed.to_string(),
            compiled: request.query.to_string(),
            plan: format!("{:?}", request.plan),
        })
    }

    /// Parses, resolves, compiles and plans a request.
    async fn prepare(&self, params: &SearchParams) -> Result<SearchRequest, SearchError> {
        let parsed = parse(&params.query)?;
        let resolutions = self.resolver.resolve_query(&parsed).await;
        let options = CompileOptions {
            exclude_ids: params.exclude_ids.clone(),
            exclude_hashes: params.exclude_hashes.clone(),
        };
        let query = QueryCompiler::new().compile(&parsed, &resolutions, &options);
        let plan = self
            .planner
            .plan(parsed.order(), params.reverse, self.clock.utc());

        let cursor = match (&params.cursor, params.page) {
            (Some(token), _) => Some(Cursor::decode(token)?),
            (None, Some(page)) => Some(Cursor::Page(page.max(1))),
            (None, None) => None,
        };

        Ok(SearchRequest {
            query,
            plan,
            limit: self.settings.clamp_limit(params.limit),
            cursor,
            max_offset: self.settings.max_offset,
        })
    }
}
