//! Ranking plans.
//!
//! Converts the ordering directives of a query into a concrete sort. Every plan breaks ties
//! on record id so page boundaries are stable.

use std::{fmt, ops::Bound, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    classify::{Direction, FieldPredicate, IntField, OrderDirective, Range, SortField},
    compile::Clause,
};

/// Scores a record for the hot-rank ordering.
pub trait ScoringStrategy: fmt::Debug + Send + Sync {
    /// Computes the rank of a record with vote `score` created at `created_at` unix seconds.
    fn score(&self, score: i64, created_at: i64) -> f64;
}

/// Logarithmic vote weight plus linear time decay.
///
/// `log_base(score) + (created_at - reference_epoch) / decay`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotRank {
    /// Zero point for the time term, unix seconds.
    pub reference_epoch: i64,
    /// Seconds per unit of rank.
    pub decay: f64,
    /// Logarithm base for the vote term.
    pub base: f64,
}

impl Default for HotRank {
    fn default() -> Self {
        Self {
            // 2005-05-24T00:00:00Z
            reference_epoch: 1_116_892_800,
            decay: 35_000.0,
            base: 3.0,
        }
    }
}

impl ScoringStrategy for HotRank {
    fn score(&self, score: i64, created_at: i64) -> f64 {
        let votes = score.max(1) as f64;
        votes.log(self.base) + (created_at - self.reference_epoch) as f64 / self.decay
    }
}

/// One key of a field sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort by.
    pub field: SortField,
    /// Direction.
    pub direction: Direction,
}

impl SortSpec {
    /// Creates a sort key.
    pub fn new(field: SortField, direction: Direction) -> Self {
        Self { field, direction }
    }

    /// The same key in the opposite direction.
    fn reversed(self) -> Self {
        Self::new(self.field, self.direction.reversed())
    }
}

/// How results are ordered.
#[derive(Debug, Clone)]
pub enum Ordering {
    /// Sort by one or two fields, then by id in the primary direction.
    Fields(Vec<SortSpec>),
    /// Sort by a computed popularity score.
    HotRank {
        /// Direction of the score sort.
        direction: Direction,
        /// Formula producing the score.
        strategy: Arc<dyn ScoringStrategy>,
    },
    /// Pseudo-random order. Without a seed each call shuffles differently.
    Random {
        /// Seed making the order reproducible.
        seed: Option<u64>,
    },
}

/// Ordering plus any filters the ordering requires.
#[derive(Debug, Clone)]
pub struct RankingPlan {
    /// How results are ordered.
    pub ordering: Ordering,
    /// Extra `must` clauses, e.g. the hot-rank recency window.
    pub filters: Vec<Clause>,
}

impl RankingPlan {
    /// Whether an opaque sort-key cursor can resume this ordering.
    ///
    /// Unseeded random orders are not repeatable, so their pages cannot be resumed.
    pub fn supports_cursor(&self) -> bool {
        !matches!(self.ordering, Ordering::Random { seed: None })
    }
}

/// Builds ranking plans from ordering directives.
#[derive(Debug, Clone)]
pub struct RankingPlanner {
    /// Formula for hot-rank ordering.
    strategy: Arc<dyn ScoringStrategy>,
    /// How far back hot-rank looks.
    rank_window: TimeDelta,
}

impl Default for RankingPlanner {
    fn default() -> Self {
        Self::new(Arc::new(HotRank::default()), TimeDelta::hours(48))
    }
}

impl RankingPlanner {
    /// Creates a planner with the given hot-rank formula and recency window.
    pub fn new(strategy: Arc<dyn ScoringStrategy>, rank_window: TimeDelta) -> Self {
        Self {
            strategy,
            rank_window,
        }
    }

    /// Plans the ordering for a query.
    ///
    /// The first directive wins. A `randseed:` directive only supplies the seed for a
    /// random ordering. Without directives records come newest id first. `reverse` flips
    /// the direction of every sort key.
    pub fn plan(
        &self,
        directives: &[OrderDirective],
        reverse: bool,
        now: DateTime<Utc>,
    ) -> RankingPlan {
        let seed = directives.iter().find_map(|d| match d {
            OrderDirective::Seed(s) => Some(*s),
            _ => None,
        });
        let first = directives
            .iter()
            .find(|d| !matches!(d, OrderDirective::Seed(_)));

        let mut filters = Vec::new();
        let ordering = match first {
            None | Some(OrderDirective::Seed(_)) => {
                Ordering::Fields(vec![SortSpec::new(SortField::Id, Direction::Descending)])
            }
            Some(OrderDirective::Field { field, direction }) => {
                Ordering::Fields(vec![SortSpec::new(*field, *direction)])
            }
            Some(OrderDirective::Landscape) => Ordering::Fields(vec![
                SortSpec::new(SortField::Width, Direction::Descending),
                SortSpec::new(SortField::Height, Direction::Ascending),
            ]),
            Some(OrderDirective::Portrait) => Ordering::Fields(vec![
                SortSpec::new(SortField::Height, Direction::Descending),
                SortSpec::new(SortField::Width, Direction::Ascending),
            ]),
            Some(OrderDirective::Rank(direction)) => {
                filters = self.rank_filters(now);
                Ordering::HotRank {
                    direction: *direction,
                    strategy: Arc::clone(&self.strategy),
                }
            }
            Some(OrderDirective::Random(explicit)) => Ordering::Random {
                seed: explicit.or(seed),
            },
        };

        let ordering = if reverse {
            reverse_ordering(ordering)
        } else {
            ordering
        };
        RankingPlan { ordering, filters }
    }

    /// Positive score within the recency window.
    fn rank_filters(&self, now: DateTime<Utc>) -> Vec<Clause> {
        let since = (now - self.rank_window).timestamp();
        vec![
            Clause::Field(FieldPredicate::Int {
                field: IntField::Score,
                range: Range {
                    lower: Bound::Excluded(0),
                    upper: Bound::Unbounded,
                },
            }),
            Clause::Field(FieldPredicate::Int {
                field: IntField::CreatedAt,
                range: Range {
                    lower: Bound::Included(since),
                    upper: Bound::Unbounded,
                },
            }),
        ]
    }
}

/// Flips every direction in an ordering.
fn reverse_ordering(ordering: Ordering) -> Ordering {
    match ordering {
        Ordering::Fields(specs) => {
            Ordering::Fields(specs.into_iter().map(SortSpec::reversed).collect())
        }
        Ordering::HotRank {
            direction,
            strategy,
        } => Ordering::HotRank {
            direction: direction.reversed(),
            strategy,
        },
        random @ Ordering::Random { .. } => random,
    }
}
