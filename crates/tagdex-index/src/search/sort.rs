//! Per-document sort keys.
//!
//! Every ordering is reduced to a [`SortKey`] computed from fast fields and collected with
//! Tantivy's custom-score top-docs collector. Ascending directions negate their value.

use std::{hash::Hasher, sync::Arc};

use siphasher::sip::SipHasher24;
use tagdex_query::{Direction, Ordering, ScoringStrategy, SortSpec};
use tantivy::{DocId, SegmentReader, columnar::Column};

use super::cursor::SortKey;
use crate::schema::{SortColumn, sort_column};

/// Multiplier turning a direction into "greater comes first".
fn sign(direction: Direction) -> f64 {
    match direction {
        Direction::Descending => 1.0,
        Direction::Ascending => -1.0,
    }
}

/// Stable pseudo-random value of a record under a seed.
fn seeded(seed: u64, id: i64) -> f64 {
    let mut hasher = SipHasher24::new_with_keys(seed, 0);
    hasher.write_i64(id);
    // 53 bits fit an f64 exactly
    (hasher.finish() >> 11) as f64
}

/// Builds segment scorers for one ordering, skipping keys not after a cursor.
#[derive(Debug, Clone)]
pub struct KeyScorer {
    /// Requested ordering.
    ordering: Ordering,
    /// Keys at or before this one are excluded.
    after: Option<SortKey>,
}

impl KeyScorer {
    /// Creates a scorer.
    pub fn new(ordering: Ordering, after: Option<SortKey>) -> Self {
        Self { ordering, after }
    }

    /// Opens the fast columns of one segment.
    pub fn for_segment(&self, segment: &SegmentReader) -> SegmentKeys {
        let fast = segment.fast_fields();
        let id = fast.i64("id").ok();
        let (parts, id_sign) = match &self.ordering {
            Ordering::Fields(specs) => {
                let id_sign = specs.first().map_or(1.0, |s| sign(s.direction));
                let parts = specs
                    .iter()
                    .take(2)
                    .map(|spec| column_part(segment, *spec))
                    .collect();
                (parts, id_sign)
            }
            Ordering::HotRank {
                direction,
                strategy,
            } => (
                vec![KeyPart::HotRank {
                    score: fast.i64("score").ok(),
                    created_at: fast.i64("created_at").ok(),
                    strategy: Arc::clone(strategy),
                    sign: sign(*direction),
                }],
                sign(*direction),
            ),
            Ordering::Random { seed: Some(seed) } => (vec![KeyPart::Seeded(*seed)], 1.0),
            Ordering::Random { seed: None } => (vec![KeyPart::Shuffled], 1.0),
        };
        SegmentKeys {
            parts,
            id,
            id_sign,
            after: self.after,
        }
    }
}

/// Opens the column behind one field sort.
fn column_part(segment: &SegmentReader, spec: SortSpec) -> KeyPart {
    let fast = segment.fast_fields();
    let column = match sort_column(spec.field) {
        SortColumn::Int(name) => fast.i64(name).ok().map(NumericColumn::Int),
        SortColumn::Float(name) => fast.f64(name).ok().map(NumericColumn::Float),
    };
    KeyPart::Column(column, sign(spec.direction))
}

/// A fast column of either numeric type.
enum NumericColumn {
    /// Integer column.
    Int(Column<i64>),
    /// Float column.
    Float(Column<f64>),
}

impl NumericColumn {
    /// Value of a document, zero when missing.
    fn value(&self, doc: DocId) -> f64 {
        match self {
            Self::Int(column) => column.first(doc).unwrap_or(0) as f64,
            Self::Float(column) => column.first(doc).unwrap_or(0.0),
        }
    }
}

/// One component of a sort key.
enum KeyPart {
    /// Signed fast field value.
    Column(Option<NumericColumn>, f64),
    /// Signed hot-rank score.
    HotRank {
        /// Vote score column.
        score: Option<Column<i64>>,
        /// Creation time column.
        created_at: Option<Column<i64>>,
        /// Ranking formula.
        strategy: Arc<dyn ScoringStrategy>,
        /// Direction multiplier.
        sign: f64,
    },
    /// Hash of the id under a seed.
    Seeded(u64),
    /// Fresh randomness per call.
    Shuffled,
}

impl KeyPart {
    /// Value of this component for a document.
    fn value(&self, doc: DocId, id: i64) -> f64 {
        match self {
            Self::Column(column, sign) => column.as_ref().map_or(0.0, |c| c.value(doc)) * sign,
            Self::HotRank {
                score,
                created_at,
                strategy,
                sign,
            } => {
                let score = score.as_ref().and_then(|c| c.first(doc)).unwrap_or(0);
                let created = created_at.as_ref().and_then(|c| c.first(doc)).unwrap_or(0);
                strategy.score(score, created) * sign
            }
            Self::Seeded(seed) => seeded(*seed, id),
            Self::Shuffled => f64::from(rand::random::<u32>()),
        }
    }
}

/// Sort-key source for one segment.
pub struct SegmentKeys {
    /// Primary and secondary components.
    parts: Vec<KeyPart>,
    /// Id column for the tie-breaker.
    id: Option<Column<i64>>,
    /// Direction of the tie-breaker.
    id_sign: f64,
    /// Cursor bound.
    after: Option<SortKey>,
}

impl SegmentKeys {
    /// Computes the key of a document, or the exclusion sentinel when it precedes the cursor.
    pub fn key(&mut self, doc: DocId) -> SortKey {
        let id = self.id.as_ref().and_then(|c| c.first(doc)).unwrap_or(0);
        let mut values = [0.0; 3];
        for (slot, part) in values.iter_mut().zip(&self.parts) {
            *slot = part.value(doc, id);
        }
        values[2] = id as f64 * self.id_sign;

        let key = SortKey(values);
        match self.after {
            Some(after) if key >= after => SortKey::EXCLUDED,
            _ => key,
        }
    }
}
