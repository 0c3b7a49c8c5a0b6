//! Meta-tag classification.
//!
//! A `key:value` token is either a field predicate, an ordering directive, or neither.
//! Classification is permissive: unknown keys and unparsable values are reported as
//! [`MetaTag::Ignore`] and the token falls back to being a plain tag name.

use std::ops::Bound;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tagdex_document::{Rating, TagCategory};

/// An inclusive/exclusive interval over a field's value domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    /// Lower bound.
    pub lower: Bound<T>,
    /// Upper bound.
    pub upper: Bound<T>,
}

impl<T: PartialOrd + Copy> Range<T> {
    /// Range containing exactly the closed interval `[lower, upper]`.
    pub fn between(lower: T, upper: T) -> Self {
        Self {
            lower: Bound::Included(lower),
            upper: Bound::Included(upper),
        }
    }

    /// Returns true when `value` falls inside the range.
    pub fn contains(&self, value: T) -> bool {
        let above = match self.lower {
            Bound::Included(l) => value >= l,
            Bound::Excluded(l) => value > l,
            Bound::Unbounded => true,
        };
        let below = match self.upper {
            Bound::Included(u) => value <= u,
            Bound::Excluded(u) => value < u,
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// Integer-valued record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntField {
    /// Record id.
    Id,
    /// Net vote score.
    Score,
    /// Favorite count.
    FavoriteCount,
    /// Comment count.
    CommentCount,
    /// Total number of tags.
    TagCount,
    /// Number of tags in one category.
    CategoryCount(TagCategory),
    /// Width in pixels.
    Width,
    /// Height in pixels.
    Height,
    /// File size in bytes.
    FileSize,
    /// Creation time as unix seconds.
    CreatedAt,
    /// Uploader id.
    UploaderId,
    /// Approver id.
    ApproverId,
}

/// Float-valued record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatField {
    /// Megapixels.
    Megapixels,
    /// Width over height, two decimals.
    Ratio,
    /// Duration in seconds.
    Duration,
}

/// Moderation status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Neither pending, flagged nor deleted.
    Active,
    /// Awaiting approval.
    Pending,
    /// Flagged for review.
    Flagged,
    /// Deleted.
    Deleted,
    /// Pending or flagged.
    Modqueue,
    /// Every status, deleted included.
    Any,
}

/// Lock flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Rating is locked.
    RatingLocked,
    /// Notes are locked.
    NoteLocked,
    /// Status is locked.
    StatusLocked,
}

/// Source URL filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMatch {
    /// Exact, case-insensitive URL.
    Exact(String),
    /// Pattern where `*` matches any run of characters.
    Wildcard(String),
    /// Record has no sources.
    None,
}

/// A filter on a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    /// Integer field within a range.
    Int {
        /// Field being filtered.
        field: IntField,
        /// Accepted values.
        range: Range<i64>,
    },
    /// Float field within a range.
    Float {
        /// Field being filtered.
        field: FloatField,
        /// Accepted values.
        range: Range<f64>,
    },
    /// Rating equals.
    Rating(Rating),
    /// File extension equals.
    FileType(String),
    /// Moderation status.
    Status(Status),
    /// Lock flag has the given value.
    Flag {
        /// Which lock.
        flag: Flag,
        /// Expected value.
        value: bool,
    },
    /// Record does (or does not) declare a parent.
    HasParent(bool),
    /// Record does (or does not) have children.
    HasChildren(bool),
    /// Record's parent is the given id.
    Parent(u64),
    /// Source URL filter.
    Source(SourceMatch),
    /// Content hash equals.
    ContentHash(String),
}

impl FieldPredicate {
    /// Whether this predicate opts the query into seeing deleted records.
    pub fn includes_deleted(&self) -> bool {
        matches!(self, Self::Status(Status::Deleted | Status::Any))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl Direction {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// Fields a query can sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    /// Record id.
    Id,
    /// Net vote score.
    Score,
    /// Favorite count.
    FavoriteCount,
    /// Comment count.
    CommentCount,
    /// Total number of tags.
    TagCount,
    /// Megapixels.
    Megapixels,
    /// File size.
    FileSize,
    /// Duration.
    Duration,
    /// Creation time.
    CreatedAt,
    /// Last update time.
    UpdatedAt,
    /// Width.
    Width,
    /// Height.
    Height,
}

/// A query-global ordering request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirective {
    /// Sort by one field.
    Field {
        /// Field to sort by.
        field: SortField,
        /// Direction.
        direction: Direction,
    },
    /// Wide images first.
    Landscape,
    /// Tall images first.
    Portrait,
    /// Time-decayed popularity.
    Rank(Direction),
    /// Shuffled order, reproducible when seeded.
    Random(Option<u64>),
    /// Seed applied to a random ordering.
    Seed(u64),
}

/// Result of classifying a token.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaTag {
    /// Not a meta tag; treat the token as a tag name.
    Ignore,
    /// Ordering directive.
    Order(OrderDirective),
    /// Field predicate.
    Predicate(FieldPredicate),
}

/// Classifies a single query token.
pub fn classify(token: &str) -> MetaTag {
    let token = token.to_lowercase();
    let Some((key, value)) = token.split_once(':') else {
        return MetaTag::Ignore;
    };
    if key.is_empty() || value.is_empty() {
        return MetaTag::Ignore;
    }

    let classified = match key {
        "order" => parse_order(value).map(MetaTag::Order),
        "random" => value.parse().ok().map(|s| MetaTag::Order(OrderDirective::Random(Some(s)))),
        "randseed" => value.parse().ok().map(|s| MetaTag::Order(OrderDirective::Seed(s))),
        _ => classify_predicate(key, value).map(MetaTag::Predicate),
    };
    classified.unwrap_or(MetaTag::Ignore)
}

/// Classifies a predicate key.
fn classify_predicate(key: &str, value: &str) -> Option<FieldPredicate> {
    if let Some(field) = int_field(key) {
        let range = match field {
            IntField::FileSize => parse_range(value, parse_byte_size)?,
            IntField::CreatedAt => parse_range(value, parse_date)?,
            _ => parse_range(value, parse_int)?,
        };
        return Some(FieldPredicate::Int { field, range });
    }
    if let Some(field) = float_field(key) {
        let parse = if field == FloatField::Ratio {
            parse_ratio
        } else {
            parse_float
        };
        let range = parse_range(value, parse)?;
        return Some(FieldPredicate::Float { field, range });
    }

    let predicate = match key {
        "rating" => FieldPredicate::Rating(value.parse().ok()?),
        "type" => FieldPredicate::FileType(value.to_string()),
        "status" => FieldPredicate::Status(parse_status(value)?),
        "ratinglocked" => flag(Flag::RatingLocked, value)?,
        "notelocked" => flag(Flag::NoteLocked, value)?,
        "statuslocked" => flag(Flag::StatusLocked, value)?,
        "ischild" => FieldPredicate::HasParent(parse_bool(value)?),
        "isparent" => FieldPredicate::HasChildren(parse_bool(value)?),
        "parent" if value == "none" => FieldPredicate::HasParent(false),
        "parent" if value == "any" => FieldPredicate::HasParent(true),
        "parent" => FieldPredicate::Parent(value.parse().ok()?),
        "source" => FieldPredicate::Source(parse_source(value)),
        "md5" => FieldPredicate::ContentHash(value.to_string()),
        _ => return None,
    };
    Some(predicate)
}

/// Maps a key to an integer field.
fn int_field(key: &str) -> Option<IntField> {
    let field = match key {
        "id" => IntField::Id,
        "score" => IntField::Score,
        "favcount" => IntField::FavoriteCount,
        "comment_count" => IntField::CommentCount,
        "tagcount" => IntField::TagCount,
        "width" => IntField::Width,
        "height" => IntField::Height,
        "filesize" => IntField::FileSize,
        "date" => IntField::CreatedAt,
        "user_id" => IntField::UploaderId,
        "approver_id" => IntField::ApproverId,
        "gentags" => IntField::CategoryCount(TagCategory::General),
        "arttags" => IntField::CategoryCount(TagCategory::Artist),
        "copytags" => IntField::CategoryCount(TagCategory::Copyright),
        "chartags" => IntField::CategoryCount(TagCategory::Character),
        "spectags" => IntField::CategoryCount(TagCategory::Species),
        "invtags" => IntField::CategoryCount(TagCategory::Invalid),
        "metatags" => IntField::CategoryCount(TagCategory::Meta),
        "lortags" => IntField::CategoryCount(TagCategory::Lore),
        _ => return None,
    };
    Some(field)
}

/// Maps a key to a float field.
fn float_field(key: &str) -> Option<FloatField> {
    match key {
        "mpixels" => Some(FloatField::Megapixels),
        "ratio" => Some(FloatField::Ratio),
        "duration" => Some(FloatField::Duration),
        _ => None,
    }
}

/// Parses a range expression using `parse` for each endpoint.
///
/// `parse` returns the inclusive span a single value covers, so a date covers a whole day
/// while an integer covers one point.
fn parse_range<T, F>(value: &str, parse: F) -> Option<Range<T>>
where
    T: Copy,
    F: Fn(&str) -> Option<(T, T)>,
{
    if let Some(rest) = value.strip_prefix(">=") {
        let (lo, _) = parse(rest)?;
        return Some(Range {
            lower: Bound::Included(lo),
            upper: Bound::Unbounded,
        });
    }
    if let Some(rest) = value.strip_prefix("<=") {
        let (_, hi) = parse(rest)?;
        return Some(Range {
            lower: Bound::Unbounded,
            upper: Bound::Included(hi),
        });
    }
    if let Some(rest) = value.strip_prefix('>') {
        let (_, hi) = parse(rest)?;
        return Some(Range {
            lower: Bound::Excluded(hi),
            upper: Bound::Unbounded,
        });
    }
    if let Some(rest) = value.strip_prefix('<') {
        let (lo, _) = parse(rest)?;
        return Some(Range {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(lo),
        });
    }
    if let Some((from, to)) = value.split_once("..") {
        let lower = if from.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(parse(from)?.0)
        };
        let upper = if to.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(parse(to)?.1)
        };
        if matches!((lower, upper), (Bound::Unbounded, Bound::Unbounded)) {
            return None;
        }
        return Some(Range { lower, upper });
    }
    let (lo, hi) = parse(value)?;
    Some(Range {
        lower: Bound::Included(lo),
        upper: Bound::Included(hi),
    })
}

/// Parses a signed integer.
fn parse_int(s: &str) -> Option<(i64, i64)> {
    let n = s.parse().ok()?;
    Some((n, n))
}

/// Parses a finite float.
fn parse_float(s: &str) -> Option<(f64, f64)> {
    let n: f64 = s.parse().ok()?;
    n.is_finite().then_some((n, n))
}

/// Parses a ratio, rounded to two decimals like the indexed value.
fn parse_ratio(s: &str) -> Option<(f64, f64)> {
    let (n, _) = parse_float(s)?;
    let rounded = (n * 100.0).round() / 100.0;
    Some((rounded, rounded))
}

/// Parses a byte size with an optional `b`/`kb`/`mb`/`gb` suffix.
fn parse_byte_size(s: &str) -> Option<(i64, i64)> {
    let (number, multiplier) = if let Some(n) = s.strip_suffix("gb") {
        (n, 1024_f64.powi(3))
    } else if let Some(n) = s.strip_suffix("mb") {
        (n, 1024_f64.powi(2))
    } else if let Some(n) = s.strip_suffix("kb") {
        (n, 1024.0)
    } else if let Some(n) = s.strip_suffix('b') {
        (n, 1.0)
    } else {
        (s, 1.0)
    };
    let n: f64 = number.parse().ok()?;
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let bytes = (n * multiplier).round() as i64;
    Some((bytes, bytes))
}

/// Parses a date or instant into the unix-second span it covers.
///
/// `YYYY-MM-DD` covers the whole UTC day; an RFC 3339 instant covers one second.
fn parse_date(s: &str) -> Option<(i64, i64)> {
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let start = day.and_time(NaiveTime::MIN).and_utc().timestamp();
        return Some((start, start + 86_399));
    }
    let instant = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
    let t = instant.timestamp();
    Some((t, t))
}

/// Parses `true`/`false`.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// Builds a lock-flag predicate.
fn flag(flag: Flag, value: &str) -> Option<FieldPredicate> {
    Some(FieldPredicate::Flag {
        flag,
        value: parse_bool(value)?,
    })
}

/// Parses a moderation status.
fn parse_status(s: &str) -> Option<Status> {
    let status = match s {
        "active" => Status::Active,
        "pending" => Status::Pending,
        "flagged" => Status::Flagged,
        "deleted" => Status::Deleted,
        "modqueue" => Status::Modqueue,
        "any" => Status::Any,
        _ => return None,
    };
    Some(status)
}

/// Parses a source filter.
fn parse_source(s: &str) -> SourceMatch {
    if s == "none" {
        SourceMatch::None
    } else if s.contains('*') {
        SourceMatch::Wildcard(s.to_string())
    } else {
        SourceMatch::Exact(s.to_string())
    }
}

/// Parses the value of an `order:` key.
fn parse_order(value: &str) -> Option<OrderDirective> {
    if let Some(seed) = value.strip_prefix("random:") {
        return seed.parse().ok().map(|s| OrderDirective::Random(Some(s)));
    }
    let (name, direction) = if let Some(name) = value.strip_suffix("_asc") {
        (name, Some(Direction::Ascending))
    } else if let Some(name) = value.strip_suffix("_desc") {
        (name, Some(Direction::Descending))
    } else {
        (value, None)
    };

    let directive = match name {
        "random" if direction.is_none() => OrderDirective::Random(None),
        "landscape" if direction.is_none() => OrderDirective::Landscape,
        "portrait" if direction.is_none() => OrderDirective::Portrait,
        "rank" => OrderDirective::Rank(direction.unwrap_or(Direction::Descending)),
        _ => {
            let field = sort_field(name)?;
            OrderDirective::Field {
                field,
                direction: direction.unwrap_or(Direction::Descending),
            }
        }
    };
    Some(directive)
}

/// Maps an order name to a sort field.
fn sort_field(name: &str) -> Option<SortField> {
    let field = match name {
        "id" => SortField::Id,
        "score" => SortField::Score,
        "favcount" => SortField::FavoriteCount,
        "comment_count" | "comments" => SortField::CommentCount,
        "tagcount" => SortField::TagCount,
        "mpixels" => SortField::Megapixels,
        "filesize" => SortField::FileSize,
        "duration" => SortField::Duration,
        "created" => SortField::CreatedAt,
        "updated" | "change" => SortField::UpdatedAt,
        "width" => SortField::Width,
        "height" => SortField::Height,
        _ => return None,
    };
    Some(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unwraps an integer predicate's range.
    fn int_range(token: &str) -> (IntField, Range<i64>) {
        match classify(token) {
            MetaTag::Predicate(FieldPredicate::Int { field, range }) => (field, range),
            other => panic!("expected int predicate for {token}, got {other:?}"),
        }
    }

    #[test]
    fn plain_tags_are_ignored() {
        assert_eq!(classify("blue_eyes"), MetaTag::Ignore);
        assert_eq!(classify("16:9"), MetaTag::Ignore);
        assert_eq!(classify("score:"), MetaTag::Ignore);
        assert_eq!(classify(":5"), MetaTag::Ignore);
    }

    #[test]
    fn exact_integer() {
        let (field, range) = int_range("id:42");
        assert_eq!(field, IntField::Id);
        assert_eq!(range, Range::between(42, 42));
    }

    #[test]
    fn range_operators() {
        let (_, r) = int_range("score:>=10");
        assert!(r.contains(10) && r.contains(1000) && !r.contains(9));

        let (_, r) = int_range("score:>10");
        assert!(!r.contains(10) && r.contains(11));

        let (_, r) = int_range("score:<=-2");
        assert!(r.contains(-2) && !r.contains(-1));

        let (_, r) = int_range("score:<3");
        assert!(r.contains(2) && !r.contains(3));

        let (_, r) = int_range("favcount:5..10");
        assert!(r.contains(5) && r.contains(10) && !r.contains(11));

        let (_, r) = int_range("favcount:5..");
        assert!(r.contains(500) && !r.contains(4));

        let (_, r) = int_range("favcount:..5");
        assert!(r.contains(0) && !r.contains(6));
    }

    #[test]
    fn unparsable_value_is_ignored() {
        assert_eq!(classify("score:lots"), MetaTag::Ignore);
        assert_eq!(classify("width:.."), MetaTag::Ignore);
        assert_eq!(classify("rating:x"), MetaTag::Ignore);
        assert_eq!(classify("status:hidden"), MetaTag::Ignore);
        assert_eq!(classify("order:sideways"), MetaTag::Ignore);
    }

    #[test]
    fn unknown_key_is_ignored() {
        assert_eq!(classify("pool:12"), MetaTag::Ignore);
    }

    #[test]
    fn byte_sizes() {
        let (field, range) = int_range("filesize:>=1.5mb");
        assert_eq!(field, IntField::FileSize);
        assert_eq!(range.lower, Bound::Included(1_572_864));
        assert_eq!(parse_byte_size("200kb"), Some((204_800, 204_800)));
        assert_eq!(parse_byte_size("12"), Some((12, 12)));
        assert_eq!(parse_byte_size("-1kb"), None);
    }

    #[test]
    fn date_covers_whole_day() {
        let (field, range) = int_range("date:2024-01-02");
        assert_eq!(field, IntField::CreatedAt);
        assert!(range.contains(1_704_153_600));
        assert!(range.contains(1_704_153_600 + 86_399));
        assert!(!range.contains(1_704_153_600 + 86_400));
        assert!(!range.contains(1_704_153_599));
    }

    #[test]
    fn date_bounds_respect_day_span() {
        let (_, after) = int_range("date:>2024-01-02");
        assert!(!after.contains(1_704_153_600 + 86_399));
        assert!(after.contains(1_704_153_600 + 86_400));

        let (_, before) = int_range("date:<2024-01-02");
        assert!(before.contains(1_704_153_599));
        assert!(!before.contains(1_704_153_600));
    }

    #[test]
    fn rfc3339_instant() {
        let (_, range) = int_range("date:>=2024-01-02T00:00:10Z");
        assert_eq!(range.lower, Bound::Included(1_704_153_610));
    }

    #[test]
    fn ratio_rounds() {
        let MetaTag::Predicate(FieldPredicate::Float { field, range }) = classify("ratio:1.777")
        else {
            panic!("expected float predicate");
        };
        assert_eq!(field, FloatField::Ratio);
        assert_eq!(range, Range::between(1.78, 1.78));
    }

    #[test]
    fn category_counts() {
        let (field, range) = int_range("arttags:>=2");
        assert_eq!(field, IntField::CategoryCount(TagCategory::Artist));
        assert!(range.contains(2));
    }

    #[test]
    fn enumerations() {
        assert_eq!(
            classify("rating:s"),
            MetaTag::Predicate(FieldPredicate::Rating(Rating::Safe))
        );
        assert_eq!(
            classify("Rating:Explicit"),
            MetaTag::Predicate(FieldPredicate::Rating(Rating::Explicit))
        );
        assert_eq!(
            classify("type:webm"),
            MetaTag::Predicate(FieldPredicate::FileType("webm".into()))
        );
        assert_eq!(
            classify("status:modqueue"),
            MetaTag::Predicate(FieldPredicate::Status(Status::Modqueue))
        );
    }

    #[test]
    fn flags_and_relationships() {
        assert_eq!(
            classify("ratinglocked:true"),
            MetaTag::Predicate(FieldPredicate::Flag {
                flag: Flag::RatingLocked,
                value: true
            })
        );
        assert_eq!(
            classify("ischild:false"),
            MetaTag::Predicate(FieldPredicate::HasParent(false))
        );
        assert_eq!(
            classify("isparent:true"),
            MetaTag::Predicate(FieldPredicate::HasChildren(true))
        );
        assert_eq!(
            classify("parent:none"),
            MetaTag::Predicate(FieldPredicate::HasParent(false))
        );
        assert_eq!(
            classify("parent:77"),
            MetaTag::Predicate(FieldPredicate::Parent(77))
        );
    }

    #[test]
    fn sources() {
        assert_eq!(
            classify("source:none"),
            MetaTag::Predicate(FieldPredicate::Source(SourceMatch::None))
        );
        assert_eq!(
            classify("source:*twitter.com*"),
            MetaTag::Predicate(FieldPredicate::Source(SourceMatch::Wildcard(
                "*twitter.com*".into()
            )))
        );
        assert_eq!(
            classify("source:https://a.example/1"),
            MetaTag::Predicate(FieldPredicate::Source(SourceMatch::Exact(
                "https://a.example/1".into()
            )))
        );
    }

    #[test]
    fn deleted_visibility() {
        let MetaTag::Predicate(p) = classify("status:deleted") else {
            panic!("expected predicate");
        };
        assert!(p.includes_deleted());
        let MetaTag::Predicate(p) = classify("status:pending") else {
            panic!("expected predicate");
        };
        assert!(!p.includes_deleted());
    }

    #[test]
    fn order_directives() {
        assert_eq!(
            classify("order:score"),
            MetaTag::Order(OrderDirective::Field {
                field: SortField::Score,
                direction: Direction::Descending
            })
        );
        assert_eq!(
            classify("order:id_asc"),
            MetaTag::Order(OrderDirective::Field {
                field: SortField::Id,
                direction: Direction::Ascending
            })
        );
        assert_eq!(
            classify("order:rank"),
            MetaTag::Order(OrderDirective::Rank(Direction::Descending))
        );
        assert_eq!(
            classify("order:landscape"),
            MetaTag::Order(OrderDirective::Landscape)
        );
        assert_eq!(
            classify("order:random"),
            MetaTag::Order(OrderDirective::Random(None))
        );
        assert_eq!(
            classify("order:random:42"),
            MetaTag::Order(OrderDirective::Random(Some(42)))
        );
        assert_eq!(
            classify("random:42"),
            MetaTag::Order(OrderDirective::Random(Some(42)))
        );
        assert_eq!(
            classify("randseed:7"),
            MetaTag::Order(OrderDirective::Seed(7))
        );
    }
}
