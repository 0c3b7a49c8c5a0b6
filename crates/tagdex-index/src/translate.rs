//! Translation of compiled query trees into Tantivy queries.
//!
//! The compiled tree is backend-neutral; this module maps each clause onto term, term-set,
//! range and regex queries over the record schema.

use std::ops::Bound;

use tagdex_query::{BoolQuery, Clause, FieldPredicate, Flag, SourceMatch, Status};
use tantivy::{
    Term,
    query::{AllQuery, BooleanQuery, Occur, Query, RangeQuery, RegexQuery, TermQuery, TermSetQuery},
    schema::{Field, IndexRecordOption},
};

use crate::{
    IndexError,
    schema::{IndexSchema, NONE_ID, signed},
};

/// Characters with meaning in a Tantivy regex.
const REGEX_META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// Translates compiled queries against a schema.
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    /// Schema with field handles.
    schema: IndexSchema,
}

impl QueryTranslator {
    /// Creates a translator for the given schema.
    pub fn new(schema: IndexSchema) -> Self {
        Self { schema }
    }

    /// Translates a boolean tree, adding `extra` clauses as further requirements.
    ///
    /// An empty tree matches every record. A tree with only exclusions matches every
    /// record not excluded.
    pub fn translate(
        &self,
        query: &BoolQuery,
        extra: &[Clause],
    ) -> Result<Box<dyn Query>, IndexError> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for clause in query.must.iter().chain(extra) {
            clauses.push((Occur::Must, self.clause(clause)?));
        }

        if !query.should.is_empty() {
            let should = query
                .should
                .iter()
                .map(|c| Ok((Occur::Should, self.clause(c)?)))
                .collect::<Result<Vec<_>, IndexError>>()?;
            if clauses.is_empty() {
                clauses.extend(should);
            } else {
                clauses.push((Occur::Must, Box::new(BooleanQuery::new(should))));
            }
        }

        for clause in &query.must_not {
            clauses.push((Occur::MustNot, self.clause(clause)?));
        }

        let positive = clauses.iter().any(|(occur, _)| *occur != Occur::MustNot);
        if !positive {
            clauses.push((Occur::Must, Box::new(AllQuery)));
        }
        if clauses.len() == 1
            && clauses[0].0 == Occur::Must
            && let Some((_, only)) = clauses.pop()
        {
            return Ok(only);
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    /// Translates one clause.
    fn clause(&self, clause: &Clause) -> Result<Box<dyn Query>, IndexError> {
        let s = &self.schema;
        Ok(match clause {
            Clause::Tag(id) => term(Term::from_field_u64(s.tags, *id)),
            Clause::AnyTag(ids) => Box::new(TermSetQuery::new(
                ids.iter().map(|id| Term::from_field_u64(s.tags, *id)),
            )),
            Clause::AnyId(ids) => Box::new(TermSetQuery::new(
                ids.iter().map(|id| Term::from_field_i64(s.id, signed(*id))),
            )),
            Clause::AnyHash(hashes) => Box::new(TermSetQuery::new(
                hashes.iter().map(|h| Term::from_field_text(s.md5, h)),
            )),
            Clause::Field(predicate) => self.predicate(predicate)?,
            Clause::Bool(inner) => self.translate(inner, &[])?,
            Clause::Not(inner) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, self.clause(inner)?),
            ])),
        })
    }

    /// Translates a field predicate.
    fn predicate(&self, predicate: &FieldPredicate) -> Result<Box<dyn Query>, IndexError> {
        let s = &self.schema;
        Ok(match predicate {
            FieldPredicate::Int { field, range } => Box::new(RangeQuery::new_i64_bounds(
                s.name(s.int_field(*field)).to_string(),
                range.lower,
                range.upper,
            )),
            FieldPredicate::Float { field, range } => Box::new(RangeQuery::new_f64_bounds(
                s.name(s.float_field(*field)).to_string(),
                range.lower,
                range.upper,
            )),
            FieldPredicate::Rating(rating) => text(s.rating, rating.code()),
            FieldPredicate::FileType(ext) => text(s.file_type, &ext.to_lowercase()),
            FieldPredicate::ContentHash(hash) => text(s.md5, &hash.to_lowercase()),
            FieldPredicate::Status(status) => self.status(*status),
            FieldPredicate::Flag { flag, value } => {
                let field = match flag {
                    Flag::RatingLocked => s.rating_locked,
                    Flag::NoteLocked => s.note_locked,
                    Flag::StatusLocked => s.status_locked,
                };
                term(Term::from_field_bool(field, *value))
            }
            FieldPredicate::HasParent(true) => positive_count(s, s.parent_id),
            FieldPredicate::HasParent(false) => term(Term::from_field_i64(s.parent_id, NONE_ID)),
            FieldPredicate::HasChildren(true) => positive_count(s, s.children_count),
            FieldPredicate::HasChildren(false) => term(Term::from_field_i64(s.children_count, 0)),
            FieldPredicate::Parent(id) => term(Term::from_field_i64(s.parent_id, signed(*id))),
            FieldPredicate::Source(SourceMatch::Exact(url)) => text(s.sources, &url.to_lowercase()),
            FieldPredicate::Source(SourceMatch::Wildcard(pattern)) => {
                let regex = wildcard_regex(&pattern.to_lowercase());
                let query = RegexQuery::from_pattern(&regex, s.sources).map_err(|e| {
                    IndexError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    }
                })?;
                Box::new(query)
            }
            FieldPredicate::Source(SourceMatch::None) => {
                term(Term::from_field_i64(s.source_count, 0))
            }
        })
    }

    /// Translates a moderation status.
    fn status(&self, status: Status) -> Box<dyn Query> {
        let s = &self.schema;
        let flag = |field: Field| term(Term::from_field_bool(field, true));
        match status {
            Status::Pending => flag(s.pending),
            Status::Flagged => flag(s.flagged),
            Status::Deleted => flag(s.deleted),
            Status::Modqueue => Box::new(BooleanQuery::new(vec![
                (Occur::Should, flag(s.pending)),
                (Occur::Should, flag(s.flagged)),
            ])),
            Status::Active => Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, flag(s.pending)),
                (Occur::MustNot, flag(s.flagged)),
                (Occur::MustNot, flag(s.deleted)),
            ])),
            Status::Any => Box::new(AllQuery),
        }
    }
}

/// Exact term query.
fn term(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

/// Exact match on a raw text field.
fn text(field: Field, value: &str) -> Box<dyn Query> {
    term(Term::from_field_text(field, value))
}

/// Matches records whose integer field is above zero.
fn positive_count(schema: &IndexSchema, field: Field) -> Box<dyn Query> {
    Box::new(RangeQuery::new_i64_bounds(
        schema.name(field).to_string(),
        Bound::Excluded(0),
        Bound::Unbounded,
    ))
}

/// Converts a `*` wildcard into an anchored regex, escaping everything else.
fn wildcard_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        if c == '*' {
            regex.push_str(".*");
        } else {
            if REGEX_META.contains(&c) {
                regex.push('\\');
            }
            regex.push(c);
        }
    }
    regex
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wildcard_escapes_regex_syntax() {
        assert_eq!(
            wildcard_regex("https://x.com/*"),
            "https://x\\.com/.*"
        );
        assert_eq!(wildcard_regex("a(b)*"), "a\\(b\\).*");
    }

    #[test]
    fn empty_tree_matches_everything() {
        let translator = QueryTranslator::new(IndexSchema::new());
        let query = translator.translate(&BoolQuery::default(), &[]).unwrap();
        assert!(format!("{query:?}").contains("AllQuery"));
    }

    #[test]
    fn exclusions_only_get_a_positive_clause() {
        let translator = QueryTranslator::new(IndexSchema::new());
        let tree = BoolQuery {
            must_not: vec![Clause::Tag(1)],
            ..BoolQuery::default()
        };
        let query = translator.translate(&tree, &[]).unwrap();
        let rendered = format!("{query:?}");
        assert!(rendered.contains("AllQuery"));
        assert!(rendered.contains("MustNot"));
    }
}
