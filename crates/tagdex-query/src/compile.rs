//! Query compilation.
//!
//! Turns a parsed query plus resolved tag ids into a backend-neutral boolean tree.
//! Operands are joined by AND unless a union marker sits next to them: `a ~ b` places both
//! `a` and `b` in `should`, and each further `~` extends the union by one operand. A
//! negated operand goes to `must_not` under AND and becomes `should: not(x)` under OR.

use std::{collections::HashMap, fmt};

use crate::{
    classify::{FieldPredicate, Status},
    parser::{Group, GroupToken, ParsedQuery},
};

/// A single filter in a boolean tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Record carries the tag.
    Tag(u64),
    /// Record carries at least one of the tags.
    AnyTag(Vec<u64>),
    /// Record id is one of these.
    AnyId(Vec<u64>),
    /// Record content hash is one of these.
    AnyHash(Vec<String>),
    /// Field predicate.
    Field(FieldPredicate),
    /// Nested boolean query.
    Bool(Box<BoolQuery>),
    /// Negation, used inside `should`.
    Not(Box<Self>),
}

impl Clause {
    /// Writes an indented tree representation.
    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            Self::Tag(id) => writeln!(f, "{pad}tag {id}"),
            Self::AnyTag(ids) => writeln!(f, "{pad}any tag {ids:?}"),
            Self::AnyId(ids) => writeln!(f, "{pad}any id {ids:?}"),
            Self::AnyHash(hashes) => writeln!(f, "{pad}any md5 {hashes:?}"),
            Self::Field(p) => writeln!(f, "{pad}{p:?}"),
            Self::Bool(q) => q.fmt_tree(f, indent),
            Self::Not(inner) => {
                writeln!(f, "{pad}NOT")?;
                inner.fmt_tree(f, indent + 1)
            }
        }
    }
}

/// A boolean combination of clauses.
///
/// An empty query matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    /// Every clause must match.
    pub must: Vec<Clause>,
    /// At least `minimum_should_match` of these must match.
    pub should: Vec<Clause>,
    /// None of these may match.
    pub must_not: Vec<Clause>,
    /// Zero when `should` is empty, otherwise one.
    pub minimum_should_match: usize,
}

impl BoolQuery {
    /// True when the query has no clauses at all.
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    /// Writes an indented tree representation.
    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        for (label, clauses) in [
            ("must", &self.must),
            ("should", &self.should),
            ("must_not", &self.must_not),
        ] {
            if clauses.is_empty() {
                continue;
            }
            writeln!(f, "{pad}{label}:")?;
            for clause in clauses {
                clause.fmt_tree(f, indent + 1)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for BoolQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// Returns true when a tag token is a wildcard pattern.
pub fn is_wildcard(name: &str) -> bool {
    name.contains(['*', '?'])
}

/// Tag ids resolved for each literal in a query.
///
/// A missing entry or an empty id list means the name is unknown and the token is dropped.
#[derive(Debug, Clone, Default)]
pub struct Resolutions {
    /// Name to resolved ids.
    ids: HashMap<String, Vec<u64>>,
}

impl Resolutions {
    /// Creates an empty set of resolutions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the ids a name resolved to.
    pub fn insert(&mut self, name: impl Into<String>, ids: Vec<u64>) {
        self.ids.insert(name.into(), ids);
    }

    /// Ids for a name, empty when unknown.
    pub fn get(&self, name: &str) -> &[u64] {
        self.ids.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// The clause a literal compiles to, or `None` when it resolved to nothing.
    fn clause_for(&self, name: &str) -> Option<Clause> {
        match self.get(name) {
            [] => None,
            [id] => Some(Clause::Tag(*id)),
            ids => Some(Clause::AnyTag(ids.to_vec())),
        }
    }
}

/// Caller-supplied exclusions.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Record ids to leave out.
    pub exclude_ids: Vec<u64>,
    /// Content hashes to leave out.
    pub exclude_hashes: Vec<String>,
}

/// Compiles parsed queries into boolean trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCompiler;

impl QueryCompiler {
    /// Creates a compiler.
    pub fn new() -> Self {
        Self
    }

    /// Compiles a whole query.
    ///
    /// Adds `must_not: status deleted` unless the query asked for deleted records, plus a
    /// `must_not` clause for each non-empty exclusion list.
    pub fn compile(
        &self,
        query: &ParsedQuery,
        resolutions: &Resolutions,
        options: &CompileOptions,
    ) -> BoolQuery {
        let mut compiled = self.compile_group(&query.root, resolutions);
        if !query.includes_deleted {
            compiled
                .must_not
                .push(Clause::Field(FieldPredicate::Status(Status::Deleted)));
        }
        if !options.exclude_ids.is_empty() {
            compiled
                .must_not
                .push(Clause::AnyId(options.exclude_ids.clone()));
        }
        if !options.exclude_hashes.is_empty() {
            let hashes = options
                .exclude_hashes
                .iter()
                .map(|h| h.to_lowercase())
                .collect();
            compiled.must_not.push(Clause::AnyHash(hashes));
        }
        compiled
    }

    /// Compiles one group.
    fn compile_group(&self, group: &Group, resolutions: &Resolutions) -> BoolQuery {
        let mut query = BoolQuery::default();
        let mut armed = false;
        let mut negated = false;

        for (index, token) in group.tokens.iter().enumerate() {
            let clause = match token {
                GroupToken::Union => {
                    armed = true;
                    continue;
                }
                GroupToken::Negate => {
                    negated = true;
                    continue;
                }
                GroupToken::Literal(name) => resolutions.clause_for(name),
                GroupToken::MetaRef(i) => group.predicates.get(*i).cloned().map(Clause::Field),
                GroupToken::GroupRef(i) => group
                    .subgroups
                    .get(*i)
                    .map(|sub| self.compile_group(sub, resolutions))
                    .filter(|sub| !sub.is_empty())
                    .map(|sub| Clause::Bool(Box::new(sub))),
            };

            let in_union = armed || group.tokens.get(index + 1) == Some(&GroupToken::Union);
            let is_negated = negated;
            armed = false;
            negated = false;

            let Some(clause) = clause else {
                continue;
            };
            match (in_union, is_negated) {
                (true, true) => query.should.push(Clause::Not(Box::new(clause))),
                (true, false) => query.should.push(clause),
                (false, true) => query.must_not.push(clause),
                (false, false) => query.must.push(clause),
            }
        }

        if !query.should.is_empty() {
            query.minimum_should_match = 1;
        }
        query
    }
}
