//! Group parser.
//!
//! Builds a tree of groups from the token stream. Standalone `(` and `)` open and close
//! groups, `~` marks a union and `-` a negation. Meta tags are classified as they are seen:
//! predicates stay local to their group while ordering directives are query-global and
//! collected on the root.

use std::fmt;

use crate::{
    classify::{FieldPredicate, MetaTag, OrderDirective, classify},
    error::{QueryError, QueryErrorKind},
    tokenizer::{NEGATE, Tokenizer},
};

/// Union marker.
pub const UNION: &str = "~";

/// Tokens skipped by the parser.
const SKIPPED: &[&str] = &["^"];

/// One entry in a group's token list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupToken {
    /// A tag name, lowercased.
    Literal(String),
    /// Negates the next operand.
    Negate,
    /// Places the surrounding operands in a union.
    Union,
    /// Index into the group's `subgroups`.
    GroupRef(usize),
    /// Index into the group's `predicates`.
    MetaRef(usize),
}

/// A parenthesized group, or the whole query at the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    /// Operands and markers in query order.
    pub tokens: Vec<GroupToken>,
    /// Nested groups referenced by [`GroupToken::GroupRef`].
    pub subgroups: Vec<Self>,
    /// Field predicates referenced by [`GroupToken::MetaRef`].
    pub predicates: Vec<FieldPredicate>,
    /// Ordering directives. Only populated on the root group.
    pub order: Vec<OrderDirective>,
}

impl Group {
    /// Removes a trailing negation marker that has no operand.
    fn drop_dangling_negate(&mut self) {
        if self.tokens.last() == Some(&GroupToken::Negate) {
            self.tokens.pop();
        }
    }

    /// Every literal tag name in this group and its subgroups.
    pub fn literals(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_literals(&mut names);
        names
    }

    /// Recursive helper for [`Self::literals`].
    fn collect_literals<'a>(&'a self, out: &mut Vec<&'a str>) {
        for token in &self.tokens {
            if let GroupToken::Literal(name) = token {
                out.push(name);
            }
        }
        for sub in &self.subgroups {
            sub.collect_literals(out);
        }
    }

    /// Writes an indented tree representation.
    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        for token in &self.tokens {
            match token {
                GroupToken::Literal(name) => writeln!(f, "{pad}{name}")?,
                GroupToken::Negate => writeln!(f, "{pad}NOT")?,
                GroupToken::Union => writeln!(f, "{pad}OR")?,
                GroupToken::MetaRef(i) => writeln!(f, "{pad}{:?}", self.predicates[*i])?,
                GroupToken::GroupRef(i) => {
                    writeln!(f, "{pad}(")?;
                    self.subgroups[*i].fmt_tree(f, indent + 1)?;
                    writeln!(f, "{pad})")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// A parsed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// The top-level group.
    pub root: Group,
    /// True when any group asked for deleted records (`status:deleted` or `status:any`).
    pub includes_deleted: bool,
}

impl ParsedQuery {
    /// Ordering directives in query order.
    pub fn order(&self) -> &[OrderDirective] {
        &self.root.order
    }
}

impl fmt::Display for ParsedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for directive in &self.root.order {
            writeln!(f, "order: {directive:?}")?;
        }
        Ok(())
    }
}

/// Parses a query string.
///
/// Fails with [`QueryError`] when parentheses are unbalanced.
pub fn parse(query: &str) -> Result<ParsedQuery, QueryError> {
    let mut stack = vec![Group::default()];
    let mut includes_deleted = false;

    for (index, token) in Tokenizer::new(query).enumerate() {
        match token {
            "(" => stack.push(Group::default()),
            ")" => {
                if stack.len() == 1 {
                    return Err(QueryError::new(
                        QueryErrorKind::UnexpectedClose { token_index: index },
                        query,
                    ));
                }
                let group = stack.pop().unwrap_or_default();
                let parent = current(&mut stack);
                parent.tokens.push(GroupToken::GroupRef(parent.subgroups.len()));
                parent.subgroups.push(group);
            }
            UNION => current(&mut stack).tokens.push(GroupToken::Union),
            NEGATE => current(&mut stack).tokens.push(GroupToken::Negate),
            t if SKIPPED.contains(&t) => {}
            t => match classify(t) {
                MetaTag::Order(directive) => {
                    current(&mut stack).drop_dangling_negate();
                    stack[0].order.push(directive);
                }
                MetaTag::Predicate(predicate) => {
                    includes_deleted |= predicate.includes_deleted();
                    let group = current(&mut stack);
                    group.tokens.push(GroupToken::MetaRef(group.predicates.len()));
                    group.predicates.push(predicate);
                }
                MetaTag::Ignore => current(&mut stack)
                    .tokens
                    .push(GroupToken::Literal(t.to_lowercase())),
            },
        }
    }

    if stack.len() > 1 {
        return Err(QueryError::new(
            QueryErrorKind::UnclosedGroup {
                open: stack.len() - 1,
            },
            query,
        ));
    }

    Ok(ParsedQuery {
        root: stack.pop().unwrap_or_default(),
        includes_deleted,
    })
}

/// The innermost open group.
fn current(stack: &mut [Group]) -> &mut Group {
    let last = stack.len() - 1;
    &mut stack[last]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Direction, SortField, Status};

    /// Parses a query that is expected to be valid.
    fn ok(query: &str) -> ParsedQuery {
        parse(query).unwrap_or_else(|e| panic!("failed to parse {query:?}: {e}"))
    }

    /// Shorthand for a literal token.
    fn lit(name: &str) -> GroupToken {
        GroupToken::Literal(name.into())
    }

    #[test]
    fn flat_literals_are_lowercased() {
        let q = ok("Blue_Eyes wolf");
        assert_eq!(q.root.tokens, vec![lit("blue_eyes"), lit("wolf")]);
        assert!(q.root.subgroups.is_empty());
    }

    #[test]
    fn markers_are_kept_in_order() {
        let q = ok("a ~ -b");
        assert_eq!(
            q.root.tokens,
            vec![lit("a"), GroupToken::Union, GroupToken::Negate, lit("b")]
        );
    }

    #[test]
    fn groups_nest_with_refs_in_place() {
        let q = ok("a ( b ~ ( c ) ) d");
        assert_eq!(
            q.root.tokens,
            vec![lit("a"), GroupToken::GroupRef(0), lit("d")]
        );
        let inner = &q.root.subgroups[0];
        assert_eq!(
            inner.tokens,
            vec![lit("b"), GroupToken::Union, GroupToken::GroupRef(0)]
        );
        assert_eq!(inner.subgroups[0].tokens, vec![lit("c")]);
    }

    #[test]
    fn sibling_groups_get_sequential_refs() {
        let q = ok("( a ) ~ ( b )");
        assert_eq!(
            q.root.tokens,
            vec![
                GroupToken::GroupRef(0),
                GroupToken::Union,
                GroupToken::GroupRef(1)
            ]
        );
    }

    #[test]
    fn attached_parens_are_part_of_tag_names() {
        let q = ok("bow_(weapon) (cat)");
        assert_eq!(q.root.tokens, vec![lit("bow_(weapon)"), lit("(cat)")]);
    }

    #[test]
    fn balanced_queries_parse() {
        for query in ["", "( )", "( ( a ) )", "a ( b ) ( c ( d ) )", "( ( ( ) ) )"] {
            assert!(parse(query).is_ok(), "{query}");
        }
    }

    #[test]
    fn unclosed_group_is_malformed() {
        let err = parse("a ( b ( c )").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::UnclosedGroup { open: 1 });
        assert_eq!(err.query, "a ( b ( c )");
    }

    #[test]
    fn stray_close_is_malformed() {
        let err = parse("a ) b").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::UnexpectedClose { token_index: 1 });
        assert!(parse(") (").is_err());
    }

    #[test]
    fn predicates_stay_in_their_group() {
        let q = ok("rating:s ( score:>5 wolf )");
        assert_eq!(q.root.tokens[0], GroupToken::MetaRef(0));
        assert_eq!(q.root.predicates.len(), 1);
        let inner = &q.root.subgroups[0];
        assert_eq!(inner.tokens, vec![GroupToken::MetaRef(0), lit("wolf")]);
        assert_eq!(inner.predicates.len(), 1);
    }

    #[test]
    fn order_goes_to_root() {
        let q = ok("( wolf order:score_asc )");
        assert_eq!(
            q.order(),
            &[OrderDirective::Field {
                field: SortField::Score,
                direction: Direction::Ascending
            }]
        );
        assert!(q.root.subgroups[0].order.is_empty());
        assert_eq!(q.root.subgroups[0].tokens, vec![lit("wolf")]);
    }

    #[test]
    fn negated_order_does_not_leak_negation() {
        let q = ok("-order:score wolf");
        assert_eq!(q.root.tokens, vec![lit("wolf")]);
        assert_eq!(q.order().len(), 1);
    }

    #[test]
    fn deleted_flag_propagates_from_nested_groups() {
        assert!(ok("wolf ( fox status:deleted )").includes_deleted);
        assert!(ok("status:any").includes_deleted);
        assert!(!ok("wolf status:pending").includes_deleted);
        let q = ok("status:deleted");
        assert_eq!(
            q.root.predicates,
            vec![FieldPredicate::Status(Status::Deleted)]
        );
    }

    #[test]
    fn literals_are_collected_recursively() {
        let q = ok("a ( b ~ ( c ) ) rating:s");
        assert_eq!(q.root.literals(), vec!["a", "b", "c"]);
    }

    #[test]
    fn display_renders_tree() {
        let rendered = ok("a ~ ( -b )").to_string();
        assert_eq!(rendered, "a\nOR\n(\n  NOT\n  b\n)\n");
    }
}
