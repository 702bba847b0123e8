//! KISSQL parser.
//!
//! Turns the token stream into a [`StructuredQuery`]. Tokens are consumed
//! strictly left to right: `NOT` and `OR` are prefixes that attach to the
//! next term, phrase or constraint.

use kissql_core::{Error, ParseError};

use crate::ast::{
    Connective, Constraint, ConstraintValue, Meta, Operator, PhraseTerm, PipeKind, PipeOp,
    SortDirection, StructuredQuery, TextTerm,
};
use crate::lexer::tokenize;
use crate::token::{LogicalOp, MetaKey, Token, TokenKind};

/// Row count used by a pipe written without an argument.
pub const DEFAULT_PIPE_N: usize = 100;

/// Query parser.
pub struct QueryParser {
    /// Argument assumed by `| HEAD`, `| TAIL` and `| SAMPLE` with no count
    default_pipe_n: usize,
}

impl QueryParser {
    /// Create a new query parser.
    #[must_use]
    pub fn new(default_pipe_n: usize) -> Self {
        Self { default_pipe_n }
    }

    /// Parse a query string.
    ///
    /// Supports:
    /// - free text, `"phrases"`, `"proximity phrases"~3`, `term^2` boosts
    /// - `field=value` and the `!= < <= > >= ^= $= ~=` operators
    /// - `field=in(a,b)`, `field=lo..hi`, `has:field`, `!has:field`
    /// - `AND`, `OR`, `NOT` (also `&&`, `||`, `!`)
    /// - `sort:field[:asc|desc]`, `limit:N`, `similar:ID`, `cluster=N`
    /// - trailing `| HEAD n`, `| TAIL n`, `| SAMPLE n`
    pub fn parse(&self, query: &str) -> Result<StructuredQuery, Error> {
        let tokens = tokenize(query)?;
        Ok(self.parse_tokens(&tokens)?)
    }

    /// Parse an already tokenized query.
    pub fn parse_tokens(&self, tokens: &[Token]) -> Result<StructuredQuery, ParseError> {
        let mut query = StructuredQuery::default();
        let mut pending = Pending::default();

        for token in tokens {
            match &token.kind {
                TokenKind::LogicalOp(LogicalOp::Not) => {
                    pending.negate = !pending.negate;
                    pending.offset.get_or_insert(token.offset);
                }
                TokenKind::LogicalOp(LogicalOp::Or) => {
                    pending.or = true;
                    pending.offset.get_or_insert(token.offset);
                }
                TokenKind::LogicalOp(LogicalOp::And) => {}

                TokenKind::Word { text, boost } => {
                    let (negated, _) = pending.take();
                    query.text_terms.push(TextTerm {
                        term: text.clone(),
                        boost: *boost,
                        negated,
                    });
                }
                TokenKind::Phrase { text, boost } => {
                    let (negated, _) = pending.take();
                    query.phrases.push(PhraseTerm {
                        phrase: text.clone(),
                        proximity: None,
                        boost: *boost,
                        negated,
                    });
                }
                TokenKind::ProximityPhrase {
                    text,
                    distance,
                    boost,
                } => {
                    let (negated, _) = pending.take();
                    query.phrases.push(PhraseTerm {
                        phrase: text.clone(),
                        proximity: Some(*distance),
                        boost: *boost,
                        negated,
                    });
                }

                TokenKind::FieldExpr { .. }
                | TokenKind::SetExpr { .. }
                | TokenKind::RangeExpr { .. }
                | TokenKind::ExistenceExpr { .. } => {
                    let Some(mut constraint) = constraint_from(&token.kind) else {
                        continue;
                    };
                    let (negated, or) = pending.take();
                    constraint.negated = negated;
                    // The first constraint has nothing to its left
                    constraint.connective = if or && !query.constraints.is_empty() {
                        Connective::Or
                    } else {
                        Connective::And
                    };
                    query.constraints.push(constraint);
                }

                TokenKind::MetaDirective { key, value } => {
                    pending.ensure_empty("directive")?;
                    apply_meta(&mut query.meta, *key, value, token.offset)?;
                }
                TokenKind::PipeOp { name, args } => {
                    pending.ensure_empty("pipe")?;
                    query
                        .pipe_chain
                        .push(self.pipe_from(name, args, token.offset)?);
                }
            }
        }

        pending.ensure_empty("end of query")?;
        Ok(query)
    }

    fn pipe_from(&self, name: &str, args: &[String], offset: usize) -> Result<PipeOp, ParseError> {
        let kind = match name.to_ascii_uppercase().as_str() {
            "HEAD" => PipeKind::Head,
            "TAIL" => PipeKind::Tail,
            "SAMPLE" => PipeKind::Sample,
            "" => return Err(ParseError::new(offset, "empty pipe segment")),
            _ => return Err(ParseError::new(offset, format!("unknown pipe `{name}`"))),
        };
        let n = match args {
            [] => self.default_pipe_n,
            [arg] => arg.parse::<usize>().map_err(|_| {
                ParseError::new(
                    offset,
                    format!("{kind} expects a non-negative integer, got `{arg}`"),
                )
            })?,
            _ => {
                return Err(ParseError::new(
                    offset,
                    format!("{kind} takes at most one argument"),
                ))
            }
        };
        Ok(PipeOp { kind, n })
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new(DEFAULT_PIPE_N)
    }
}

/// Parse a query with the default parser settings.
pub fn parse(query: &str) -> Result<StructuredQuery, Error> {
    QueryParser::default().parse(query)
}

/// `NOT` / `OR` prefixes waiting for an operand.
#[derive(Default)]
struct Pending {
    negate: bool,
    or: bool,
    offset: Option<usize>,
}

impl Pending {
    fn take(&mut self) -> (bool, bool) {
        let taken = (self.negate, self.or);
        *self = Self::default();
        taken
    }

    fn ensure_empty(&self, before: &str) -> Result<(), ParseError> {
        match self.offset {
            Some(offset) => Err(ParseError::new(
                offset,
                format!("logical operator has no operand before {before}"),
            )),
            None => Ok(()),
        }
    }
}

fn constraint_from(kind: &TokenKind) -> Option<Constraint> {
    let constraint = match kind {
        TokenKind::FieldExpr {
            field,
            op,
            value,
            boost,
        } => {
            let mut c = Constraint::scalar(field.clone(), *op, value.clone());
            c.boost = *boost;
            c
        }
        TokenKind::SetExpr {
            field,
            values,
            boost,
        } => {
            let mut c = Constraint::new(
                field.clone(),
                Operator::In,
                ConstraintValue::List(values.clone()),
            );
            c.boost = *boost;
            c
        }
        TokenKind::RangeExpr {
            field,
            lower,
            upper,
            boost,
        } => {
            let mut c = Constraint::new(
                field.clone(),
                Operator::Range,
                ConstraintValue::Range {
                    lower: lower.clone(),
                    upper: upper.clone(),
                },
            );
            c.boost = *boost;
            c
        }
        TokenKind::ExistenceExpr { field, present } => {
            let op = if *present {
                Operator::Has
            } else {
                Operator::NotHas
            };
            Constraint::new(field.clone(), op, ConstraintValue::None)
        }
        _ => return None,
    };
    Some(constraint)
}

fn apply_meta(meta: &mut Meta, key: MetaKey, value: &str, offset: usize) -> Result<(), ParseError> {
    match key {
        MetaKey::Limit => {
            let limit = value.parse::<usize>().map_err(|_| {
                ParseError::new(
                    offset,
                    format!("limit expects a non-negative integer, got `{value}`"),
                )
            })?;
            meta.limit = Some(limit);
        }
        MetaKey::Cluster => {
            let cluster = value.parse::<i64>().map_err(|_| {
                ParseError::new(offset, format!("cluster expects an integer, got `{value}`"))
            })?;
            meta.cluster_id = Some(cluster);
        }
        MetaKey::Similar => {
            if value.is_empty() {
                return Err(ParseError::new(offset, "similar expects an article id"));
            }
            meta.similar_id = Some(value.to_string());
        }
        MetaKey::Sort => {
            let (field, dir) = match value.rsplit_once(':') {
                Some((field, dir)) => {
                    let dir = match dir.to_ascii_lowercase().as_str() {
                        "asc" => SortDirection::Asc,
                        "desc" => SortDirection::Desc,
                        _ => {
                            return Err(ParseError::new(
                                offset,
                                format!("sort direction must be asc or desc, got `{dir}`"),
                            ))
                        }
                    };
                    (field, dir)
                }
                None => (value, SortDirection::Desc),
            };
            if field.is_empty() {
                return Err(ParseError::new(offset, "sort expects a field name"));
            }
            meta.sort_field = Some(field.to_string());
            meta.sort_dir = dir;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(query: &str) -> StructuredQuery {
        parse(query).unwrap()
    }

    fn parse_err(query: &str) -> ParseError {
        match parse(query) {
            Err(Error::Parse(e)) => e,
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_simple() {
        let query = parse_ok("how to implement auth");
        let terms: Vec<_> = query.text_terms.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["how", "to", "implement", "auth"]);
        assert!(query.constraints.is_empty());
        assert_eq!(query.meta, Meta::default());
    }

    #[test]
    fn test_free_text_with_filters() {
        let query = parse_ok(r#"AI AND category="AI Business" sentiment=Positive"#);

        assert_eq!(query.text_terms, vec![TextTerm::new("AI")]);
        assert_eq!(
            query.constraints,
            vec![
                Constraint::scalar("category", Operator::Eq, "AI Business"),
                Constraint::scalar("sentiment", Operator::Eq, "Positive"),
            ]
        );
    }

    #[test]
    fn test_phrase_with_negation_sort_and_limit() {
        let query =
            parse_ok(r#""large language models" NOT Google sort:publication_date:desc limit:50"#);

        assert_eq!(query.phrases, vec![PhraseTerm::new("large language models")]);
        assert_eq!(
            query.text_terms,
            vec![TextTerm {
                term: "Google".into(),
                boost: None,
                negated: true
            }]
        );
        assert_eq!(query.meta.sort_field.as_deref(), Some("publication_date"));
        assert_eq!(query.meta.sort_dir, SortDirection::Desc);
        assert_eq!(query.meta.limit, Some(50));
    }

    #[test]
    fn test_unterminated_set_is_lex_error() {
        match parse("AI sentiment=in(Positive, Neutral") {
            Err(Error::Lex(e)) => assert_eq!(e.offset, 13),
            other => panic!("expected lex error, got {other:?}"),
        }
    }

    #[test]
    fn test_pipes_in_order() {
        let query = parse_ok("AGI | HEAD 20 | TAIL 5");
        assert_eq!(query.text_terms, vec![TextTerm::new("AGI")]);
        assert_eq!(query.pipe_chain, vec![PipeOp::head(20), PipeOp::tail(5)]);
    }

    #[test]
    fn test_pipe_default_argument() {
        let query = parse_ok("x | sample");
        assert_eq!(query.pipe_chain, vec![PipeOp::sample(DEFAULT_PIPE_N)]);
    }

    #[test]
    fn test_bad_pipes() {
        assert!(parse_err("x | EXPLODE 3").message.contains("unknown pipe"));
        assert!(parse_err("x | HEAD -1").message.contains("HEAD"));
        assert!(parse_err("x | HEAD 1 2").message.contains("at most one"));
        assert!(parse_err("x | | HEAD 1").message.contains("empty"));
        assert_eq!(parse_err("x | HEAD abc").offset, 2);
    }

    #[test]
    fn test_or_and_not_attach_to_next_constraint() {
        let query = parse_ok("source=Reuters OR NOT source=AP category=tech");
        let connectives: Vec<_> = query.constraints.iter().map(|c| c.connective).collect();
        let negations: Vec<_> = query.constraints.iter().map(|c| c.negated).collect();
        assert_eq!(
            connectives,
            vec![Connective::And, Connective::Or, Connective::And]
        );
        assert_eq!(negations, vec![false, true, false]);
    }

    #[test]
    fn test_leading_or_is_normalized() {
        let query = parse_ok("OR category=tech");
        assert_eq!(query.constraints[0].connective, Connective::And);
    }

    #[test]
    fn test_double_not_cancels() {
        let query = parse_ok("NOT NOT Google");
        assert!(!query.text_terms[0].negated);
    }

    #[test]
    fn test_dangling_operators() {
        assert_eq!(parse_err("AI NOT").offset, 3);
        assert!(parse_err("AI OR").message.contains("end of query"));
        assert!(parse_err("AI NOT limit:5").message.contains("directive"));
        assert!(parse_err("AI OR | HEAD 2").message.contains("pipe"));
    }

    #[test]
    fn test_existence_set_and_range() {
        let query = parse_ok("has:driver_type !has:author sentiment=in(Positive,Neutral) score=1..5");
        let ops: Vec<_> = query.constraints.iter().map(|c| c.operator).collect();
        assert_eq!(
            ops,
            vec![
                Operator::Has,
                Operator::NotHas,
                Operator::In,
                Operator::Range
            ]
        );
        assert_eq!(
            query.constraints[3].value,
            ConstraintValue::Range {
                lower: "1".into(),
                upper: "5".into()
            }
        );
    }

    #[test]
    fn test_boosts() {
        let query = parse_ok(r#"AI^2 "neural nets"~4^1.5 category^3=tech"#);
        assert_eq!(query.text_terms[0].boost, Some(2.0));
        assert_eq!(query.phrases[0].proximity, Some(4));
        assert_eq!(query.phrases[0].boost, Some(1.5));
        assert_eq!(query.constraints[0].boost, Some(3.0));
        assert!(!query.constraints[0].is_filter());
    }

    #[test]
    fn test_meta_last_occurrence_wins() {
        let query = parse_ok("limit:5 limit:7 sort:title sort:score:ASC");
        assert_eq!(query.meta.limit, Some(7));
        assert_eq!(query.meta.sort_field.as_deref(), Some("score"));
        assert_eq!(query.meta.sort_dir, SortDirection::Asc);
    }

    #[test]
    fn test_meta_validation() {
        assert!(parse_err("limit:ten").message.contains("limit"));
        assert!(parse_err("limit:-1").message.contains("limit"));
        assert!(parse_err("cluster=abc").message.contains("cluster"));
        assert!(parse_err("similar:").message.contains("similar"));
        assert!(parse_err("sort:").message.contains("sort"));
        assert!(parse_err("sort:date:sideways").message.contains("asc or desc"));
    }

    #[test]
    fn test_similar_and_cluster() {
        let query = parse_ok("similar:a-42 cluster=-3");
        assert_eq!(query.meta.similar_id.as_deref(), Some("a-42"));
        assert_eq!(query.meta.cluster_id, Some(-3));
    }

    #[test]
    fn test_empty_query() {
        let query = parse_ok("");
        assert!(query.is_match_all());
        assert!(query.pipe_chain.is_empty());
    }

    #[test]
    fn test_display_reparses_to_same_query() {
        for input in [
            r#"AI AND category="AI Business" sentiment=Positive"#,
            r#""large language models" NOT Google sort:publication_date:desc limit:50"#,
            "AGI | HEAD 20 | TAIL 5",
            r#"x^2 "a b"~3 NOT has:author OR score=1..5 tag=in("a b",c) similar:42 cluster=3"#,
            r#"title~="wait..what" url^="https://x""#,
        ] {
            let first = parse_ok(input);
            let second = parse_ok(&first.to_string());
            assert_eq!(first, second, "canonical form of {input:?} did not round-trip");
        }
    }
}
