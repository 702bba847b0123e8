//! Property tests for the query language.
//!
//! - Parsing is deterministic
//! - The canonical form re-parses to the same query
//! - `HEAD` is idempotent and pipes do not commute

use kissql_query::pipe::apply_pipes;
use kissql_query::{
    parse, Connective, Constraint, ConstraintValue, Meta, Operator, PhraseTerm, PipeKind, PipeOp,
    SortDirection, StructuredQuery, TextTerm,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ============================================================================
// STRATEGIES
// ============================================================================

fn boost() -> impl Strategy<Value = Option<f32>> {
    prop_oneof![
        Just(None),
        prop::sample::select(vec![0.5f32, 1.5, 2.0, 3.0, 10.0]).prop_map(Some),
    ]
}

fn word() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9]{0,8}".prop_filter("logical keyword", |w| {
        !matches!(w.to_ascii_uppercase().as_str(), "AND" | "OR" | "NOT")
    })
}

fn text_term() -> impl Strategy<Value = TextTerm> {
    (word(), boost(), any::<bool>()).prop_map(|(term, boost, negated)| TextTerm {
        term,
        boost,
        negated,
    })
}

fn phrase_term() -> impl Strategy<Value = PhraseTerm> {
    (
        "[a-zA-Z0-9 \"\\\\|:=]{0,16}",
        prop::option::of(0u32..10),
        boost(),
        any::<bool>(),
    )
        .prop_map(|(phrase, proximity, boost, negated)| PhraseTerm {
            phrase,
            proximity,
            boost,
            negated,
        })
}

fn field() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_.]{0,8}"
}

fn scalar_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,:\"()|-]{1,12}"
}

fn constraint() -> impl Strategy<Value = Constraint> {
    let scalar_op = prop::sample::select(vec![
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Ge,
        Operator::Lt,
        Operator::Le,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Contains,
    ]);
    let shaped = prop_oneof![
        (scalar_op, scalar_value()).prop_map(|(op, v)| (op, ConstraintValue::Scalar(v))),
        prop::collection::vec(scalar_value(), 1..4)
            .prop_map(|items| (Operator::In, ConstraintValue::List(items))),
        ("[0-9]{1,4}", "[0-9]{1,4}").prop_map(|(lower, upper)| {
            (Operator::Range, ConstraintValue::Range { lower, upper })
        }),
        Just((Operator::Has, ConstraintValue::None)),
        Just((Operator::NotHas, ConstraintValue::None)),
    ];

    (field(), shaped, boost(), any::<bool>(), any::<bool>()).prop_map(
        |(field, (operator, value), boost, negated, or)| {
            let existence = matches!(operator, Operator::Has | Operator::NotHas);
            Constraint {
                field,
                operator,
                value,
                boost: if existence { None } else { boost },
                negated,
                connective: if or { Connective::Or } else { Connective::And },
            }
        },
    )
}

fn meta() -> impl Strategy<Value = Meta> {
    (
        prop::option::of(("[a-z_]{1,10}", any::<bool>())),
        prop::option::of(0usize..2000),
        prop::option::of("[a-z0-9-]{1,8}"),
        prop::option::of(-50i64..50),
    )
        .prop_map(|(sort, limit, similar_id, cluster_id)| {
            let (sort_field, sort_dir) = match sort {
                Some((field, true)) => (Some(field), SortDirection::Asc),
                Some((field, false)) => (Some(field), SortDirection::Desc),
                None => (None, SortDirection::Desc),
            };
            Meta {
                sort_field,
                sort_dir,
                limit,
                similar_id,
                cluster_id,
            }
        })
}

fn pipe() -> impl Strategy<Value = PipeOp> {
    (
        prop::sample::select(vec![PipeKind::Head, PipeKind::Tail, PipeKind::Sample]),
        0usize..300,
    )
        .prop_map(|(kind, n)| PipeOp { kind, n })
}

fn structured_query() -> impl Strategy<Value = StructuredQuery> {
    (
        prop::collection::vec(text_term(), 0..4),
        prop::collection::vec(phrase_term(), 0..3),
        prop::collection::vec(constraint(), 0..5),
        meta(),
        prop::collection::vec(pipe(), 0..3),
    )
        .prop_map(|(text_terms, phrases, mut constraints, meta, pipe_chain)| {
            if let Some(first) = constraints.first_mut() {
                first.connective = Connective::And;
            }
            StructuredQuery {
                text_terms,
                phrases,
                constraints,
                meta,
                pipe_chain,
            }
        })
}

// ============================================================================
// PARSER PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Property: the same input always yields the same result, error or not.
    #[test]
    fn prop_parse_is_deterministic(input in "[ -~]{0,60}") {
        let first = format!("{:?}", parse(&input));
        let second = format!("{:?}", parse(&input));
        prop_assert_eq!(first, second);
    }

    /// Property: canonical syntax re-parses to an equal query.
    #[test]
    fn prop_canonical_form_round_trips(query in structured_query()) {
        let rendered = query.to_string();
        let reparsed = parse(&rendered);
        prop_assert!(reparsed.is_ok(), "{:?} failed to parse: {:?}", rendered, reparsed);
        prop_assert_eq!(reparsed.unwrap(), query, "canonical form: {}", rendered);
    }

    /// Property: rendering a parsed query is a fixed point.
    #[test]
    fn prop_canonical_form_is_stable(query in structured_query()) {
        let once = query.to_string();
        let twice = parse(&once).unwrap().to_string();
        prop_assert_eq!(once, twice);
    }
}

// ============================================================================
// PIPE PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Property: HEAD a | HEAD b with b <= a equals HEAD b.
    #[test]
    fn prop_head_idempotent(len in 0usize..200, a in 0usize..250, shrink in 0usize..250) {
        let b = a.saturating_sub(shrink);
        let items: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(0);

        let twice = apply_pipes(items.clone(), &[PipeOp::head(a), PipeOp::head(b)], &mut rng);
        let once = apply_pipes(items, &[PipeOp::head(b)], &mut rng);
        prop_assert_eq!(twice, once);
    }

    /// Property: no pipe ever grows the list, and n >= len is a no-op.
    #[test]
    fn prop_pipes_never_grow(len in 0usize..100, ops in prop::collection::vec(pipe(), 0..4)) {
        let items: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let out = apply_pipes(items.clone(), &ops, &mut rng);
        prop_assert!(out.len() <= len);
        prop_assert!(out.iter().all(|x| items.contains(x)));

        let noop = apply_pipes(items.clone(), &[PipeOp::head(len), PipeOp::tail(len + 3)], &mut rng);
        prop_assert_eq!(noop, items);
    }

    /// Property: HEAD 5 | TAIL 2 and TAIL 2 | HEAD 5 differ on any list of 8 or more.
    #[test]
    fn prop_pipes_do_not_commute(len in 8usize..300) {
        let items: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(2);

        let head_then_tail = apply_pipes(items.clone(), &[PipeOp::head(5), PipeOp::tail(2)], &mut rng);
        let tail_then_head = apply_pipes(items, &[PipeOp::tail(2), PipeOp::head(5)], &mut rng);

        prop_assert_eq!(&head_then_tail, &vec![3, 4]);
        prop_assert_eq!(&tail_then_head, &vec![len - 2, len - 1]);
        prop_assert_ne!(head_then_tail, tail_then_head);
    }
}
