//! Constraint compiler.
//!
//! Lowers parsed [`Constraint`]s into backend-neutral [`Predicate`]s. A
//! constraint whose value cannot be used with its operator is reported as a
//! [`TypeError`] and dropped. The rest of the query is unaffected.

use kissql_core::{CompareOp, Comparable, Predicate, PredicateKind, TypeError};

use crate::ast::{Connective, Constraint, ConstraintValue, Operator};

/// A compiled constraint, still carrying its position-dependent attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledConstraint {
    pub predicate: Predicate,
    pub connective: Connective,
    /// `Some` for ranking-only constraints
    pub boost: Option<f32>,
}

impl CompiledConstraint {
    pub fn is_filter(&self) -> bool {
        self.boost.is_none()
    }
}

/// Compile one constraint.
pub fn compile(constraint: &Constraint) -> Result<Predicate, TypeError> {
    let field = constraint.field.clone();
    let kind = match constraint.operator {
        Operator::Eq | Operator::Ne => PredicateKind::Equals(scalar(constraint)?.to_lowercase()),
        Operator::Gt => compare(constraint, CompareOp::Gt)?,
        Operator::Ge => compare(constraint, CompareOp::Ge)?,
        Operator::Lt => compare(constraint, CompareOp::Lt)?,
        Operator::Le => compare(constraint, CompareOp::Le)?,
        Operator::StartsWith => PredicateKind::StartsWith(scalar(constraint)?.to_lowercase()),
        Operator::EndsWith => PredicateKind::EndsWith(scalar(constraint)?.to_lowercase()),
        Operator::Contains => PredicateKind::Contains(scalar(constraint)?.to_lowercase()),
        Operator::In => match &constraint.value {
            ConstraintValue::List(items) if !items.is_empty() => {
                PredicateKind::OneOf(items.iter().map(|i| i.to_lowercase()).collect())
            }
            _ => return Err(type_error(constraint, "expected a non-empty value list")),
        },
        Operator::Range => range(constraint)?,
        Operator::Has | Operator::NotHas => PredicateKind::Exists,
    };

    let inverted = matches!(constraint.operator, Operator::Ne | Operator::NotHas);
    let mut predicate = Predicate::new(field, kind);
    predicate.negated = inverted != constraint.negated;
    Ok(predicate)
}

/// Compile every constraint, collecting type errors instead of failing.
pub fn compile_all(constraints: &[Constraint]) -> (Vec<CompiledConstraint>, Vec<TypeError>) {
    let mut compiled = Vec::with_capacity(constraints.len());
    let mut errors = Vec::new();
    for constraint in constraints {
        match compile(constraint) {
            Ok(predicate) => compiled.push(CompiledConstraint {
                predicate,
                connective: constraint.connective,
                boost: constraint.boost,
            }),
            Err(e) => errors.push(e),
        }
    }
    (compiled, errors)
}

fn type_error(constraint: &Constraint, message: impl Into<String>) -> TypeError {
    let prefix = if constraint.negated { "NOT " } else { "" };
    TypeError {
        constraint: format!("{prefix}{constraint}"),
        message: message.into(),
    }
}

fn scalar(constraint: &Constraint) -> Result<&str, TypeError> {
    match &constraint.value {
        ConstraintValue::Scalar(value) => Ok(value),
        _ => Err(type_error(constraint, "expected a single value")),
    }
}

fn compare(constraint: &Constraint, op: CompareOp) -> Result<PredicateKind, TypeError> {
    let raw = scalar(constraint)?;
    let bound = Comparable::parse(raw).ok_or_else(|| {
        type_error(
            constraint,
            format!("`{raw}` is neither a number nor an ISO date"),
        )
    })?;
    Ok(PredicateKind::Compare { op, bound })
}

fn range(constraint: &Constraint) -> Result<PredicateKind, TypeError> {
    let ConstraintValue::Range { lower, upper } = &constraint.value else {
        return Err(type_error(constraint, "expected a range"));
    };
    let parse = |raw: &str| {
        Comparable::parse(raw).ok_or_else(|| {
            type_error(
                constraint,
                format!("range bound `{raw}` is neither a number nor an ISO date"),
            )
        })
    };
    let (lower, upper) = (parse(lower)?, parse(upper)?);
    if !lower.same_kind(&upper) {
        return Err(type_error(
            constraint,
            "range bounds must both be numbers or both be dates",
        ));
    }
    Ok(PredicateKind::Range { lower, upper })
}
