use std::str::FromStr;

use serde_json::Value;

use crate::error::MatchError;
use crate::types::{Condition, MatchPredicate, Record};

/// Evaluate a route predicate against a record.
///
/// AND semantics across pairs: the route matches only if every
/// `(field_path, condition)` pair matches. Paths that resolve to
/// nothing compare as null rather than erroring. Pure, no I/O.
pub fn matches(record: &Record, predicate: &MatchPredicate) -> Result<bool, MatchError> {
    for (path, condition) in predicate {
        let value = record.lookup(path);
        if !condition_matches(value.as_ref(), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn condition_matches(value: Option<&Value>, condition: &Condition) -> Result<bool, MatchError> {
    match condition {
        Condition::Equals(expected) => Ok(value_equals(value, expected)),
        Condition::AnyOf(list) => Ok(list_contains(list, value)),
        Condition::Ops(ops) => {
            for (operator, operand) in ops {
                let op = Op::from_str(operator)?;
                if !op.eval(value, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

/// Comparison operators usable inside a structured condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
    Eq,
    Contains,
    In,
    NotIn,
    Exists,
}

impl FromStr for Op {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Op::Gt),
            "<" => Ok(Op::Lt),
            ">=" => Ok(Op::Ge),
            "<=" => Ok(Op::Le),
            "!=" => Ok(Op::Ne),
            "=" | "==" => Ok(Op::Eq),
            "contains" => Ok(Op::Contains),
            "in" => Ok(Op::In),
            "not_in" => Ok(Op::NotIn),
            "exists" => Ok(Op::Exists),
            other => Err(MatchError::UnknownOperator {
                operator: other.to_string(),
            }),
        }
    }
}

impl Op {
    fn eval(self, value: Option<&Value>, operand: &Value) -> Result<bool, MatchError> {
        match self {
            Op::Gt => Ok(compare_numeric(value, operand, |v, o| v > o)),
            Op::Lt => Ok(compare_numeric(value, operand, |v, o| v < o)),
            Op::Ge => Ok(compare_numeric(value, operand, |v, o| v >= o)),
            Op::Le => Ok(compare_numeric(value, operand, |v, o| v <= o)),
            Op::Eq => Ok(value_equals(value, operand)),
            Op::Ne => Ok(!value_equals(value, operand)),
            Op::Contains => {
                let haystack = stringify(value).to_lowercase();
                let needle = stringify(Some(operand)).to_lowercase();
                Ok(haystack.contains(&needle))
            }
            Op::In => {
                let list = operand_list(operand, "in")?;
                Ok(list_contains(list, value))
            }
            Op::NotIn => {
                let list = operand_list(operand, "not_in")?;
                Ok(!list_contains(list, value))
            }
            Op::Exists => {
                let want = operand.as_bool().ok_or_else(|| MatchError::InvalidOperand {
                    operator: "exists".to_string(),
                    detail: "operand must be a boolean".to_string(),
                })?;
                Ok(value.is_some() == want)
            }
        }
    }
}

/// Exact equality, no coercion. A null operand matches an absent value.
fn value_equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        Some(v) => v == expected,
        None => expected.is_null(),
    }
}

fn list_contains(list: &[Value], value: Option<&Value>) -> bool {
    list.iter().any(|candidate| value_equals(value, candidate))
}

/// Ordering operators are numeric-only; any non-numeric side fails the
/// comparison rather than coercing.
fn compare_numeric(value: Option<&Value>, operand: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (value.and_then(Value::as_f64), operand.as_f64()) {
        (Some(v), Some(o)) => cmp(v, o),
        _ => false,
    }
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn operand_list<'a>(operand: &'a Value, operator: &str) -> Result<&'a Vec<Value>, MatchError> {
    match operand {
        Value::Array(list) => Ok(list),
        _ => Err(MatchError::InvalidOperand {
            operator: operator.to_string(),
            detail: "operand must be a list".to_string(),
        }),
    }
}
