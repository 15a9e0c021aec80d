//! Ready-made output relations for the common comparison cases.
//!
//! Each builder returns a [`RelationFn`] comparing one source output with
//! one follow-up output. Combine them with [`any_of`] when a relation holds
//! under more than one comparison.

use std::sync::Arc;

use crate::errors::MetamorphicError;
use crate::params::{unwrap_result, RelationFn};
use crate::value::Value;

fn as_number(value: &Value, side: &str) -> Result<f64, MetamorphicError> {
    value.as_number().ok_or_else(|| {
        MetamorphicError::configuration(format!(
            "numeric relation expected a number for the {side} output, got {}",
            value.type_name()
        ))
    })
}

/// Outputs must be equal.
pub fn equality() -> RelationFn {
    Arc::new(|f_x, f_xt, _| Ok(Value::Bool(f_x == f_xt)))
}

/// The source output must be strictly less than the follow-up output.
pub fn is_less_than() -> RelationFn {
    Arc::new(|f_x, f_xt, _| {
        let a = as_number(&f_x, "source")?;
        let b = as_number(&f_xt, "follow-up")?;
        Ok(Value::Bool(a < b))
    })
}

/// The source output must be strictly greater than the follow-up output.
pub fn is_greater_than() -> RelationFn {
    Arc::new(|f_x, f_xt, _| {
        let a = as_number(&f_x, "source")?;
        let b = as_number(&f_xt, "follow-up")?;
        Ok(Value::Bool(a > b))
    })
}

/// Outputs must be approximately equal: within `rel_tol` of the larger
/// magnitude, or within the absolute floor `abs_tol` near zero.
pub fn approximately(rel_tol: f64, abs_tol: f64) -> RelationFn {
    Arc::new(move |f_x, f_xt, _| {
        let a = as_number(&f_x, "source")?;
        let b = as_number(&f_xt, "follow-up")?;
        let close = (a - b).abs() <= f64::max(rel_tol * f64::max(a.abs(), b.abs()), abs_tol);
        Ok(Value::Bool(close))
    })
}

/// Disjunction of relations: holds when at least one of the given relations
/// holds for the output pair. Parameterized (wrapped) results of the inner
/// relations are unwrapped before combining.
pub fn any_of(relations: Vec<RelationFn>) -> RelationFn {
    Arc::new(move |f_x, f_xt, kwargs| {
        for relation in &relations {
            let result = relation(f_x.clone(), f_xt.clone(), kwargs.clone())?;
            let holds = unwrap_result(result)
                .into_value()
                .as_bool()
                .ok_or_else(|| {
                    MetamorphicError::configuration(
                        "a combined relation returned a non-boolean result",
                    )
                })?;
            if holds {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    })
}

#[cfg(test)]
mod relations_tests {
    use super::*;
    use crate::value::ParamMap;

    fn apply(relation: &RelationFn, a: f64, b: f64) -> bool {
        relation(Value::Number(a), Value::Number(b), ParamMap::new())
            .unwrap()
            .as_bool()
            .unwrap()
    }

    #[test]
    fn equality_compares_values() {
        let rel = equality();
        assert!(apply(&rel, 2.0, 2.0));
        assert!(!apply(&rel, 2.0, 3.0));
    }

    #[test]
    fn orderings_are_strict() {
        assert!(apply(&is_less_than(), 1.0, 2.0));
        assert!(!apply(&is_less_than(), 2.0, 2.0));
        assert!(apply(&is_greater_than(), 3.0, 2.0));
        assert!(!apply(&is_greater_than(), 2.0, 2.0));
    }

    #[test]
    fn approximately_uses_relative_and_absolute_tolerance() {
        let rel = approximately(1e-9, 0.0);
        assert!(apply(&rel, 1.0, 1.0 + 1e-12));
        assert!(!apply(&rel, 1.0, 1.001));

        // Near zero the relative bound vanishes; the absolute floor decides.
        let floored = approximately(1e-9, 1e-6);
        assert!(apply(&floored, 0.0, 1e-7));
        assert!(!apply(&floored, 0.0, 1e-3));
    }

    #[test]
    fn any_of_is_a_disjunction() {
        let rel = any_of(vec![equality(), is_less_than()]);
        assert!(apply(&rel, 2.0, 2.0));
        assert!(apply(&rel, 1.0, 2.0));
        assert!(!apply(&rel, 3.0, 2.0));
    }

    #[test]
    fn numeric_relation_rejects_non_numbers() {
        let rel = is_less_than();
        assert!(rel(
            Value::String("a".into()),
            Value::Number(1.0),
            ParamMap::new()
        )
        .is_err());
    }
}
