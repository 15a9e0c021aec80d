//! Composable fixed/random parameter injection for transform and relation
//! functions.
//!
//! A wrap is plain function composition: `fixed` always injects a constant
//! keyword, `randomized` injects a freshly generated value on every call,
//! and wraps stack arbitrarily. Each wrap encodes its result as a 3-element
//! list `(inner result, keyword map used, true)`. Keywords flow inward
//! through the stack, so the innermost triple carries the complete keyword
//! map; later wraps override earlier ones on a name collision without any
//! duplicate detection at this layer (collisions against the test case's
//! externally supplied parameters fail fast when merged, in
//! [`crate::case::TestCase::merge_parameters`]).
//!
//! # Known correctness hazard
//!
//! Unwrapping is shape-sniffing: any 3-element list whose last element is a
//! Bool is treated as a wrapped triple. A genuine transform or relation
//! result of exactly that shape will be misinterpreted as parameter
//! metadata. This ambiguity is inherited deliberately; callers whose
//! payloads can take that shape should nest them one level deeper.

use std::sync::Arc;

use rand::Rng;

use crate::case::TestCase;
use crate::errors::MetamorphicError;
use crate::value::{ParamMap, Value};

/// Single-source transformation: one source input plus injected keywords,
/// producing the follow-up input(s).
pub type TransformFn = Arc<dyn Fn(Value, ParamMap) -> Result<Value, MetamorphicError>>;

/// General transformation: full test-case view plus injected keywords.
pub type GeneralTransformFn = Arc<dyn Fn(&TestCase, ParamMap) -> Result<Value, MetamorphicError>>;

/// Single-pair relation: one source output, one follow-up output, keywords.
pub type RelationFn = Arc<dyn Fn(Value, Value, ParamMap) -> Result<Value, MetamorphicError>>;

/// General relation: full test-case view plus injected keywords.
pub type GeneralRelationFn = Arc<dyn Fn(&TestCase, ParamMap) -> Result<Value, MetamorphicError>>;

/// Validity predicate over a single source output.
pub type ValidInputFn = Arc<dyn Fn(&Value) -> bool>;

/// Produces a fresh value per call, for [`randomized`] wraps.
pub trait Generator {
    fn generate(&self) -> Value;
}

/// Random integer generator over the closed interval `[min, max]`.
#[derive(Debug)]
pub struct RandInt {
    min: i64,
    max: i64,
}

impl RandInt {
    /// Fails with a configuration error when the interval is empty.
    pub fn new(min: i64, max: i64) -> Result<Self, MetamorphicError> {
        if min > max {
            return Err(MetamorphicError::configuration(format!(
                "RandInt interval is empty: min {min} is greater than max {max}"
            )));
        }
        Ok(Self { min, max })
    }
}

impl Generator for RandInt {
    fn generate(&self) -> Value {
        Value::Number(rand::thread_rng().gen_range(self.min..=self.max) as f64)
    }
}

/// Random float generator over the half-open interval `[min, max)`.
pub struct RandFloat {
    min: f64,
    max: f64,
}

impl RandFloat {
    /// Fails with a configuration error when the interval is empty.
    pub fn new(min: f64, max: f64) -> Result<Self, MetamorphicError> {
        if !(min < max) {
            return Err(MetamorphicError::configuration(format!(
                "RandFloat interval is empty: min {min} is not below max {max}"
            )));
        }
        Ok(Self { min, max })
    }
}

impl Generator for RandFloat {
    fn generate(&self) -> Value {
        Value::Number(rand::thread_rng().gen_range(self.min..self.max))
    }
}

fn wrap_triple(result: Value, kwargs: &ParamMap) -> Value {
    Value::List(vec![result, Value::Map(kwargs.clone()), Value::Bool(true)])
}

/// Wraps a single-source transform so `name` is always bound to `value`.
pub fn fixed_transform(name: impl Into<String>, value: Value, inner: TransformFn) -> TransformFn {
    let name = name.into();
    Arc::new(move |input, mut kwargs| {
        kwargs.insert(name.clone(), value.clone());
        let result = inner(input, kwargs.clone())?;
        Ok(wrap_triple(result, &kwargs))
    })
}

/// Wraps a single-source transform so `name` is bound to a freshly
/// generated value on every call.
pub fn randomized_transform(
    name: impl Into<String>,
    generator: Arc<dyn Generator>,
    inner: TransformFn,
) -> TransformFn {
    let name = name.into();
    Arc::new(move |input, mut kwargs| {
        kwargs.insert(name.clone(), generator.generate());
        let result = inner(input, kwargs.clone())?;
        Ok(wrap_triple(result, &kwargs))
    })
}

/// Wraps a general transform or general relation so `name` is always bound
/// to `value`.
pub fn fixed_general(
    name: impl Into<String>,
    value: Value,
    inner: GeneralTransformFn,
) -> GeneralTransformFn {
    let name = name.into();
    Arc::new(move |case, mut kwargs| {
        kwargs.insert(name.clone(), value.clone());
        let result = inner(case, kwargs.clone())?;
        Ok(wrap_triple(result, &kwargs))
    })
}

/// Wraps a general transform or general relation so `name` is bound to a
/// freshly generated value on every call.
pub fn randomized_general(
    name: impl Into<String>,
    generator: Arc<dyn Generator>,
    inner: GeneralTransformFn,
) -> GeneralTransformFn {
    let name = name.into();
    Arc::new(move |case, mut kwargs| {
        kwargs.insert(name.clone(), generator.generate());
        let result = inner(case, kwargs.clone())?;
        Ok(wrap_triple(result, &kwargs))
    })
}

/// Wraps a single-pair relation so `name` is always bound to `value`.
pub fn fixed_relation(name: impl Into<String>, value: Value, inner: RelationFn) -> RelationFn {
    let name = name.into();
    Arc::new(move |f_x, f_xt, mut kwargs| {
        kwargs.insert(name.clone(), value.clone());
        let result = inner(f_x, f_xt, kwargs.clone())?;
        Ok(wrap_triple(result, &kwargs))
    })
}

/// Wraps a single-pair relation so `name` is bound to a freshly generated
/// value on every call.
pub fn randomized_relation(
    name: impl Into<String>,
    generator: Arc<dyn Generator>,
    inner: RelationFn,
) -> RelationFn {
    let name = name.into();
    Arc::new(move |f_x, f_xt, mut kwargs| {
        kwargs.insert(name.clone(), generator.generate());
        let result = inner(f_x, f_xt, kwargs.clone())?;
        Ok(wrap_triple(result, &kwargs))
    })
}

/// A fully unwrapped transform/relation result.
#[derive(Debug, Clone, PartialEq)]
pub enum Unwrapped {
    /// The function was not wrapped; this is the genuine payload.
    Plain(Value),
    /// The innermost wrap triple: payload, complete keyword map, marker.
    Wrapped {
        value: Value,
        kwargs: ParamMap,
        parameterized: bool,
    },
}

impl Unwrapped {
    /// The payload regardless of wrapping.
    pub fn into_value(self) -> Value {
        match self {
            Unwrapped::Plain(v) => v,
            Unwrapped::Wrapped { value, .. } => value,
        }
    }
}

/// True if the value is recognizably a wrap triple: a 3-element list whose
/// last element is a Bool. See the module docs for the shape ambiguity this
/// heuristic carries.
pub fn is_wrapped(value: &Value) -> bool {
    match value {
        Value::List(items) => items.len() == 3 && matches!(items[2], Value::Bool(_)),
        _ => false,
    }
}

/// Recursively descends through nested wrap triples and returns the
/// innermost one, or the plain payload if the result was never wrapped.
/// Descent stops at the first value that is not recognizably a triple.
pub fn unwrap_result(result: Value) -> Unwrapped {
    if !is_wrapped(&result) {
        return Unwrapped::Plain(result);
    }

    let Value::List(items) = result else {
        unreachable!("is_wrapped only matches lists");
    };
    let mut items = items;
    let marker = items.pop().and_then(|v| v.as_bool());
    let kwargs_value = items.pop();
    let inner = items.pop().unwrap_or(Value::Nil);

    if is_wrapped(&inner) {
        return unwrap_result(inner);
    }

    let kwargs = match kwargs_value {
        Some(Value::Map(map)) => map,
        _ => ParamMap::new(),
    };
    Unwrapped::Wrapped {
        value: inner,
        kwargs,
        parameterized: marker.unwrap_or(false),
    }
}
