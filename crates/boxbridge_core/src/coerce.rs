//! Argument coercion for accessors whose declared parameter types differ from
//! the plain `i32` coordinates the engine works with.
//!
//! Every candidate gets at most two attempts: the arguments as given, then the
//! arguments narrowed or widened to the declared kinds. There is no loop.

use tracing::debug;

use crate::model::CallError;
use crate::value::{ParamKind, Scalar};

/// Converts `value` to the declared parameter kind.
///
/// Enum parameters go through their underlying integer type. Returns `None`
/// when the value does not fit or the parameter is not integer-like.
pub fn coerce(value: Scalar, target: ParamKind) -> Option<Scalar> {
    match target {
        ParamKind::Int(kind) => Scalar::of_kind(kind, value.as_i128()),
        ParamKind::Enum(repr) => Scalar::of_kind(repr, value.as_i128()).map(|s| Scalar::Enum {
            repr,
            raw: s.as_i64(),
        }),
        ParamKind::Record => None,
    }
}

/// One coercion pass over an argument list. Arguments that cannot be
/// converted are passed through unchanged so the retry reports the real
/// rejection.
pub fn coerce_args(args: &[Scalar], params: &[ParamKind]) -> Vec<Scalar> {
    let scalar_params = params.iter().copied().filter(|p| p.is_integer_like());
    args.iter()
        .zip(scalar_params.chain(std::iter::repeat(ParamKind::Record)))
        .map(|(arg, param)| coerce(*arg, param).unwrap_or(*arg))
        .collect()
}

/// Direct invocation, then exactly one coerced retry on a shape rejection.
pub fn invoke_coerced<T, F>(
    operation: &str,
    params: &[ParamKind],
    args: &[Scalar],
    mut call: F,
) -> Result<T, CallError>
where
    F: FnMut(&[Scalar]) -> Result<T, CallError>,
{
    match call(args) {
        Err(err) if err.is_shape_rejection() => {
            let coerced = coerce_args(args, params);
            debug!(
                target: "boxbridge::probe",
                operation,
                error = %err,
                "retrying with coerced arguments"
            );
            call(&coerced)
        }
        other => other,
    }
}
