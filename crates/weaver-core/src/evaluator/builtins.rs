// Builtin functions callable from Weave code as `name(args)`
use anyhow::Result;
use tracing::debug;

use super::{
    advice::{AdviceKind, JoinPoint},
    errors::EvaluatorError,
    Runtime, Value,
};

fn expect_arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvaluatorError> {
    if args.len() != expected {
        return Err(EvaluatorError::arity(name, expected, args.len()));
    }
    Ok(())
}

pub(super) fn call(runtime: &Runtime, name: &str, mut args: Vec<Value>) -> Result<Value> {
    match name {
        "advise" => {
            expect_arity(name, &args, 3)?;
            let result = args.pop().unwrap_or(Value::Null);
            let ctx = args.pop().unwrap_or(Value::Null);
            let kind = match args.pop() {
                Some(Value::String(kind)) => AdviceKind::parse(&kind)
                    .ok_or_else(|| EvaluatorError::invalid(format!("unknown advice kind '{kind}'")))?,
                Some(other) => {
                    return Err(
                        EvaluatorError::unary_type_error("advise", "string", other.type_name()).into(),
                    )
                }
                None => return Err(EvaluatorError::arity(name, 3, 0).into()),
            };
            advise(runtime, kind, &ctx, result)
        }
        "len" => {
            expect_arity(name, &args, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                other => {
                    return Err(EvaluatorError::unary_type_error(
                        "len",
                        "string, list or map",
                        other.type_name(),
                    )
                    .into())
                }
            };
            Ok(Value::Integer(len as i64))
        }
        "str" => {
            expect_arity(name, &args, 1)?;
            Ok(Value::String(args[0].to_string()))
        }
        "print" => {
            let line = args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            runtime.emit(line);
            Ok(Value::Null)
        }
        "class_of" => {
            expect_arity(name, &args, 1)?;
            match &args[0] {
                Value::Object(obj) => Ok(Value::String(obj.class().name.to_string())),
                other => Err(
                    EvaluatorError::unary_type_error("class_of", "object", other.type_name()).into(),
                ),
            }
        }
        "type_of" => {
            expect_arity(name, &args, 1)?;
            Ok(Value::String(args[0].type_name().to_string()))
        }
        "keys" => {
            expect_arity(name, &args, 1)?;
            match &args[0] {
                Value::Map(map) => Ok(Value::List(
                    map.keys().map(|k| Value::String(k.clone())).collect(),
                )),
                other => {
                    Err(EvaluatorError::unary_type_error("keys", "map", other.type_name()).into())
                }
            }
        }
        _ => Err(EvaluatorError::FunctionNotFound(name.to_string()).into()),
    }
}

fn advise(runtime: &Runtime, kind: AdviceKind, ctx: &Value, result: Value) -> Result<Value> {
    let join_point = JoinPoint::from_context(ctx)?;
    let advice = runtime.advice();
    if advice.is_empty() {
        return Ok(match kind {
            AdviceKind::Before => Value::Null,
            AdviceKind::After => result,
        });
    }
    debug!(
        "Advising {:?} {}::{} with {} argument(s)",
        kind,
        join_point.class,
        join_point.method,
        join_point.args.len()
    );
    match kind {
        AdviceKind::Before => {
            advice
                .run_before(&join_point)
                .map_err(|e| EvaluatorError::Advice(e.to_string()))?;
            Ok(Value::Null)
        }
        AdviceKind::After => Ok(advice
            .run_after(&join_point, result)
            .map_err(|e| EvaluatorError::Advice(e.to_string()))?),
    }
}
