//! Tree-walking reference interpreter for lowered expressions.

use rustc_hash::FxHashMap;

use stir_expr::{BinaryOp, CompareOp, Expr, Literal, Name, VType};
use stir_result::{Error, Result};

use crate::value::Value;

/// Name → value environment for evaluation.
pub type ValueEnv = FxHashMap<Name, Value>;

/// Evaluate a lowered (table-free) expression.
///
/// Un-lowered table operations and unbound references are `Internal`
/// errors; arithmetic overflow and modulo by zero abort evaluation rather
/// than panic.
pub fn eval(expr: &Expr, env: &ValueEnv) -> Result<Value> {
    match expr {
        Expr::Lit(Literal::Int32(v)) => Ok(Value::Int32(*v)),
        Expr::Lit(Literal::Int64(v)) => Ok(Value::Int64(*v)),
        Expr::Lit(Literal::Bool(v)) => Ok(Value::Bool(*v)),
        Expr::Ref(name) | Expr::ScanRef(name) => env.get(name).cloned().ok_or_else(|| {
            Error::Internal(format!("unbound reference `{name}` at evaluation time"))
        }),
        Expr::Let { name, value, body } => {
            let value = eval(value, env)?;
            let mut inner = env.clone();
            inner.insert(name.clone(), value);
            eval(body, &inner)
        }
        Expr::MakeStruct(fields) => Ok(Value::Struct(
            fields
                .iter()
                .map(|(name, e)| Ok((name.clone(), eval(e, env)?)))
                .collect::<Result<Vec<_>>>()?,
        )),
        Expr::GetField { base, field } => match eval(base, env)? {
            Value::Struct(fields) => fields
                .into_iter()
                .find(|(name, _)| name == field)
                .map(|(_, v)| v)
                .ok_or_else(|| Error::Internal(format!("struct has no field `{field}`"))),
            other => Err(Error::Type(format!(
                "get_field on non-struct value {other:?}"
            ))),
        },
        Expr::InsertFields { base, fields } => {
            let Value::Struct(mut out) = eval(base, env)? else {
                return Err(Error::Type("insert_fields on non-struct value".to_string()));
            };
            for (name, e) in fields {
                let value = eval(e, env)?;
                if let Some(slot) = out.iter_mut().find(|(existing, _)| *existing == *name) {
                    slot.1 = value;
                } else {
                    out.push((name.clone(), value));
                }
            }
            Ok(Value::Struct(out))
        }
        Expr::MakeArray { elems, .. } => Ok(Value::Array(
            elems.iter().map(|e| eval(e, env)).collect::<Result<_>>()?,
        )),
        Expr::ArrayRange { start, stop } => {
            let start = eval_i64(start, env)?;
            let stop = eval_i64(stop, env)?;
            Ok(Value::Array((start..stop).map(Value::Int64).collect()))
        }
        Expr::ArrayLen(array) => {
            let elems = eval_array(array, env)?;
            i32::try_from(elems.len())
                .map(Value::Int32)
                .map_err(|_| Error::Internal("array length exceeds Int32".to_string()))
        }
        Expr::ArrayMap {
            array,
            binding,
            body,
        } => {
            let elems = eval_array(array, env)?;
            let mut out = Vec::with_capacity(elems.len());
            for elem in elems {
                let mut inner = env.clone();
                inner.insert(binding.clone(), elem);
                out.push(eval(body, &inner)?);
            }
            Ok(Value::Array(out))
        }
        Expr::ArrayFilter {
            array,
            binding,
            cond,
        } => {
            let elems = eval_array(array, env)?;
            let mut out = Vec::new();
            for elem in elems {
                let mut inner = env.clone();
                inner.insert(binding.clone(), elem.clone());
                if eval_bool(cond, &inner)? {
                    out.push(elem);
                }
            }
            Ok(Value::Array(out))
        }
        Expr::ArrayFlatMap {
            array,
            binding,
            body,
        } => {
            let elems = eval_array(array, env)?;
            let mut out = Vec::new();
            for elem in elems {
                let mut inner = env.clone();
                inner.insert(binding.clone(), elem);
                match eval(body, &inner)? {
                    Value::Array(produced) => out.extend(produced),
                    other => {
                        return Err(Error::Type(format!(
                            "array_flat_map body produced non-array value {other:?}"
                        )))
                    }
                }
            }
            Ok(Value::Array(out))
        }
        Expr::ArrayFold {
            array,
            zero,
            accum,
            value,
            body,
        } => {
            let elems = eval_array(array, env)?;
            let mut acc = eval(zero, env)?;
            for elem in elems {
                let mut inner = env.clone();
                inner.insert(accum.clone(), acc);
                inner.insert(value.clone(), elem);
                acc = eval(body, &inner)?;
            }
            Ok(acc)
        }
        Expr::Cast { value, ty } => cast_value(eval(value, env)?, ty),
        Expr::Binary { left, op, right } => {
            let left = eval(left, env)?;
            let right = eval(right, env)?;
            eval_binary(*op, left, right)
        }
        Expr::Compare { left, op, right } => {
            let left = eval(left, env)?;
            let right = eval(right, env)?;
            eval_compare(*op, left, right)
        }
        Expr::CollectDistributedArray {
            contexts,
            globals,
            ctx_name,
            global_name,
            body,
        } => {
            let contexts = eval_array(contexts, env)?;
            let globals = eval(globals, env)?;
            let parts = crate::runner::run(contexts, globals, |context, global| {
                // A partition body sees exactly its two bindings.
                let mut body_env = ValueEnv::default();
                body_env.insert(ctx_name.clone(), context);
                body_env.insert(global_name.clone(), global);
                eval(body, &body_env)
            })?;
            Ok(Value::Array(parts))
        }
        other => Err(Error::Internal(format!(
            "cannot evaluate table operation `{}`; lower it first",
            other.kind_name()
        ))),
    }
}

fn eval_i64(expr: &Expr, env: &ValueEnv) -> Result<i64> {
    match eval(expr, env)? {
        Value::Int64(v) => Ok(v),
        other => Err(Error::Type(format!("expected Int64, got {other:?}"))),
    }
}

fn eval_bool(expr: &Expr, env: &ValueEnv) -> Result<bool> {
    match eval(expr, env)? {
        Value::Bool(v) => Ok(v),
        other => Err(Error::Type(format!("expected Bool, got {other:?}"))),
    }
}

fn eval_array(expr: &Expr, env: &ValueEnv) -> Result<Vec<Value>> {
    match eval(expr, env)? {
        Value::Array(elems) => Ok(elems),
        other => Err(Error::Type(format!("expected an array, got {other:?}"))),
    }
}

fn cast_value(value: Value, ty: &VType) -> Result<Value> {
    match (value, ty) {
        (Value::Int32(v), VType::Int64) => Ok(Value::Int64(i64::from(v))),
        (Value::Int64(v), VType::Int32) => i32::try_from(v)
            .map(Value::Int32)
            .map_err(|_| Error::Internal(format!("cast overflow: {v} does not fit in Int32"))),
        (value @ Value::Int32(_), VType::Int32)
        | (value @ Value::Int64(_), VType::Int64)
        | (value @ Value::Bool(_), VType::Bool) => Ok(value),
        (value, ty) => Err(Error::Type(format!(
            "unsupported cast of {value:?} to {ty:?}"
        ))),
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match (left, right) {
        (Value::Int32(a), Value::Int32(b)) => apply_i32(op, a, b).map(Value::Int32),
        (Value::Int64(a), Value::Int64(b)) => apply_i64(op, a, b).map(Value::Int64),
        (left, right) => Err(Error::Type(format!(
            "mismatched operands for `{op}`: {left:?} vs {right:?}"
        ))),
    }
}

fn apply_i32(op: BinaryOp, a: i32, b: i32) -> Result<i32> {
    let out = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Modulo => {
            if b == 0 {
                return Err(Error::Internal("modulo by zero".to_string()));
            }
            a.checked_rem(b)
        }
    };
    out.ok_or_else(|| Error::Internal(format!("integer overflow in `{a} {op} {b}`")))
}

fn apply_i64(op: BinaryOp, a: i64, b: i64) -> Result<i64> {
    let out = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Modulo => {
            if b == 0 {
                return Err(Error::Internal("modulo by zero".to_string()));
            }
            a.checked_rem(b)
        }
    };
    out.ok_or_else(|| Error::Internal(format!("integer overflow in `{a} {op} {b}`")))
}

fn eval_compare(op: CompareOp, left: Value, right: Value) -> Result<Value> {
    let ordering = match (&left, &right) {
        (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
        (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => {
            return Err(Error::Type(format!(
                "mismatched operands for `{op}`: {left:?} vs {right:?}"
            )))
        }
    };
    use std::cmp::Ordering;
    let holds = match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::LtEq => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::GtEq => ordering != Ordering::Less,
    };
    Ok(Value::Bool(holds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_closed(expr: &Expr) -> Value {
        eval(expr, &ValueEnv::default()).unwrap()
    }

    #[test]
    fn evaluates_ranges_and_folds() {
        let xs = Expr::ArrayRange {
            start: Box::new(Expr::i64(0)),
            stop: Box::new(Expr::i64(5)),
        };
        assert_eq!(
            eval_closed(&Expr::ArrayLen(Box::new(xs.clone()))),
            Value::Int32(5)
        );

        let acc = Name::new("acc");
        let x = Name::new("x");
        let sum = Expr::ArrayFold {
            array: Box::new(xs),
            zero: Box::new(Expr::i64(0)),
            accum: acc.clone(),
            value: x.clone(),
            body: Box::new(Expr::Binary {
                left: Box::new(Expr::Ref(acc)),
                op: BinaryOp::Add,
                right: Box::new(Expr::Ref(x)),
            }),
        };
        assert_eq!(eval_closed(&sum), Value::Int64(10));
    }

    #[test]
    fn empty_range_when_stop_is_not_after_start() {
        let xs = Expr::ArrayRange {
            start: Box::new(Expr::i64(3)),
            stop: Box::new(Expr::i64(3)),
        };
        assert_eq!(eval_closed(&xs), Value::Array(Vec::new()));
    }

    #[test]
    fn insert_fields_replaces_and_appends() {
        let expr = Expr::InsertFields {
            base: Box::new(Expr::MakeStruct(vec![
                ("a".to_string(), Expr::i64(1)),
                ("b".to_string(), Expr::i64(2)),
            ])),
            fields: vec![
                ("b".to_string(), Expr::i64(20)),
                ("c".to_string(), Expr::i64(3)),
            ],
        };
        assert_eq!(
            eval_closed(&expr),
            Value::Struct(vec![
                ("a".to_string(), Value::Int64(1)),
                ("b".to_string(), Value::Int64(20)),
                ("c".to_string(), Value::Int64(3)),
            ])
        );
    }

    #[test]
    fn distributed_collect_restricts_the_body_environment() {
        // The body references a name bound outside the collect; bodies only
        // see their two bindings, so evaluation must fail.
        let leaked = Name::new("leaked");
        let collect = Expr::CollectDistributedArray {
            contexts: Box::new(Expr::MakeArray {
                elem_ty: VType::Int64,
                elems: vec![Expr::i64(0)],
            }),
            globals: Box::new(Expr::MakeStruct(Vec::new())),
            ctx_name: Name::new("c"),
            global_name: Name::new("g"),
            body: Box::new(Expr::Ref(leaked.clone())),
        };
        let mut env = ValueEnv::default();
        env.insert(leaked, Value::Int64(1));
        let err = eval(&collect, &env).unwrap_err();
        assert!(matches!(err, Error::Internal(_)), "got {err:?}");
    }

    #[test]
    fn modulo_by_zero_is_an_error_not_a_panic() {
        let expr = Expr::Binary {
            left: Box::new(Expr::i64(1)),
            op: BinaryOp::Modulo,
            right: Box::new(Expr::i64(0)),
        };
        assert!(eval(&expr, &ValueEnv::default()).is_err());
    }

    #[test]
    fn unlowered_table_operations_cannot_be_evaluated() {
        let expr = Expr::TableCount(Box::new(Expr::TableRange {
            count: 3,
            n_partitions: 1,
        }));
        let err = eval(&expr, &ValueEnv::default()).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
