//! Local realization of the distributed map primitive.

use stir_expr::Name;
use stir_lower::stage::TableStage;
use stir_result::{Error, Result};

use crate::interp::{eval, ValueEnv};
use crate::value::Value;

/// Execute `body` once per context, in context order.
///
/// This is the in-process counterpart of the primitive a distributed
/// backend provides: every invocation sees one context element plus the
/// shared broadcast value and nothing else. Because staged bodies are pure
/// and closed, a backend is free to evaluate them out of order, remotely,
/// or more than once under retry; this runner simply does the sequential
/// thing.
pub fn run<F>(contexts: Vec<Value>, broadcast: Value, body: F) -> Result<Vec<Value>>
where
    F: Fn(Value, Value) -> Result<Value>,
{
    let mut out = Vec::with_capacity(contexts.len());
    for context in contexts {
        out.push(body(context, broadcast.clone())?);
    }
    Ok(out)
}

/// Evaluate a staged plan: one row vector per partition, in partitioner
/// order.
pub fn execute_stage(stage: &TableStage) -> Result<Vec<Vec<Value>>> {
    let env = ValueEnv::default();
    let contexts = match eval(&stage.contexts, &env)? {
        Value::Array(contexts) => contexts,
        other => {
            return Err(Error::Internal(format!(
                "stage contexts evaluated to non-array value {other:?}"
            )))
        }
    };
    tracing::trace!(
        partitions = contexts.len(),
        key = %stage.partitioner.key_field,
        "executing staged plan"
    );
    let broadcast = eval(&stage.broadcast_vals, &env)?;

    let parts = run(contexts, broadcast, |context, global| {
        let mut body_env = ValueEnv::default();
        body_env.insert(Name::context(), context);
        body_env.insert(Name::global(), global);
        eval(&stage.body, &body_env)
    })?;

    parts
        .into_iter()
        .map(|part| match part {
            Value::Array(rows) => Ok(rows),
            other => Err(Error::Internal(format!(
                "partition body produced non-array value {other:?}"
            ))),
        })
        .collect()
}
