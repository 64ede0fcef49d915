//! The staged plan: the lowered physical form of one table-operation
//! subtree.

use stir_expr::{substitute, BindingEnv, Bindings, Expr, Name, NameGen, TypeEnv, VType};
use stir_result::{Error, Result};

/// Half-open interval `[start, end)` over the `Int64` key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInterval {
    pub start: i64,
    pub end: i64,
}

impl KeyInterval {
    pub fn len(&self) -> i64 {
        (self.end - self.start).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, key: i64) -> bool {
        self.start <= key && key < self.end
    }
}

/// Ordered sequence of disjoint, covering key intervals, one per
/// partition, in partition order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partitioner {
    pub key_field: String,
    pub intervals: Vec<KeyInterval>,
}

impl Partitioner {
    pub fn new(key_field: impl Into<String>, intervals: Vec<KeyInterval>) -> Self {
        Self {
            key_field: key_field.into(),
            intervals,
        }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// The lowered form of one table-operation subtree.
///
/// | field | meaning |
/// |---|---|
/// | `broadcast_vals` | expression producing a struct identical on every partition |
/// | `globals_field` | field of `broadcast_vals` holding the globals usable by continuations |
/// | `key_type` / `row_type` | physical key and row schema |
/// | `partitioner` | one key interval per partition |
/// | `context_type` | type of the per-partition input value |
/// | `contexts` | expression producing the per-partition context array, index-aligned with the partitioner |
/// | `body` | per-partition row producer; its only free variables are `context` and `global` |
///
/// A stage exists only transiently during lowering: it is either consumed
/// by a parent table operation or folded into a plain expression by a
/// whole-table consumer or by [`TableStage::collect_with`].
#[derive(Clone, Debug)]
pub struct TableStage {
    pub broadcast_vals: Expr,
    pub globals_field: String,
    pub key_type: VType,
    pub row_type: VType,
    pub partitioner: Partitioner,
    pub context_type: VType,
    pub contexts: Expr,
    pub body: Expr,
}

impl TableStage {
    /// Expression reading the current globals out of the broadcast value,
    /// as seen from inside a partition body.
    pub fn globals_ref(&self) -> Expr {
        Expr::get_field(Expr::Ref(Name::global()), self.globals_field.clone())
    }

    /// Type of the whole broadcast value. Broadcast expressions are closed,
    /// so no environment is needed.
    pub fn broadcast_type(&self) -> Result<VType> {
        self.broadcast_vals.vtype(&TypeEnv::default())
    }

    /// Type of the globals nested inside the broadcast value.
    pub fn globals_type(&self) -> Result<VType> {
        let broadcast_ty = self.broadcast_type()?;
        broadcast_ty
            .field(&self.globals_field)
            .cloned()
            .ok_or_else(|| {
                Error::Internal(format!(
                    "broadcast value has no `{}` field",
                    self.globals_field
                ))
            })
    }

    /// Replace the body, wrapping the previous one.
    pub fn with_body(self, wrap: impl FnOnce(Expr) -> Expr) -> Self {
        let TableStage {
            broadcast_vals,
            globals_field,
            key_type,
            row_type,
            partitioner,
            context_type,
            contexts,
            body,
        } = self;
        TableStage {
            broadcast_vals,
            globals_field,
            key_type,
            row_type,
            partitioner,
            context_type,
            contexts,
            body: wrap(body),
        }
    }

    /// The body-transform hook: fold this stage into a plain expression.
    ///
    /// The body's `context`/`global` free variables are re-bound to two
    /// fresh names before `transform` wraps it, so collects nested inside
    /// other lowered expressions can never capture each other's bindings.
    pub fn collect_with(
        self,
        names: &NameGen,
        transform: impl FnOnce(Expr) -> Expr,
    ) -> Expr {
        let ctx = names.fresh("context");
        let global = names.fresh("global");
        let env = BindingEnv::eval_only(
            Bindings::new()
                .bind(Name::context(), Expr::Ref(ctx.clone()))
                .bind(Name::global(), Expr::Ref(global.clone())),
        );
        let body = transform(substitute(self.body, &env));
        Expr::CollectDistributedArray {
            contexts: Box::new(self.contexts),
            globals: Box::new(self.broadcast_vals),
            ctx_name: ctx,
            global_name: global,
            body: Box::new(body),
        }
    }

    /// [`TableStage::collect_with`] with the identity transform: an array
    /// of per-partition row arrays, in partitioner order.
    pub fn collect(self, names: &NameGen) -> Expr {
        self.collect_with(names, |body| body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_length_and_membership() {
        let iv = KeyInterval { start: 3, end: 7 };
        assert_eq!(iv.len(), 4);
        assert!(!iv.is_empty());
        assert!(iv.contains(3));
        assert!(iv.contains(6));
        assert!(!iv.contains(7));

        let empty = KeyInterval { start: 5, end: 5 };
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
    }
}
