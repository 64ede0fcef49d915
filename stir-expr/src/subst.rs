//! Capture-free substitution under a two-scope binding environment.
//!
//! Rewriting is ownership-transferring reconstruction: every call returns a
//! newly owned tree. Environments are immutable maps extended or shrunk by
//! cloning, so recursion never shares mutable state with its caller.

use rustc_hash::FxHashMap;

use crate::expr::Expr;
use crate::names::Name;

/// Immutable name → replacement-expression map.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    map: FxHashMap<Name, Expr>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: Name, replacement: Expr) -> Self {
        self.map.insert(name, replacement);
        self
    }

    pub fn get(&self, name: &Name) -> Option<&Expr> {
        self.map.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn without(&self, name: &Name) -> Self {
        let mut out = self.clone();
        out.map.remove(name);
        out
    }
}

/// The two substitution scopes: ordinary evaluation and scan/aggregate.
///
/// [`Expr::Ref`] resolves in `eval`, [`Expr::ScanRef`] in `scan`. Names
/// absent from the active scope are left free.
#[derive(Clone, Debug, Default)]
pub struct BindingEnv {
    pub eval: Bindings,
    pub scan: Bindings,
}

impl BindingEnv {
    /// Bindings visible to ordinary references only.
    pub fn eval_only(bindings: Bindings) -> Self {
        Self {
            eval: bindings,
            scan: Bindings::new(),
        }
    }

    /// The same bindings visible to both ordinary and scan references.
    pub fn eval_and_scan(bindings: Bindings) -> Self {
        Self {
            eval: bindings.clone(),
            scan: bindings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.eval.is_empty() && self.scan.is_empty()
    }

    /// Drop `name` from both scopes: a binder shadows any outer binding.
    fn shadow(&self, name: &Name) -> Self {
        Self {
            eval: self.eval.without(name),
            scan: self.scan.without(name),
        }
    }

    fn shadow_row_and_global(&self) -> Self {
        self.shadow(&Name::row()).shadow(&Name::global())
    }
}

/// Rewrite `expr` under `env`, never capturing.
///
/// Every binder (a `Let`, an array combinator's binding, a distributed
/// collect's two names, and the implicit `row`/`global` binders of
/// table-operation expression children) shadows its name while its body is
/// rewritten, so locally re-bound names are never touched.
pub fn substitute(expr: Expr, env: &BindingEnv) -> Expr {
    if env.is_empty() {
        return expr;
    }
    match expr {
        Expr::Lit(_) | Expr::TableRange { .. } => expr,
        Expr::Ref(name) => match env.eval.get(&name) {
            Some(replacement) => replacement.clone(),
            None => Expr::Ref(name),
        },
        Expr::ScanRef(name) => match env.scan.get(&name) {
            Some(replacement) => replacement.clone(),
            None => Expr::ScanRef(name),
        },
        Expr::Let { name, value, body } => {
            let value = substitute(*value, env);
            let inner = env.shadow(&name);
            let body = substitute(*body, &inner);
            Expr::Let {
                name,
                value: Box::new(value),
                body: Box::new(body),
            }
        }
        Expr::MakeStruct(fields) => Expr::MakeStruct(
            fields
                .into_iter()
                .map(|(name, e)| (name, substitute(e, env)))
                .collect(),
        ),
        Expr::GetField { base, field } => Expr::GetField {
            base: Box::new(substitute(*base, env)),
            field,
        },
        Expr::InsertFields { base, fields } => Expr::InsertFields {
            base: Box::new(substitute(*base, env)),
            fields: fields
                .into_iter()
                .map(|(name, e)| (name, substitute(e, env)))
                .collect(),
        },
        Expr::MakeArray { elem_ty, elems } => Expr::MakeArray {
            elem_ty,
            elems: elems.into_iter().map(|e| substitute(e, env)).collect(),
        },
        Expr::ArrayRange { start, stop } => Expr::ArrayRange {
            start: Box::new(substitute(*start, env)),
            stop: Box::new(substitute(*stop, env)),
        },
        Expr::ArrayLen(array) => Expr::ArrayLen(Box::new(substitute(*array, env))),
        Expr::ArrayMap {
            array,
            binding,
            body,
        } => {
            let array = substitute(*array, env);
            let inner = env.shadow(&binding);
            let body = substitute(*body, &inner);
            Expr::ArrayMap {
                array: Box::new(array),
                binding,
                body: Box::new(body),
            }
        }
        Expr::ArrayFilter {
            array,
            binding,
            cond,
        } => {
            let array = substitute(*array, env);
            let inner = env.shadow(&binding);
            let cond = substitute(*cond, &inner);
            Expr::ArrayFilter {
                array: Box::new(array),
                binding,
                cond: Box::new(cond),
            }
        }
        Expr::ArrayFlatMap {
            array,
            binding,
            body,
        } => {
            let array = substitute(*array, env);
            let inner = env.shadow(&binding);
            let body = substitute(*body, &inner);
            Expr::ArrayFlatMap {
                array: Box::new(array),
                binding,
                body: Box::new(body),
            }
        }
        Expr::ArrayFold {
            array,
            zero,
            accum,
            value,
            body,
        } => {
            let array = substitute(*array, env);
            let zero = substitute(*zero, env);
            let inner = env.shadow(&accum).shadow(&value);
            let body = substitute(*body, &inner);
            Expr::ArrayFold {
                array: Box::new(array),
                zero: Box::new(zero),
                accum,
                value,
                body: Box::new(body),
            }
        }
        Expr::Cast { value, ty } => Expr::Cast {
            value: Box::new(substitute(*value, env)),
            ty,
        },
        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(substitute(*left, env)),
            op,
            right: Box::new(substitute(*right, env)),
        },
        Expr::Compare { left, op, right } => Expr::Compare {
            left: Box::new(substitute(*left, env)),
            op,
            right: Box::new(substitute(*right, env)),
        },
        Expr::CollectDistributedArray {
            contexts,
            globals,
            ctx_name,
            global_name,
            body,
        } => {
            let contexts = substitute(*contexts, env);
            let globals = substitute(*globals, env);
            let inner = env.shadow(&ctx_name).shadow(&global_name);
            let body = substitute(*body, &inner);
            Expr::CollectDistributedArray {
                contexts: Box::new(contexts),
                globals: Box::new(globals),
                ctx_name,
                global_name,
                body: Box::new(body),
            }
        }
        Expr::TableMapGlobals { child, new_globals } => {
            let child = substitute(*child, env);
            let inner = env.shadow(&Name::global());
            let new_globals = substitute(*new_globals, &inner);
            Expr::TableMapGlobals {
                child: Box::new(child),
                new_globals: Box::new(new_globals),
            }
        }
        Expr::TableFilter { child, cond } => {
            let child = substitute(*child, env);
            let inner = env.shadow_row_and_global();
            let cond = substitute(*cond, &inner);
            Expr::TableFilter {
                child: Box::new(child),
                cond: Box::new(cond),
            }
        }
        Expr::TableMapRows { child, new_row } => {
            let child = substitute(*child, env);
            let inner = env.shadow_row_and_global();
            let new_row = substitute(*new_row, &inner);
            Expr::TableMapRows {
                child: Box::new(child),
                new_row: Box::new(new_row),
            }
        }
        Expr::TableExplode { child, path } => Expr::TableExplode {
            child: Box::new(substitute(*child, env)),
            path,
        },
        Expr::TableDistinct { child } => Expr::TableDistinct {
            child: Box::new(substitute(*child, env)),
        },
        Expr::TableOrderBy { child, fields } => Expr::TableOrderBy {
            child: Box::new(substitute(*child, env)),
            fields,
        },
        Expr::TableCount(child) => Expr::TableCount(Box::new(substitute(*child, env))),
        Expr::TableGetGlobals(child) => Expr::TableGetGlobals(Box::new(substitute(*child, env))),
        Expr::TableCollect(child) => Expr::TableCollect(Box::new(substitute(*child, env))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(name: Name, replacement: Expr) -> BindingEnv {
        BindingEnv::eval_only(Bindings::new().bind(name, replacement))
    }

    #[test]
    fn replaces_bound_references() {
        let x = Name::new("x");
        let out = substitute(Expr::Ref(x.clone()), &env_of(x, Expr::i64(7)));
        assert_eq!(out, Expr::i64(7));
    }

    #[test]
    fn leaves_unbound_references_free() {
        let out = substitute(
            Expr::Ref(Name::new("y")),
            &env_of(Name::new("x"), Expr::i64(7)),
        );
        assert_eq!(out, Expr::Ref(Name::new("y")));
    }

    #[test]
    fn let_shadows_its_own_name() {
        let x = Name::new("x");
        // let x = x in x: the bound value sees the outer x, the body does not.
        let expr = Expr::let_in(x.clone(), Expr::Ref(x.clone()), Expr::Ref(x.clone()));
        let out = substitute(expr, &env_of(x.clone(), Expr::i64(1)));
        assert_eq!(out, Expr::let_in(x.clone(), Expr::i64(1), Expr::Ref(x)));
    }

    #[test]
    fn array_binder_shadows() {
        let x = Name::new("x");
        let expr = Expr::ArrayMap {
            array: Box::new(Expr::Ref(x.clone())),
            binding: x.clone(),
            body: Box::new(Expr::Ref(x.clone())),
        };
        let out = substitute(
            expr,
            &env_of(
                x.clone(),
                Expr::MakeArray {
                    elem_ty: crate::types::VType::Int64,
                    elems: vec![],
                },
            ),
        );
        match out {
            Expr::ArrayMap { array, body, .. } => {
                assert!(matches!(*array, Expr::MakeArray { .. }));
                assert_eq!(*body, Expr::Ref(x));
            }
            other => panic!("expected array_map, got {other:?}"),
        }
    }

    #[test]
    fn scan_references_resolve_in_the_scan_scope_only() {
        let x = Name::new("x");
        let eval_only = env_of(x.clone(), Expr::i64(1));
        assert_eq!(
            substitute(Expr::ScanRef(x.clone()), &eval_only),
            Expr::ScanRef(x.clone())
        );

        let both = BindingEnv::eval_and_scan(Bindings::new().bind(x.clone(), Expr::i64(1)));
        assert_eq!(substitute(Expr::ScanRef(x.clone()), &both), Expr::i64(1));
        assert_eq!(substitute(Expr::Ref(x), &both), Expr::i64(1));
    }

    #[test]
    fn table_filter_condition_shadows_row_and_global() {
        let cond = Expr::Compare {
            left: Box::new(Expr::get_field(Expr::Ref(Name::row()), "idx")),
            op: crate::expr::CompareOp::Lt,
            right: Box::new(Expr::get_field(Expr::Ref(Name::global()), "cutoff")),
        };
        let expr = Expr::TableFilter {
            child: Box::new(Expr::TableRange {
                count: 4,
                n_partitions: 1,
            }),
            cond: Box::new(cond.clone()),
        };
        let env = BindingEnv::eval_only(
            Bindings::new()
                .bind(Name::row(), Expr::i64(0))
                .bind(Name::global(), Expr::i64(0)),
        );
        match substitute(expr, &env) {
            Expr::TableFilter { cond: out, .. } => assert_eq!(*out, cond),
            other => panic!("expected table_filter, got {other:?}"),
        }
    }
}
