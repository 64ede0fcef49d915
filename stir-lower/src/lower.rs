//! Recursive lowering of table operations into staged plans.
//!
//! [`Lowerer::lower`] walks a value-level expression, folding each
//! whole-table consumer (count, get-globals, collect) into a plain
//! expression; [`Lowerer::lower_stage`] dispatches over the recognized
//! table operations and produces a [`TableStage`]. Table-valued subtrees
//! are only ever touched by an explicit case here; a non-table node with a
//! table-valued child outside the consumer set fails rather than being
//! silently recursed into.

use stir_expr::{
    substitute, BindingEnv, Bindings, BinaryOp, Expr, Name, NameGen, TypeEnv, VType,
};
use stir_result::{Error, Result};

use crate::partition::{clamp_partitions, partition};
use crate::stage::{KeyInterval, Partitioner, TableStage};

/// Name of the integer key column produced by range sources.
pub const RANGE_KEY: &str = "idx";

/// One lowering invocation. Holds the fresh-name generator every rewrite
/// draws from; sharing one generator across the whole pass is what makes
/// the produced names collision-free.
pub struct Lowerer<'a> {
    names: &'a NameGen,
}

impl<'a> Lowerer<'a> {
    pub fn new(names: &'a NameGen) -> Self {
        Self { names }
    }

    /// Lower a value-level expression, converting every table-valued
    /// subtree reachable through a whole-table consumer into a plain
    /// expression.
    pub fn lower(&self, expr: Expr) -> Result<Expr> {
        match expr {
            Expr::TableCount(child) => self.lower_count(*child),
            Expr::TableGetGlobals(child) => self.lower_get_globals(*child),
            Expr::TableCollect(child) => self.lower_collect(*child),
            other if other.is_table_op() => Err(Error::UnsupportedLowering(format!(
                "table-valued expression in value position: {other}"
            ))),
            other => {
                if let Some(child) = other.children().into_iter().find(|c| c.is_table_op()) {
                    return Err(Error::UnsupportedLowering(format!(
                        "`{}` has a table-valued child: {child}",
                        other.kind_name()
                    )));
                }
                self.lower_children(other)
            }
        }
    }

    /// Lower a table-valued expression into its staged plan.
    pub fn lower_stage(&self, expr: Expr) -> Result<TableStage> {
        tracing::trace!(node = expr.kind_name(), "lowering table operation");
        match expr {
            Expr::TableRange {
                count,
                n_partitions,
            } => Ok(self.lower_range(count, n_partitions)),
            Expr::TableMapGlobals { child, new_globals } => {
                self.lower_map_globals(*child, *new_globals)
            }
            Expr::TableFilter { child, cond } => self.lower_filter(*child, *cond),
            Expr::TableMapRows { child, new_row } => self.lower_map_rows(*child, *new_row),
            Expr::TableExplode { child, path } => self.lower_explode(*child, path),
            other if other.is_table_op() => Err(Error::UnsupportedLowering(format!(
                "unrecognized table operation: {other}"
            ))),
            other => Err(Error::Internal(format!(
                "lower_stage called on value expression `{}`",
                other.kind_name()
            ))),
        }
    }

    fn lower_range(&self, count: usize, requested: usize) -> TableStage {
        let k = clamp_partitions(count, requested);
        let sizes = partition(count, k);

        let mut intervals = Vec::with_capacity(sizes.len());
        let mut contexts = Vec::with_capacity(sizes.len());
        let mut start = 0i64;
        for size in sizes {
            let end = start + size as i64;
            intervals.push(KeyInterval { start, end });
            contexts.push(Expr::MakeStruct(vec![
                ("start".to_string(), Expr::i64(start)),
                ("end".to_string(), Expr::i64(end)),
            ]));
            start = end;
        }

        let context_type = VType::struct_of([("start", VType::Int64), ("end", VType::Int64)]);
        let row_type = VType::struct_of([(RANGE_KEY, VType::Int64)]);

        let globals_field = self.names.fresh("globals").into_string();
        let broadcast_vals = Expr::MakeStruct(vec![(
            globals_field.clone(),
            Expr::MakeStruct(Vec::new()),
        )]);

        let i = self.names.fresh("i");
        let body = Expr::ArrayMap {
            array: Box::new(Expr::ArrayRange {
                start: Box::new(Expr::get_field(Expr::Ref(Name::context()), "start")),
                stop: Box::new(Expr::get_field(Expr::Ref(Name::context()), "end")),
            }),
            binding: i.clone(),
            body: Box::new(Expr::MakeStruct(vec![(
                RANGE_KEY.to_string(),
                Expr::Ref(i),
            )])),
        };

        TableStage {
            broadcast_vals,
            globals_field,
            key_type: row_type.clone(),
            row_type,
            partitioner: Partitioner::new(RANGE_KEY, intervals),
            context_type: context_type.clone(),
            contexts: Expr::MakeArray {
                elem_ty: context_type,
                elems: contexts,
            },
            body,
        }
    }

    fn lower_map_globals(&self, child: Expr, new_globals: Expr) -> Result<TableStage> {
        let stage = self.lower_stage(child)?;
        let new_globals = self.lower(new_globals)?;

        let TableStage {
            broadcast_vals,
            globals_field,
            key_type,
            row_type,
            partitioner,
            context_type,
            contexts,
            body,
        } = stage;

        let bound = self.names.fresh("broadcast");
        let field = self.names.fresh("globals").into_string();
        let env = BindingEnv::eval_only(Bindings::new().bind(
            Name::global(),
            Expr::get_field(Expr::Ref(bound.clone()), globals_field),
        ));
        let rewritten = substitute(new_globals, &env);

        // The previous broadcast fields are retained, so every ancestor's
        // globals remain reachable from the new value.
        let broadcast_vals = Expr::Let {
            name: bound.clone(),
            value: Box::new(broadcast_vals),
            body: Box::new(Expr::InsertFields {
                base: Box::new(Expr::Ref(bound)),
                fields: vec![(field.clone(), rewritten)],
            }),
        };

        Ok(TableStage {
            broadcast_vals,
            globals_field: field,
            key_type,
            row_type,
            partitioner,
            context_type,
            contexts,
            body,
        })
    }

    fn lower_filter(&self, child: Expr, cond: Expr) -> Result<TableStage> {
        let stage = self.lower_stage(child)?;
        let cond = self.lower(cond)?;

        let row = self.names.fresh("row");
        let env = BindingEnv::eval_only(
            Bindings::new()
                .bind(Name::row(), Expr::Ref(row.clone()))
                .bind(Name::global(), stage.globals_ref()),
        );
        let cond = substitute(cond, &env);

        Ok(stage.with_body(|body| Expr::ArrayFilter {
            array: Box::new(body),
            binding: row,
            cond: Box::new(cond),
        }))
    }

    fn lower_map_rows(&self, child: Expr, new_row: Expr) -> Result<TableStage> {
        let stage = self.lower_stage(child)?;
        let new_row = self.lower(new_row)?;

        let row = self.names.fresh("row");
        // Row-mapping expressions may reference scan-scoped names; they see
        // the same row and globals as ordinary references.
        let env = BindingEnv::eval_and_scan(
            Bindings::new()
                .bind(Name::row(), Expr::Ref(row.clone()))
                .bind(Name::global(), stage.globals_ref()),
        );
        let new_row = substitute(new_row, &env);

        let mut type_env = TypeEnv::default();
        type_env.insert(row.clone(), stage.row_type.clone());
        type_env.insert(Name::global(), stage.broadcast_type()?);
        let row_type = new_row.vtype(&type_env)?;

        let mut stage = stage.with_body(|body| Expr::ArrayMap {
            array: Box::new(body),
            binding: row,
            body: Box::new(new_row),
        });
        stage.row_type = row_type;
        Ok(stage)
    }

    fn lower_explode(&self, child: Expr, path: Vec<String>) -> Result<TableStage> {
        if path.is_empty() {
            return Err(Error::UnsupportedLowering(
                "explode with an empty field path".to_string(),
            ));
        }
        let stage = self.lower_stage(child)?;

        let row = self.names.fresh("row");
        let elt = self.names.fresh("elt");

        // One reference per path level; level 0 is the row itself.
        let mut level_refs = vec![row.clone()];
        for _ in 1..path.len() {
            level_refs.push(self.names.fresh("nested"));
        }

        // The exploded container, reached from the row through `path`.
        let field_ref = path
            .iter()
            .fold(Expr::Ref(row.clone()), |base, field| {
                Expr::get_field(base, field.clone())
            });

        // Rebuild the row from the innermost field outward. Each level
        // `Let`-binds the original sub-struct once, so the rewritten inner
        // value never recomputes shared structure.
        let last = path.len() - 1;
        let mut new_row = Expr::InsertFields {
            base: Box::new(Expr::Ref(level_refs[last].clone())),
            fields: vec![(path[last].clone(), Expr::Ref(elt.clone()))],
        };
        for depth in (0..last).rev() {
            new_row = Expr::InsertFields {
                base: Box::new(Expr::Ref(level_refs[depth].clone())),
                fields: vec![(
                    path[depth].clone(),
                    Expr::Let {
                        name: level_refs[depth + 1].clone(),
                        value: Box::new(Expr::get_field(
                            Expr::Ref(level_refs[depth].clone()),
                            path[depth].clone(),
                        )),
                        body: Box::new(new_row),
                    },
                )],
            };
        }

        let row_type = exploded_row_type(&stage.row_type, &path)?;

        let mut stage = stage.with_body(|body| Expr::ArrayFlatMap {
            array: Box::new(body),
            binding: row,
            body: Box::new(Expr::ArrayMap {
                array: Box::new(field_ref),
                binding: elt,
                body: Box::new(new_row),
            }),
        });
        stage.row_type = row_type;
        Ok(stage)
    }

    fn lower_count(&self, child: Expr) -> Result<Expr> {
        let stage = self.lower_stage(child)?;
        // Partition lengths are Int32; widen before summing so large tables
        // cannot overflow the reduction.
        let counts = stage.collect_with(self.names, |body| Expr::Cast {
            value: Box::new(Expr::ArrayLen(Box::new(body))),
            ty: VType::Int64,
        });
        let accum = self.names.fresh("acc");
        let value = self.names.fresh("n");
        Ok(Expr::ArrayFold {
            array: Box::new(counts),
            zero: Box::new(Expr::i64(0)),
            accum: accum.clone(),
            value: value.clone(),
            body: Box::new(Expr::Binary {
                left: Box::new(Expr::Ref(accum)),
                op: BinaryOp::Add,
                right: Box::new(Expr::Ref(value)),
            }),
        })
    }

    fn lower_get_globals(&self, child: Expr) -> Result<Expr> {
        let TableStage {
            broadcast_vals,
            globals_field,
            ..
        } = self.lower_stage(child)?;
        Ok(Expr::GetField {
            base: Box::new(broadcast_vals),
            field: globals_field,
        })
    }

    fn lower_collect(&self, child: Expr) -> Result<Expr> {
        let mut stage = self.lower_stage(child)?;
        let globals_field = stage.globals_field.clone();

        // Bind the broadcast once: it is both the collect's shared value and
        // the source of the result's `global` field.
        let bound = self.names.fresh("broadcast");
        let broadcast = std::mem::replace(&mut stage.broadcast_vals, Expr::Ref(bound.clone()));
        let parts = stage.collect(self.names);

        let part = self.names.fresh("part");
        let rows = Expr::ArrayFlatMap {
            array: Box::new(parts),
            binding: part.clone(),
            body: Box::new(Expr::Ref(part)),
        };
        Ok(Expr::let_in(
            bound.clone(),
            broadcast,
            Expr::MakeStruct(vec![
                ("rows".to_string(), rows),
                (
                    "global".to_string(),
                    Expr::get_field(Expr::Ref(bound), globals_field),
                ),
            ]),
        ))
    }

    /// Structural recursion for nodes with no table-valued direct child.
    fn lower_children(&self, expr: Expr) -> Result<Expr> {
        Ok(match expr {
            leaf @ (Expr::Lit(_) | Expr::Ref(_) | Expr::ScanRef(_)) => leaf,
            Expr::Let { name, value, body } => Expr::Let {
                name,
                value: Box::new(self.lower(*value)?),
                body: Box::new(self.lower(*body)?),
            },
            Expr::MakeStruct(fields) => Expr::MakeStruct(
                fields
                    .into_iter()
                    .map(|(name, e)| Ok((name, self.lower(e)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Expr::GetField { base, field } => Expr::GetField {
                base: Box::new(self.lower(*base)?),
                field,
            },
            Expr::InsertFields { base, fields } => Expr::InsertFields {
                base: Box::new(self.lower(*base)?),
                fields: fields
                    .into_iter()
                    .map(|(name, e)| Ok((name, self.lower(e)?)))
                    .collect::<Result<Vec<_>>>()?,
            },
            Expr::MakeArray { elem_ty, elems } => Expr::MakeArray {
                elem_ty,
                elems: elems
                    .into_iter()
                    .map(|e| self.lower(e))
                    .collect::<Result<Vec<_>>>()?,
            },
            Expr::ArrayRange { start, stop } => Expr::ArrayRange {
                start: Box::new(self.lower(*start)?),
                stop: Box::new(self.lower(*stop)?),
            },
            Expr::ArrayLen(array) => Expr::ArrayLen(Box::new(self.lower(*array)?)),
            Expr::ArrayMap {
                array,
                binding,
                body,
            } => Expr::ArrayMap {
                array: Box::new(self.lower(*array)?),
                binding,
                body: Box::new(self.lower(*body)?),
            },
            Expr::ArrayFilter {
                array,
                binding,
                cond,
            } => Expr::ArrayFilter {
                array: Box::new(self.lower(*array)?),
                binding,
                cond: Box::new(self.lower(*cond)?),
            },
            Expr::ArrayFlatMap {
                array,
                binding,
                body,
            } => Expr::ArrayFlatMap {
                array: Box::new(self.lower(*array)?),
                binding,
                body: Box::new(self.lower(*body)?),
            },
            Expr::ArrayFold {
                array,
                zero,
                accum,
                value,
                body,
            } => Expr::ArrayFold {
                array: Box::new(self.lower(*array)?),
                zero: Box::new(self.lower(*zero)?),
                accum,
                value,
                body: Box::new(self.lower(*body)?),
            },
            Expr::Cast { value, ty } => Expr::Cast {
                value: Box::new(self.lower(*value)?),
                ty,
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(self.lower(*left)?),
                op,
                right: Box::new(self.lower(*right)?),
            },
            Expr::Compare { left, op, right } => Expr::Compare {
                left: Box::new(self.lower(*left)?),
                op,
                right: Box::new(self.lower(*right)?),
            },
            Expr::CollectDistributedArray {
                contexts,
                globals,
                ctx_name,
                global_name,
                body,
            } => Expr::CollectDistributedArray {
                contexts: Box::new(self.lower(*contexts)?),
                globals: Box::new(self.lower(*globals)?),
                ctx_name,
                global_name,
                body: Box::new(self.lower(*body)?),
            },
            other => {
                // Table nodes are dispatched by `lower` before recursion
                // reaches this point.
                return Err(Error::Internal(format!(
                    "structural recursion reached table node `{}`",
                    other.kind_name()
                )));
            }
        })
    }
}

fn exploded_row_type(ty: &VType, path: &[String]) -> Result<VType> {
    let Some((field, rest)) = path.split_first() else {
        return Err(Error::Internal("empty explode path".to_string()));
    };
    let VType::Struct(fields) = ty else {
        return Err(Error::Type(format!(
            "explode path traverses non-struct type {ty:?}"
        )));
    };
    let mut out = fields.clone();
    let slot = out
        .iter_mut()
        .find(|f| f.name == *field)
        .ok_or_else(|| Error::Type(format!("explode path names missing field `{field}`")))?;
    slot.ty = if rest.is_empty() {
        match &slot.ty {
            VType::Array(elem) => (**elem).clone(),
            other => {
                return Err(Error::Type(format!(
                    "exploded field `{field}` is not an array (found {other:?})"
                )))
            }
        }
    } else {
        exploded_row_type(&slot.ty, rest)?
    };
    Ok(VType::Struct(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    fn range(count: usize, n_partitions: usize) -> Expr {
        Expr::TableRange {
            count,
            n_partitions,
        }
    }

    #[test]
    fn range_partitioner_covers_the_key_space() {
        let names = NameGen::new();
        let lowerer = Lowerer::new(&names);
        for (n, requested) in [(10, 3), (0, 1), (0, 7), (1, 5), (12, 4), (100, 8)] {
            let stage = lowerer.lower_stage(range(n, requested)).unwrap();
            let expected = clamp_partitions(n, requested);
            assert_eq!(stage.partitioner.len(), expected);
            assert_eq!(stage.partitioner.key_field, RANGE_KEY);

            let mut cursor = 0i64;
            for interval in &stage.partitioner.intervals {
                assert_eq!(interval.start, cursor, "intervals must be contiguous");
                assert!(interval.end >= interval.start);
                cursor = interval.end;
            }
            assert_eq!(cursor, n as i64, "intervals must cover [0, n)");
        }
    }

    #[test]
    fn range_contexts_align_with_intervals() {
        let names = NameGen::new();
        let stage = Lowerer::new(&names).lower_stage(range(10, 3)).unwrap();
        let Expr::MakeArray { elems, .. } = &stage.contexts else {
            panic!("contexts should be a literal array, got {}", stage.contexts);
        };
        assert_eq!(elems.len(), stage.partitioner.len());
        for (context, interval) in elems.iter().zip(&stage.partitioner.intervals) {
            assert_eq!(
                *context,
                Expr::MakeStruct(vec![
                    ("start".to_string(), Expr::i64(interval.start)),
                    ("end".to_string(), Expr::i64(interval.end)),
                ])
            );
        }
    }

    #[test]
    fn count_lowers_to_a_sum_over_partition_lengths() {
        let names = NameGen::new();
        let lowered = Lowerer::new(&names)
            .lower(Expr::TableCount(Box::new(range(10, 3))))
            .unwrap();
        let Expr::ArrayFold { array, zero, .. } = lowered else {
            panic!("expected array_fold");
        };
        assert_eq!(*zero, Expr::i64(0));
        let Expr::CollectDistributedArray { body, .. } = *array else {
            panic!("expected collect_distributed_array under the fold");
        };
        assert!(
            matches!(*body, Expr::Cast { ty: VType::Int64, .. }),
            "partition counts must be widened before the sum"
        );
    }

    #[test]
    fn get_globals_skips_partition_execution() {
        let names = NameGen::new();
        let lowered = Lowerer::new(&names)
            .lower(Expr::TableGetGlobals(Box::new(range(10, 3))))
            .unwrap();
        assert!(matches!(lowered, Expr::GetField { .. }));
        fn contains_collect(expr: &Expr) -> bool {
            matches!(expr, Expr::CollectDistributedArray { .. })
                || expr.children().iter().any(|c| contains_collect(c))
        }
        assert!(!contains_collect(&lowered));
    }

    #[test]
    fn unrecognized_table_operation_fails() {
        let names = NameGen::new();
        let err = Lowerer::new(&names)
            .lower_stage(Expr::TableDistinct {
                child: Box::new(range(4, 2)),
            })
            .unwrap_err();
        match err {
            Error::UnsupportedLowering(message) => {
                assert!(message.contains("table_distinct"), "got: {message}");
            }
            other => panic!("expected UnsupportedLowering, got {other:?}"),
        }
    }

    #[test]
    fn table_valued_child_of_a_value_node_fails() {
        let names = NameGen::new();
        let err = Lowerer::new(&names)
            .lower(Expr::ArrayLen(Box::new(range(4, 2))))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedLowering(_)), "got {err:?}");
    }

    #[test]
    fn bare_table_expression_in_value_position_fails() {
        let names = NameGen::new();
        let err = Lowerer::new(&names).lower(range(4, 2)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLowering(_)), "got {err:?}");
    }

    #[test]
    fn empty_explode_path_fails() {
        let names = NameGen::new();
        let err = Lowerer::new(&names)
            .lower_stage(Expr::TableExplode {
                child: Box::new(range(4, 2)),
                path: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedLowering(_)), "got {err:?}");
    }

    /// Collect every generated name introduced by lowering: binder names
    /// plus generated struct field names.
    fn collect_generated(expr: &Expr, out: &mut Vec<String>) {
        match expr {
            Expr::Let { name, .. } => out.push(name.as_str().to_string()),
            Expr::ArrayMap { binding, .. }
            | Expr::ArrayFilter { binding, .. }
            | Expr::ArrayFlatMap { binding, .. } => out.push(binding.as_str().to_string()),
            Expr::ArrayFold { accum, value, .. } => {
                out.push(accum.as_str().to_string());
                out.push(value.as_str().to_string());
            }
            Expr::CollectDistributedArray {
                ctx_name,
                global_name,
                ..
            } => {
                out.push(ctx_name.as_str().to_string());
                out.push(global_name.as_str().to_string());
            }
            Expr::MakeStruct(fields) | Expr::InsertFields { fields, .. } => {
                for (name, _) in fields {
                    if name.starts_with("__") {
                        out.push(name.clone());
                    }
                }
            }
            _ => {}
        }
        for child in expr.children() {
            collect_generated(child, out);
        }
    }

    #[test]
    fn identical_subtrees_never_share_generated_names() {
        let names = NameGen::new();
        let count = |n, k| Expr::TableCount(Box::new(range(n, k)));
        let expr = Expr::Binary {
            left: Box::new(count(6, 2)),
            op: BinaryOp::Add,
            right: Box::new(count(6, 2)),
        };
        let lowered = Lowerer::new(&names).lower(expr).unwrap();

        let mut generated = Vec::new();
        collect_generated(&lowered, &mut generated);
        assert!(!generated.is_empty());
        let mut seen = FxHashSet::default();
        for name in &generated {
            assert!(
                seen.insert(name.clone()),
                "generated name `{name}` introduced twice"
            );
        }
    }
}
