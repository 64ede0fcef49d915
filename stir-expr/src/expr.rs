//! Owned, immutable expression tree for table-valued computations.
//!
//! A single tagged union covers value-level operations (literals, struct
//! and array manipulation, let-bindings, casts, arithmetic), the recognized
//! table operations, and the three whole-table consumers. Rewrites always
//! build new trees; nothing here is mutated in place and trees never share
//! nodes through back-references.

use crate::literal::Literal;
use crate::names::Name;
use crate::types::VType;

/// Arithmetic operators over integer expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Modulo,
}

/// Comparison operators producing a boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Expression node.
///
/// Table-valued variants (`Table*` except the three consumers) only appear
/// as inputs to lowering; a lowered tree contains none of them.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lit(Literal),
    /// Variable reference resolved in the ordinary evaluation scope.
    Ref(Name),
    /// Variable reference resolved in the scan/aggregate scope.
    ScanRef(Name),
    Let {
        name: Name,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    MakeStruct(Vec<(String, Expr)>),
    GetField {
        base: Box<Expr>,
        field: String,
    },
    /// Insert fields into a struct. An existing field of the same name is
    /// replaced in place; new fields are appended in order.
    InsertFields {
        base: Box<Expr>,
        fields: Vec<(String, Expr)>,
    },
    MakeArray {
        elem_ty: VType,
        elems: Vec<Expr>,
    },
    /// Half-open `Int64` range `[start, stop)`; empty when `stop <= start`.
    ArrayRange {
        start: Box<Expr>,
        stop: Box<Expr>,
    },
    /// Length of an array, as `Int32`.
    ArrayLen(Box<Expr>),
    ArrayMap {
        array: Box<Expr>,
        binding: Name,
        body: Box<Expr>,
    },
    ArrayFilter {
        array: Box<Expr>,
        binding: Name,
        cond: Box<Expr>,
    },
    ArrayFlatMap {
        array: Box<Expr>,
        binding: Name,
        body: Box<Expr>,
    },
    /// Left fold over an array: `accum` starts at `zero`, `body` combines
    /// `accum` with each `value` in order.
    ArrayFold {
        array: Box<Expr>,
        zero: Box<Expr>,
        accum: Name,
        value: Name,
        body: Box<Expr>,
    },
    Cast {
        value: Box<Expr>,
        ty: VType,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    /// The IR-level image of the distributed map primitive: evaluate `body`
    /// once per element of `contexts`, each invocation seeing exactly
    /// `ctx_name` bound to that element and `global_name` bound to the
    /// shared `globals` value. The result is the array of per-context body
    /// results, in context order.
    CollectDistributedArray {
        contexts: Box<Expr>,
        globals: Box<Expr>,
        ctx_name: Name,
        global_name: Name,
        body: Box<Expr>,
    },

    // Table operations recognized by lowering.
    TableRange {
        count: usize,
        n_partitions: usize,
    },
    /// Replace the table's globals. `new_globals` may reference `global`,
    /// the previous globals value.
    TableMapGlobals {
        child: Box<Expr>,
        new_globals: Box<Expr>,
    },
    /// Keep rows for which `cond` holds. `cond` may reference `row` and
    /// `global`.
    TableFilter {
        child: Box<Expr>,
        cond: Box<Expr>,
    },
    /// Replace each row with `new_row`, which may reference `row` and
    /// `global` in both the ordinary and the scan scope.
    TableMapRows {
        child: Box<Expr>,
        new_row: Box<Expr>,
    },
    /// One output row per element of the array-typed field reached by
    /// `path`, all other fields unchanged.
    TableExplode {
        child: Box<Expr>,
        path: Vec<String>,
    },

    // Table operations constructed upstream but not lowerable here; both
    // require a shuffle.
    TableDistinct {
        child: Box<Expr>,
    },
    TableOrderBy {
        child: Box<Expr>,
        fields: Vec<String>,
    },

    // Whole-table consumers: value-typed nodes with a table-valued child.
    TableCount(Box<Expr>),
    TableGetGlobals(Box<Expr>),
    TableCollect(Box<Expr>),
}

impl Expr {
    pub fn i32(value: i32) -> Expr {
        Expr::Lit(Literal::Int32(value))
    }

    pub fn i64(value: i64) -> Expr {
        Expr::Lit(Literal::Int64(value))
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::Lit(Literal::Bool(value))
    }

    pub fn get_field(base: Expr, field: impl Into<String>) -> Expr {
        Expr::GetField {
            base: Box::new(base),
            field: field.into(),
        }
    }

    pub fn let_in(name: Name, value: Expr, body: Expr) -> Expr {
        Expr::Let {
            name,
            value: Box::new(value),
            body: Box::new(body),
        }
    }

    /// Whether this node is table-valued.
    ///
    /// The whole-table consumers are not: they produce a plain value from a
    /// table-valued child.
    pub fn is_table_op(&self) -> bool {
        matches!(
            self,
            Expr::TableRange { .. }
                | Expr::TableMapGlobals { .. }
                | Expr::TableFilter { .. }
                | Expr::TableMapRows { .. }
                | Expr::TableExplode { .. }
                | Expr::TableDistinct { .. }
                | Expr::TableOrderBy { .. }
        )
    }

    /// Short tag for diagnostics and trace logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Lit(_) => "lit",
            Expr::Ref(_) => "ref",
            Expr::ScanRef(_) => "scan_ref",
            Expr::Let { .. } => "let",
            Expr::MakeStruct(_) => "make_struct",
            Expr::GetField { .. } => "get_field",
            Expr::InsertFields { .. } => "insert_fields",
            Expr::MakeArray { .. } => "make_array",
            Expr::ArrayRange { .. } => "array_range",
            Expr::ArrayLen(_) => "array_len",
            Expr::ArrayMap { .. } => "array_map",
            Expr::ArrayFilter { .. } => "array_filter",
            Expr::ArrayFlatMap { .. } => "array_flat_map",
            Expr::ArrayFold { .. } => "array_fold",
            Expr::Cast { .. } => "cast",
            Expr::Binary { .. } => "binary",
            Expr::Compare { .. } => "compare",
            Expr::CollectDistributedArray { .. } => "collect_distributed_array",
            Expr::TableRange { .. } => "table_range",
            Expr::TableMapGlobals { .. } => "table_map_globals",
            Expr::TableFilter { .. } => "table_filter",
            Expr::TableMapRows { .. } => "table_map_rows",
            Expr::TableExplode { .. } => "table_explode",
            Expr::TableDistinct { .. } => "table_distinct",
            Expr::TableOrderBy { .. } => "table_order_by",
            Expr::TableCount(_) => "table_count",
            Expr::TableGetGlobals(_) => "table_get_globals",
            Expr::TableCollect(_) => "table_collect",
        }
    }

    /// References to every direct child, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Lit(_) | Expr::Ref(_) | Expr::ScanRef(_) | Expr::TableRange { .. } => Vec::new(),
            Expr::Let { value, body, .. } => vec![value.as_ref(), body.as_ref()],
            Expr::MakeStruct(fields) => fields.iter().map(|(_, e)| e).collect(),
            Expr::GetField { base, .. } => vec![base.as_ref()],
            Expr::InsertFields { base, fields } => {
                let mut out: Vec<&Expr> = vec![base.as_ref()];
                out.extend(fields.iter().map(|(_, e)| e));
                out
            }
            Expr::MakeArray { elems, .. } => elems.iter().collect(),
            Expr::ArrayRange { start, stop } => vec![start.as_ref(), stop.as_ref()],
            Expr::ArrayLen(array) => vec![array.as_ref()],
            Expr::ArrayMap { array, body, .. } => vec![array.as_ref(), body.as_ref()],
            Expr::ArrayFilter { array, cond, .. } => vec![array.as_ref(), cond.as_ref()],
            Expr::ArrayFlatMap { array, body, .. } => vec![array.as_ref(), body.as_ref()],
            Expr::ArrayFold {
                array, zero, body, ..
            } => vec![array.as_ref(), zero.as_ref(), body.as_ref()],
            Expr::Cast { value, .. } => vec![value.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Compare { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::CollectDistributedArray {
                contexts,
                globals,
                body,
                ..
            } => vec![contexts.as_ref(), globals.as_ref(), body.as_ref()],
            Expr::TableMapGlobals { child, new_globals } => {
                vec![child.as_ref(), new_globals.as_ref()]
            }
            Expr::TableFilter { child, cond } => vec![child.as_ref(), cond.as_ref()],
            Expr::TableMapRows { child, new_row } => vec![child.as_ref(), new_row.as_ref()],
            Expr::TableExplode { child, .. }
            | Expr::TableDistinct { child }
            | Expr::TableOrderBy { child, .. } => vec![child.as_ref()],
            Expr::TableCount(child) | Expr::TableGetGlobals(child) | Expr::TableCollect(child) => {
                vec![child.as_ref()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumers_are_not_table_valued() {
        let range = Expr::TableRange {
            count: 4,
            n_partitions: 2,
        };
        assert!(range.is_table_op());
        let count = Expr::TableCount(Box::new(range));
        assert!(!count.is_table_op());
        assert_eq!(count.kind_name(), "table_count");
    }

    #[test]
    fn children_cover_scalar_and_table_nodes() {
        let filter = Expr::TableFilter {
            child: Box::new(Expr::TableRange {
                count: 10,
                n_partitions: 3,
            }),
            cond: Expr::boolean(true).into(),
        };
        assert_eq!(filter.children().len(), 2);

        let insert = Expr::InsertFields {
            base: Box::new(Expr::MakeStruct(Vec::new())),
            fields: vec![("a".to_string(), Expr::i64(1))],
        };
        assert_eq!(insert.children().len(), 2);
    }
}
