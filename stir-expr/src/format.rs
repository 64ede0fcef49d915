//! Lightweight rendering of expression trees for diagnostics.

use std::fmt;

use crate::expr::{BinaryOp, CompareOp, Expr};
use crate::literal::Literal;

impl BinaryOp {
    /// Render the operator as a human-readable symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Modulo => "%",
        }
    }
}

impl CompareOp {
    /// Render the operator as a human-readable symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int32(v) => write!(f, "{v}"),
            Literal::Int64(v) => write!(f, "{v}L"),
            Literal::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Compact s-expression rendering, used by error messages and trace logs.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(lit) => write!(f, "{lit}"),
            Expr::Ref(name) => write!(f, "{name}"),
            Expr::ScanRef(name) => write!(f, "(scan {name})"),
            Expr::Let { name, value, body } => write!(f, "(let {name} {value} {body})"),
            Expr::MakeStruct(fields) => {
                write!(f, "(make_struct")?;
                for (name, e) in fields {
                    write!(f, " ({name} {e})")?;
                }
                write!(f, ")")
            }
            Expr::GetField { base, field } => write!(f, "(get_field {base} {field})"),
            Expr::InsertFields { base, fields } => {
                write!(f, "(insert_fields {base}")?;
                for (name, e) in fields {
                    write!(f, " ({name} {e})")?;
                }
                write!(f, ")")
            }
            Expr::MakeArray { elems, .. } => {
                write!(f, "(make_array")?;
                for e in elems {
                    write!(f, " {e}")?;
                }
                write!(f, ")")
            }
            Expr::ArrayRange { start, stop } => write!(f, "(array_range {start} {stop})"),
            Expr::ArrayLen(array) => write!(f, "(array_len {array})"),
            Expr::ArrayMap {
                array,
                binding,
                body,
            } => write!(f, "(array_map {array} {binding} {body})"),
            Expr::ArrayFilter {
                array,
                binding,
                cond,
            } => write!(f, "(array_filter {array} {binding} {cond})"),
            Expr::ArrayFlatMap {
                array,
                binding,
                body,
            } => write!(f, "(array_flat_map {array} {binding} {body})"),
            Expr::ArrayFold {
                array,
                zero,
                accum,
                value,
                body,
            } => write!(f, "(array_fold {array} {zero} {accum} {value} {body})"),
            Expr::Cast { value, ty } => write!(f, "(cast {value} {ty:?})"),
            Expr::Binary { left, op, right } => write!(f, "({op} {left} {right})"),
            Expr::Compare { left, op, right } => write!(f, "({op} {left} {right})"),
            Expr::CollectDistributedArray {
                contexts,
                globals,
                ctx_name,
                global_name,
                body,
            } => write!(
                f,
                "(collect_distributed_array {contexts} {globals} {ctx_name} {global_name} {body})"
            ),
            Expr::TableRange {
                count,
                n_partitions,
            } => write!(f, "(table_range {count} {n_partitions})"),
            Expr::TableMapGlobals { child, new_globals } => {
                write!(f, "(table_map_globals {child} {new_globals})")
            }
            Expr::TableFilter { child, cond } => write!(f, "(table_filter {child} {cond})"),
            Expr::TableMapRows { child, new_row } => {
                write!(f, "(table_map_rows {child} {new_row})")
            }
            Expr::TableExplode { child, path } => {
                write!(f, "(table_explode {child} [{}])", path.join("."))
            }
            Expr::TableDistinct { child } => write!(f, "(table_distinct {child})"),
            Expr::TableOrderBy { child, fields } => {
                write!(f, "(table_order_by {child} [{}])", fields.join(","))
            }
            Expr::TableCount(child) => write!(f, "(table_count {child})"),
            Expr::TableGetGlobals(child) => write!(f, "(table_get_globals {child})"),
            Expr::TableCollect(child) => write!(f, "(table_collect {child})"),
        }
    }
}
