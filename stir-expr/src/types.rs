//! Value type descriptors and structural type derivation.

use rustc_hash::FxHashMap;

use stir_result::{Error, Result};

use crate::expr::Expr;
use crate::names::Name;

/// A named field inside a struct type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VField {
    pub name: String,
    pub ty: VType,
}

/// Value type of an expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VType {
    Int32,
    Int64,
    Bool,
    Struct(Vec<VField>),
    Array(Box<VType>),
}

impl VType {
    pub fn struct_of<S: Into<String>>(fields: impl IntoIterator<Item = (S, VType)>) -> VType {
        VType::Struct(
            fields
                .into_iter()
                .map(|(name, ty)| VField {
                    name: name.into(),
                    ty,
                })
                .collect(),
        )
    }

    pub fn array_of(elem: VType) -> VType {
        VType::Array(Box::new(elem))
    }

    /// Field type lookup on a struct type.
    pub fn field(&self, name: &str) -> Option<&VType> {
        match self {
            VType::Struct(fields) => fields.iter().find(|f| f.name == name).map(|f| &f.ty),
            _ => None,
        }
    }

    /// Element type of an array type.
    pub fn element(&self) -> Option<&VType> {
        match self {
            VType::Array(elem) => Some(elem),
            _ => None,
        }
    }
}

/// Name → type environment threaded through type derivation.
pub type TypeEnv = FxHashMap<Name, VType>;

fn extended(env: &TypeEnv, name: &Name, ty: VType) -> TypeEnv {
    let mut out = env.clone();
    out.insert(name.clone(), ty);
    out
}

fn struct_fields(ty: VType, what: &str) -> Result<Vec<VField>> {
    match ty {
        VType::Struct(fields) => Ok(fields),
        other => Err(Error::Type(format!("{what} on non-struct type {other:?}"))),
    }
}

fn element_type(ty: VType, what: &str) -> Result<VType> {
    match ty {
        VType::Array(elem) => Ok(*elem),
        other => Err(Error::Type(format!("{what} on non-array type {other:?}"))),
    }
}

impl Expr {
    /// Derive the structural type of a value expression.
    ///
    /// Binders extend `env` by shadowing. Table-level variants (including
    /// the whole-table consumers) have no value type before lowering;
    /// asking for one is a [`Error::Type`].
    pub fn vtype(&self, env: &TypeEnv) -> Result<VType> {
        match self {
            Expr::Lit(lit) => Ok(lit.vtype()),
            Expr::Ref(name) | Expr::ScanRef(name) => env.get(name).cloned().ok_or_else(|| {
                Error::Type(format!("unbound reference `{name}` during type derivation"))
            }),
            Expr::Let { name, value, body } => {
                let value_ty = value.vtype(env)?;
                body.vtype(&extended(env, name, value_ty))
            }
            Expr::MakeStruct(fields) => Ok(VType::Struct(
                fields
                    .iter()
                    .map(|(name, e)| {
                        Ok(VField {
                            name: name.clone(),
                            ty: e.vtype(env)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            )),
            Expr::GetField { base, field } => {
                let base_ty = base.vtype(env)?;
                base_ty.field(field).cloned().ok_or_else(|| {
                    Error::Type(format!("no field `{field}` on type {base_ty:?}"))
                })
            }
            Expr::InsertFields { base, fields } => {
                let mut out = struct_fields(base.vtype(env)?, "insert_fields")?;
                for (name, e) in fields {
                    let ty = e.vtype(env)?;
                    if let Some(slot) = out.iter_mut().find(|f| f.name == *name) {
                        slot.ty = ty;
                    } else {
                        out.push(VField {
                            name: name.clone(),
                            ty,
                        });
                    }
                }
                Ok(VType::Struct(out))
            }
            Expr::MakeArray { elem_ty, .. } => Ok(VType::array_of(elem_ty.clone())),
            Expr::ArrayRange { .. } => Ok(VType::array_of(VType::Int64)),
            Expr::ArrayLen(_) => Ok(VType::Int32),
            Expr::ArrayMap {
                array,
                binding,
                body,
            } => {
                let elem = element_type(array.vtype(env)?, "array_map")?;
                Ok(VType::array_of(body.vtype(&extended(env, binding, elem))?))
            }
            Expr::ArrayFilter { array, .. } => {
                let ty = array.vtype(env)?;
                element_type(ty.clone(), "array_filter")?;
                Ok(ty)
            }
            Expr::ArrayFlatMap {
                array,
                binding,
                body,
            } => {
                let elem = element_type(array.vtype(env)?, "array_flat_map")?;
                let body_ty = body.vtype(&extended(env, binding, elem))?;
                element_type(body_ty.clone(), "array_flat_map body")?;
                Ok(body_ty)
            }
            Expr::ArrayFold {
                array,
                zero,
                accum,
                value,
                body,
            } => {
                let elem = element_type(array.vtype(env)?, "array_fold")?;
                let zero_ty = zero.vtype(env)?;
                let inner = extended(&extended(env, accum, zero_ty.clone()), value, elem);
                let body_ty = body.vtype(&inner)?;
                if body_ty != zero_ty {
                    return Err(Error::Type(format!(
                        "array_fold body type {body_ty:?} does not match zero type {zero_ty:?}"
                    )));
                }
                Ok(zero_ty)
            }
            Expr::Cast { ty, .. } => Ok(ty.clone()),
            Expr::Binary { left, right, .. } => {
                let left_ty = left.vtype(env)?;
                let right_ty = right.vtype(env)?;
                if left_ty != right_ty {
                    return Err(Error::Type(format!(
                        "mismatched operand types {left_ty:?} vs {right_ty:?}"
                    )));
                }
                match left_ty {
                    VType::Int32 | VType::Int64 => Ok(left_ty),
                    other => Err(Error::Type(format!(
                        "arithmetic on non-integer type {other:?}"
                    ))),
                }
            }
            Expr::Compare { left, right, .. } => {
                let left_ty = left.vtype(env)?;
                let right_ty = right.vtype(env)?;
                if left_ty != right_ty {
                    return Err(Error::Type(format!(
                        "mismatched comparison types {left_ty:?} vs {right_ty:?}"
                    )));
                }
                Ok(VType::Bool)
            }
            Expr::CollectDistributedArray {
                contexts,
                globals,
                ctx_name,
                global_name,
                body,
            } => {
                let ctx_ty = element_type(contexts.vtype(env)?, "collect_distributed_array")?;
                let globals_ty = globals.vtype(env)?;
                // Bodies are closed over exactly their two bindings.
                let mut body_env = TypeEnv::default();
                body_env.insert(ctx_name.clone(), ctx_ty);
                body_env.insert(global_name.clone(), globals_ty);
                Ok(VType::array_of(body.vtype(&body_env)?))
            }
            other => Err(Error::Type(format!(
                "table operation `{}` has no value type before lowering",
                other.kind_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;

    #[test]
    fn derives_struct_and_array_types() {
        let expr = Expr::MakeStruct(vec![
            ("n".to_string(), Expr::i64(3)),
            (
                "xs".to_string(),
                Expr::MakeArray {
                    elem_ty: VType::Int32,
                    elems: vec![Expr::i32(1)],
                },
            ),
        ]);
        let ty = expr.vtype(&TypeEnv::default()).unwrap();
        assert_eq!(
            ty,
            VType::struct_of([("n", VType::Int64), ("xs", VType::array_of(VType::Int32))])
        );
    }

    #[test]
    fn get_field_requires_the_field() {
        let expr = Expr::get_field(Expr::MakeStruct(vec![("a".to_string(), Expr::i64(1))]), "b");
        let err = expr.vtype(&TypeEnv::default()).unwrap_err();
        assert!(matches!(err, Error::Type(_)), "got {err:?}");
    }

    #[test]
    fn insert_fields_replaces_in_place_and_appends() {
        let expr = Expr::InsertFields {
            base: Box::new(Expr::MakeStruct(vec![
                ("a".to_string(), Expr::i64(1)),
                ("b".to_string(), Expr::i64(2)),
            ])),
            fields: vec![
                ("a".to_string(), Expr::boolean(true)),
                ("c".to_string(), Expr::i32(3)),
            ],
        };
        let ty = expr.vtype(&TypeEnv::default()).unwrap();
        assert_eq!(
            ty,
            VType::struct_of([
                ("a", VType::Bool),
                ("b", VType::Int64),
                ("c", VType::Int32),
            ])
        );
    }

    #[test]
    fn binder_shadowing_extends_the_environment() {
        let x = Name::new("x");
        let expr = Expr::ArrayMap {
            array: Box::new(Expr::ArrayRange {
                start: Box::new(Expr::i64(0)),
                stop: Box::new(Expr::i64(3)),
            }),
            binding: x.clone(),
            body: Box::new(Expr::Binary {
                left: Box::new(Expr::Ref(x)),
                op: BinaryOp::Add,
                right: Box::new(Expr::i64(1)),
            }),
        };
        assert_eq!(
            expr.vtype(&TypeEnv::default()).unwrap(),
            VType::array_of(VType::Int64)
        );
    }

    #[test]
    fn table_operations_have_no_value_type() {
        let expr = Expr::TableRange {
            count: 4,
            n_partitions: 2,
        };
        let err = expr.vtype(&TypeEnv::default()).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }
}
