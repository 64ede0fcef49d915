//! Reference execution for lowered plans.
//!
//! This crate is the local, in-process consumer of what `stir-lower`
//! produces: a tree-walking interpreter for lowered (table-free)
//! expressions, and a runner realizing the distributed map primitive
//! `run(contexts, broadcast, body)` that staged plans are defined against.
//! It exists so lowered plans can actually be executed and checked; a real
//! deployment hands the same plans to a distributed backend instead.

pub mod interp;
pub mod runner;
pub mod value;

pub use interp::{eval, ValueEnv};
pub use runner::{execute_stage, run};
pub use value::Value;
