//! Lowering of declarative table IR into partition-aware staged plans.
//!
//! A table-valued expression tree is rewritten, bottom-up, into a
//! [`stage::TableStage`]: a partitioner over the key space, an array of
//! per-partition context values, a broadcast value shared read-only by every
//! partition, and a per-partition body whose only free variables are the
//! context and the broadcast. The staged plan is what a distributed map
//! primitive executes; whole-table consumers (count, globals, collect) fold
//! the plan back into a plain expression.
//!
//! The lowering pass is a pure, synchronous tree transformation. Its only
//! shared state is the fresh-name generator it draws hygienic names from.

pub mod lower;
pub mod partition;
pub mod pipeline;
pub mod stage;

pub use lower::{Lowerer, RANGE_KEY};
pub use partition::{clamp_partitions, partition};
pub use pipeline::{LowerPipeline, MatrixLowerer, Optimizer, PhaseTimings};
pub use stage::{KeyInterval, Partitioner, TableStage};
