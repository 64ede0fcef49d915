//! The top-level lowering pipeline.
//!
//! Phases run in a fixed order: an optional optimize pass, matrix lowering
//! through an external collaborator, another optional optimize, the table
//! lowering dispatcher, and a final optional optimize. Each executed phase
//! can be timed; absent collaborators make their phases pass through with
//! no observable effect.

use std::time::{Duration, Instant};

use stir_expr::{Expr, NameGen};
use stir_result::Result;

use crate::lower::Lowerer;

/// Pure expression → expression transform invoked between phases. No
/// contract beyond type preservation.
pub trait Optimizer {
    fn optimize(&self, expr: Expr) -> Expr;
}

/// Opaque collaborator that rewrites matrix-valued subtrees into
/// table-valued form before table lowering runs.
pub trait MatrixLowerer {
    fn lower_matrices(&self, expr: Expr) -> Result<Expr>;
}

/// Wall-clock spans recorded per executed pipeline phase.
#[derive(Debug, Default)]
pub struct PhaseTimings {
    spans: Vec<(String, Duration)>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: &str, elapsed: Duration) {
        self.spans.push((label.to_string(), elapsed));
    }

    pub fn spans(&self) -> &[(String, Duration)] {
        &self.spans
    }

    pub fn labels(&self) -> Vec<&str> {
        self.spans.iter().map(|(label, _)| label.as_str()).collect()
    }
}

/// Orchestrates one compilation's lowering phases.
pub struct LowerPipeline<'a> {
    names: &'a NameGen,
    optimizer: Option<&'a dyn Optimizer>,
    matrix: Option<&'a dyn MatrixLowerer>,
}

impl<'a> LowerPipeline<'a> {
    pub fn new(names: &'a NameGen) -> Self {
        Self {
            names,
            optimizer: None,
            matrix: None,
        }
    }

    pub fn with_optimizer(mut self, optimizer: &'a dyn Optimizer) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_matrix_lowerer(mut self, matrix: &'a dyn MatrixLowerer) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Run every phase over `expr`, producing a tree with no surviving
    /// table-valued subtrees.
    pub fn run(&self, expr: Expr, mut timings: Option<&mut PhaseTimings>) -> Result<Expr> {
        let mut expr = expr;
        if let Some(optimizer) = self.optimizer {
            expr = phase(&mut timings, "optimize: before lowering", || {
                optimizer.optimize(expr)
            });
        }
        if let Some(matrix) = self.matrix {
            expr = phase(&mut timings, "lower matrix ops", || {
                matrix.lower_matrices(expr)
            })?;
        }
        if let Some(optimizer) = self.optimizer {
            expr = phase(&mut timings, "optimize: after matrix lowering", || {
                optimizer.optimize(expr)
            });
        }
        let lowerer = Lowerer::new(self.names);
        expr = phase(&mut timings, "lower table ops", || lowerer.lower(expr))?;
        if let Some(optimizer) = self.optimizer {
            expr = phase(&mut timings, "optimize: after table lowering", || {
                optimizer.optimize(expr)
            });
        }
        Ok(expr)
    }
}

fn phase<T>(
    timings: &mut Option<&mut PhaseTimings>,
    label: &str,
    run: impl FnOnce() -> T,
) -> T {
    let started = Instant::now();
    let out = run();
    let elapsed = started.elapsed();
    tracing::debug!(phase = label, ?elapsed, "pipeline phase finished");
    if let Some(timings) = timings.as_deref_mut() {
        timings.record(label, elapsed);
    }
    out
}
