// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! The operator registry (§4.4).
//!
//! A process-wide mapping `op_kind -> factory()`, populated once at startup
//! with one entry per supported operator family. Elementwise families
//! (`Abs`, `Ceil`, `Add`, `Mul`, ...) share a single polymorphic
//! implementation parameterized by a small operation tag — a space-saving
//! collapse, not a capability change, per §4.4.

use crate::operator::Operator;
use std::collections::HashMap;

type Factory = Box<dyn Fn() -> Box<dyn Operator> + Send + Sync>;

/// An immutable table constructed once at program start (§9 Design Notes:
/// "treat it as an immutable table ... do not expose mutation"). There is no
/// `register` method exposed outside this module; the full set is wired by
/// [`OpRegistry::with_builtin_operators`].
pub struct OpRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl OpRegistry {
    fn new() -> Self {
        OpRegistry {
            factories: HashMap::new(),
        }
    }

    fn insert<F>(&mut self, op_kind: &'static str, make: F)
    where
        F: Fn() -> Box<dyn Operator> + Send + Sync + 'static,
    {
        self.factories.insert(op_kind, Box::new(make));
    }

    /// Builds an operator instance for `op_kind`, or `None` if no factory is
    /// registered — callers turn that into `CompileError::UnimplementedOperator`.
    pub fn create(&self, op_kind: &str) -> Option<Box<dyn Operator>> {
        self.factories.get(op_kind).map(|f| f())
    }

    pub fn contains(&self, op_kind: &str) -> bool {
        self.factories.contains_key(op_kind)
    }

    /// The registry populated with every operator family this compiler
    /// implements (the representative set of §1, plus the supplemental
    /// coverage of SPEC_FULL.md's "Additional operator coverage").
    pub fn with_builtin_operators() -> Self {
        let mut r = OpRegistry::new();
        crate::ops::register_all(&mut r);
        r
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::with_builtin_operators()
    }
}

/// Helper used by `ops::register_all`: registers `op_kind` under a factory
/// that clones a template instance produced by `make`.
pub(crate) fn reg<F>(r: &mut OpRegistry, op_kind: &'static str, make: F)
where
    F: Fn() -> Box<dyn Operator> + Send + Sync + 'static,
{
    r.insert(op_kind, make);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_op_kind_has_no_factory() {
        let r = OpRegistry::with_builtin_operators();
        assert!(!r.contains("TotallyMadeUpOperator"));
        assert!(r.create("TotallyMadeUpOperator").is_none());
    }

    #[test]
    fn representative_ops_are_registered() {
        let r = OpRegistry::with_builtin_operators();
        for op in ["Conv", "MaxPool", "AveragePool", "LSTM", "MatMul", "Reshape",
                   "Add", "Softmax", "Slice", "Gather", "Pad", "Resize", "Cast"] {
            assert!(r.contains(op), "missing registry entry for {op}");
        }
    }
}
