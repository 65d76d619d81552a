// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy for graph loading, resolution, and emission.
//!
//! Every variant is fatal: the compiler has no local recovery path, so a
//! `CompileError` always aborts the run. `UnknownDimension` is deliberately
//! absent here — that case is a warning, logged via `tracing::warn!` at the
//! detection site, not an error.

use thiserror::Error;

/// A single location hint attached to an error: the ONNX node or tensor name
/// under resolution when the error was raised, if any.
pub type Site = Option<String>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("bad input{}: {message}", site_suffix(.site))]
    BadInput { message: String, site: Site },

    #[error("unsupported dynamic shape{}: {message}", site_suffix(.site))]
    UnsupportedDynamicShape { message: String, site: Site },

    #[error("unimplemented operator `{op_kind}`{}", site_suffix(.site))]
    UnimplementedOperator { op_kind: String, site: Site },

    #[error("unimplemented feature{}: {message}", site_suffix(.site))]
    UnimplementedFeature { message: String, site: Site },

    #[error("incorrect input{}: {message}", site_suffix(.site))]
    IncorrectInput { message: String, site: Site },

    #[error("unresolvable graph: {count} node(s) made no progress in a full pass: {names:?}")]
    UnresolvableGraph { count: usize, names: Vec<String> },
}

fn site_suffix(site: &Site) -> String {
    match site {
        Some(s) => format!(" (at {s})"),
        None => String::new(),
    }
}

impl CompileError {
    pub fn bad_input(message: impl Into<String>, site: impl Into<Site>) -> Self {
        CompileError::BadInput {
            message: message.into(),
            site: site.into(),
        }
    }

    pub fn unsupported_dynamic_shape(message: impl Into<String>, site: impl Into<Site>) -> Self {
        CompileError::UnsupportedDynamicShape {
            message: message.into(),
            site: site.into(),
        }
    }

    pub fn unimplemented_operator(op_kind: impl Into<String>, site: impl Into<Site>) -> Self {
        CompileError::UnimplementedOperator {
            op_kind: op_kind.into(),
            site: site.into(),
        }
    }

    pub fn unimplemented_feature(message: impl Into<String>, site: impl Into<Site>) -> Self {
        CompileError::UnimplementedFeature {
            message: message.into(),
            site: site.into(),
        }
    }

    pub fn incorrect_input(message: impl Into<String>, site: impl Into<Site>) -> Self {
        CompileError::IncorrectInput {
            message: message.into(),
            site: site.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CompileError>;
