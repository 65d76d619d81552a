// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `prost`-generated bindings for `proto/onnx.proto`, included verbatim from
//! `OUT_DIR`. Only [`crate::loader`] touches these types directly; everything
//! else in the crate works with [`crate::graph::Graph`].
#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/onnx2cpb.rs"));
