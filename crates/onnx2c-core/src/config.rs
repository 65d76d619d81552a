// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Compilation options (§6 "Configuration options" of the design).
//!
//! This mirrors the closed option set, decoupled from any particular CLI
//! argument parser — `onnx2c-cli` builds one of these from `clap` and hands
//! it to [`crate::compile`].

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Apply integer quantization substitutions at resolve time.
    pub quantize: bool,
    /// Emit PROGMEM accessors for constant data (AVR targets).
    pub target_avr: bool,
    /// Run the cast-folding pass (§4.6). Default on.
    pub opt_fold_casts: bool,
    /// Run the tensor unionization pass (§4.5). Default on.
    pub opt_unionize: bool,
    /// Move tensor storage into the `entry()` frame instead of module scope.
    pub no_globals: bool,
    /// Emit only initializer definitions, no functions.
    pub only_init: bool,
    /// User-provided bindings for symbolic input dimensions (`dim_param` -> value).
    pub dim_defines: HashMap<String, u32>,
    /// 0 (errors) ..= 4 (trace).
    pub logging_level: u8,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            quantize: false,
            target_avr: false,
            opt_fold_casts: true,
            opt_unionize: true,
            no_globals: false,
            only_init: false,
            dim_defines: HashMap::new(),
            logging_level: 2,
        }
    }
}
