// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `onnx2c`: compiles an ONNX model into a self-contained C translation unit
//! printed to stdout.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use onnx2c_core::{compile_bytes, CompileOptions};

/// Ahead-of-time ONNX-to-C compiler.
#[derive(Debug, Parser)]
#[command(name = "onnx2c", version, about)]
struct Cli {
    /// Path to the input `.onnx` model.
    input: PathBuf,

    /// Apply integer quantization substitutions at resolve time.
    #[arg(short = 'q', long)]
    quantize: bool,

    /// Emit PROGMEM accessors for constant data (AVR targets).
    #[arg(short = 'a', long = "avr")]
    target_avr: bool,

    /// Logging verbosity, 0 (errors only) through 4 (trace).
    #[arg(short = 'l', long = "log", default_value_t = 2)]
    log: u8,

    /// Move tensor storage into the `entry()` frame instead of module scope.
    #[arg(long)]
    no_globals: bool,

    /// Emit only initializer definitions, no functions.
    #[arg(long)]
    only_init: bool,

    /// Bind a symbolic input dimension: `-D batch=1`. Repeatable.
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// Skip the cast-folding pass (§4.6).
    #[arg(long)]
    no_fold_casts: bool,

    /// Skip the tensor unionization pass (§4.5).
    #[arg(long)]
    no_unionize: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log);

    let opts = build_options(&cli)?;
    let bytes = std::fs::read(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;

    match compile_bytes(&bytes, &opts) {
        Ok(c_source) => {
            print!("{c_source}");
            Ok(())
        }
        Err(err) => {
            tracing::error!("{err}");
            std::process::exit(1);
        }
    }
}

fn build_options(cli: &Cli) -> Result<CompileOptions> {
    let mut dim_defines = HashMap::new();
    for raw in &cli.define {
        let (name, value) = raw
            .split_once('=')
            .with_context(|| format!("`-D {raw}` must be of the form NAME=VALUE"))?;
        let value: u32 = value.parse().with_context(|| format!("`-D {raw}`: VALUE must be a non-negative integer"))?;
        dim_defines.insert(name.to_string(), value);
    }

    Ok(CompileOptions {
        quantize: cli.quantize,
        target_avr: cli.target_avr,
        opt_fold_casts: !cli.no_fold_casts,
        opt_unionize: !cli.no_unionize,
        no_globals: cli.no_globals,
        only_init: cli.only_init,
        dim_defines,
        logging_level: cli.log,
    })
}

/// §6/§7: `logging_level` 0..4 maps onto ERROR/WARN/INFO/DEBUG/TRACE.
fn init_tracing(level: u8) {
    let filter = match level {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}
