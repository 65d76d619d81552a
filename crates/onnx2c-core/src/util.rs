// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Small free functions shared by the loader, operators, and emitter.

/// Canonicalizes an arbitrary ONNX name into a valid C identifier fragment:
/// every byte outside `[A-Za-z0-9_]` becomes `_`. Does not add a prefix —
/// callers add `tensor_`/`node_` themselves (see `Tensor::cname`,
/// `Node::cname`).
pub fn cify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Indentation helper for the code emitter: `n` levels of 4-space indent.
pub fn indent(level: usize) -> String {
    "    ".repeat(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cify_replaces_non_identifier_bytes() {
        assert_eq!(cify("conv2d/weight:0"), "conv2d_weight_0");
        assert_eq!(cify("already_valid_1"), "already_valid_1");
        assert_eq!(cify("a.b-c"), "a_b_c");
    }

    #[test]
    fn indent_repeats_four_spaces() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }
}
