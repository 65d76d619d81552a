// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! The tensor model (§3 "Tensor").
//!
//! A `Tensor` is a named, typed, shape-fixed data container, optionally
//! holding compile-time constant data. Tensors never own a reference to their
//! consumers' operator state directly — `consumers` holds [`NodeId`]s, arena
//! indices into the owning [`crate::graph::Graph`], so there is no reference
//! cycle between tensors and the nodes that read them.

use crate::enums::DataType;
use crate::ids::{NodeId, TensorId};
use crate::shape::Shape;
use crate::util::cify;

#[derive(Debug, Clone)]
pub struct Tensor {
    pub name: String,
    pub data_type: DataType,
    pub shape: Shape,
    /// Raw little-endian element bytes, row-major. Present iff `initialize`.
    pub buffer: Option<Vec<u8>>,

    pub is_const: bool,
    pub initialize: bool,
    pub generate: bool,
    pub is_io: bool,
    pub is_recursive: bool,
    pub is_quantized: bool,
    pub union_index: Option<usize>,

    pub consumers: Vec<NodeId>,
    pub alias_of: Option<TensorId>,
}

impl Tensor {
    pub fn new(name: impl Into<String>, data_type: DataType, shape: Shape) -> Self {
        Tensor {
            name: name.into(),
            data_type,
            shape,
            buffer: None,
            is_const: false,
            initialize: false,
            generate: true,
            is_io: false,
            is_recursive: false,
            is_quantized: false,
            union_index: None,
            consumers: Vec::new(),
            alias_of: None,
        }
    }

    /// A compile-time constant tensor carrying `buffer` (an ONNX initializer
    /// or the embedded value of a `Constant` node).
    pub fn constant(name: impl Into<String>, data_type: DataType, shape: Shape, buffer: Vec<u8>) -> Self {
        let mut t = Tensor::new(name, data_type, shape);
        t.is_const = true;
        t.initialize = true;
        t.buffer = Some(buffer);
        t
    }

    /// The C identifier this tensor is emitted under: `tensor_<cify(name)>`.
    pub fn cname(&self) -> String {
        format!("tensor_{}", cify(&self.name))
    }

    /// Per §3: a tensor with no name at all is the sentinel for a missing
    /// optional input/output.
    pub fn is_used(&self) -> bool {
        !self.name.is_empty()
    }

    /// Whether this tensor participates in the unionization pass: transient,
    /// non-IO, non-const, not carrying an initializer, and not recursive
    /// (§9 Design Notes: recursive state must never be unionized).
    pub fn is_union_eligible(&self) -> bool {
        !self.is_io && !self.is_const && !self.initialize && !self.is_recursive
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_scalar()
    }

    /// Reads one element of `buffer` as `f64`, widening from the declared
    /// `data_type`. Used for scalar attribute-like constant inputs (e.g.
    /// Pad's `constant_value`).
    pub fn get_data_element_f64(&self, index: usize) -> Option<f64> {
        let buf = self.buffer.as_ref()?;
        match self.data_type {
            DataType::Float => {
                let bytes: [u8; 4] = buf.get(index * 4..index * 4 + 4)?.try_into().ok()?;
                Some(f32::from_le_bytes(bytes) as f64)
            }
            DataType::Double => {
                let bytes: [u8; 8] = buf.get(index * 8..index * 8 + 8)?.try_into().ok()?;
                Some(f64::from_le_bytes(bytes))
            }
            DataType::Int64 => self.get_data_element_i64(index).map(|v| v as f64),
            DataType::Int32 => {
                let bytes: [u8; 4] = buf.get(index * 4..index * 4 + 4)?.try_into().ok()?;
                Some(i32::from_le_bytes(bytes) as f64)
            }
            _ => None,
        }
    }

    /// Reads one element of `buffer` as `i64`. Used for `Int64`-typed compile
    /// time constants such as Reshape's `shape` input or Gather's indices.
    pub fn get_data_element_i64(&self, index: usize) -> Option<i64> {
        let buf = self.buffer.as_ref()?;
        match self.data_type {
            DataType::Int64 => {
                let bytes: [u8; 8] = buf.get(index * 8..index * 8 + 8)?.try_into().ok()?;
                Some(i64::from_le_bytes(bytes))
            }
            DataType::Int32 => {
                let bytes: [u8; 4] = buf.get(index * 4..index * 4 + 4)?.try_into().ok()?;
                Some(i32::from_le_bytes(bytes) as i64)
            }
            DataType::Int8 => buf.get(index).map(|&b| b as i8 as i64),
            DataType::Uint8 | DataType::Bool => buf.get(index).map(|&b| b as i64),
            DataType::Uint16 => {
                let bytes: [u8; 2] = buf.get(index * 2..index * 2 + 2)?.try_into().ok()?;
                Some(u16::from_le_bytes(bytes) as i64)
            }
            DataType::Int16 => {
                let bytes: [u8; 2] = buf.get(index * 2..index * 2 + 2)?.try_into().ok()?;
                Some(i16::from_le_bytes(bytes) as i64)
            }
            _ => None,
        }
    }

    /// All elements of an `Int64` 1-D constant tensor, in order. Used
    /// whenever an operator requires a compile-time-constant index/shape
    /// vector (Reshape, Slice, Gather, Pad, ScatterND).
    pub fn as_i64_vec(&self) -> Option<Vec<i64>> {
        let n = self.shape.size();
        (0..n).map(|i| self.get_data_element_i64(i)).collect()
    }

    pub fn as_f32_vec(&self) -> Option<Vec<f32>> {
        let buf = self.buffer.as_ref()?;
        if self.data_type != DataType::Float {
            return None;
        }
        buf.chunks_exact(4)
            .map(|c| Some(f32::from_le_bytes(c.try_into().ok()?)))
            .collect()
    }

    /// The C element type this tensor is stored as (§4.7 emitter).
    pub fn c_type(&self) -> &'static str {
        self.data_type.c_type()
    }

    /// §4.2 "make_quantized_copy": only meaningful for constant tensors.
    /// Floating-point tensors are mapped to `i8` by `round(x / max(|min|,
    /// |max|) * 127)`, clamped to `[-127, 127]`. `Int64` tensors are
    /// downcast to `u16` with a range check, returning `None` if any element
    /// falls outside `0..=u16::MAX`. Any other dtype returns `None`.
    pub fn make_quantized_copy(&self) -> Option<Tensor> {
        let n = self.shape.size();
        match self.data_type {
            DataType::Float | DataType::Double => {
                let mut values = Vec::with_capacity(n);
                let mut scale = 0.0f64;
                for i in 0..n {
                    let v = self.get_data_element_f64(i)?;
                    scale = scale.max(v.abs());
                    values.push(v);
                }
                if scale == 0.0 {
                    scale = 1.0;
                }
                let mut buf = Vec::with_capacity(n);
                for v in values {
                    let q = (v / scale * 127.0).round().clamp(-127.0, 127.0) as i8;
                    buf.push(q as u8);
                }
                let mut t = Tensor::constant(format!("{}_quantized", self.name), DataType::Int8, self.shape.clone(), buf);
                t.is_quantized = true;
                Some(t)
            }
            DataType::Int64 => {
                let mut buf = Vec::with_capacity(n * 2);
                for i in 0..n {
                    let v = self.get_data_element_i64(i)?;
                    if !(0..=u16::MAX as i64).contains(&v) {
                        return None;
                    }
                    buf.extend_from_slice(&(v as u16).to_le_bytes());
                }
                let mut t = Tensor::constant(format!("{}_quantized", self.name), DataType::Uint16, self.shape.clone(), buf);
                t.is_quantized = true;
                Some(t)
            }
            _ => None,
        }
    }

    /// `"[d1][d2]..."` for rank >= 1, empty string for a scalar.
    pub fn c_array_dims(&self) -> String {
        self.shape
            .dims()
            .iter()
            .map(|d| format!("[{d}]"))
            .collect()
    }

    /// The declaration of this tensor as a function parameter, under
    /// `local_name` (§4.7 "Per-node functions"). Scalars are passed by
    /// pointer (§6 "Output format"); arrays decay to pointer-to-array
    /// automatically in C, so the array form is written out in full.
    pub fn c_param_decl(&self, local_name: &str) -> String {
        if self.is_scalar() {
            format!("{} *{}", self.c_type(), local_name)
        } else {
            format!("{} {}{}", self.c_type(), local_name, self.c_array_dims())
        }
    }

    /// The declaration of this tensor as a module-scope (or `entry()`-frame)
    /// storage array (§4.7 "Global tensor storage").
    pub fn c_storage_decl(&self) -> String {
        let qualifier = if self.is_const { "const " } else { "" };
        format!("{qualifier}{} {}{}", self.c_type(), self.cname(), self.c_array_dims())
    }

    /// Prints this tensor's compile-time buffer as a nested C initializer
    /// (§4.2 "Initializer printing"). `rank` nested braces, innermost
    /// dimension elements comma-separated.
    pub fn c_initializer(&self) -> String {
        let dims = self.shape.dims();
        let total = self.shape.size();
        let mut elems = Vec::with_capacity(total);
        for i in 0..total {
            elems.push(self.c_initializer_element(i));
        }
        nest_initializer(&elems, dims)
    }

    fn c_initializer_element(&self, index: usize) -> String {
        match self.data_type {
            DataType::Float => {
                let v = self.get_data_element_f64(index).unwrap_or(0.0);
                format!("{}f", format_c_float(v as f32 as f64))
            }
            DataType::Double => {
                let v = self.get_data_element_f64(index).unwrap_or(0.0);
                format_c_float(v)
            }
            DataType::Int8 | DataType::Uint8 => {
                let v = self.get_data_element_i64(index).unwrap_or(0);
                format!("{v}")
            }
            DataType::Bool => {
                let v = self.get_data_element_i64(index).unwrap_or(0);
                if v != 0 {
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            _ => {
                let v = self.get_data_element_i64(index).unwrap_or(0);
                format!("{v}")
            }
        }
    }
}

fn format_c_float(v: f64) -> String {
    if v.is_infinite() {
        if v > 0.0 {
            "INFINITY".to_string()
        } else {
            "-INFINITY".to_string()
        }
    } else if v.is_nan() {
        "NAN".to_string()
    } else {
        format!("{v}")
    }
}

/// Recursively nests `elems` (already in row-major order) `dims.len()`
/// deep, innermost dimension elements joined with `, `.
fn nest_initializer(elems: &[String], dims: &[usize]) -> String {
    if dims.is_empty() {
        return elems.first().cloned().unwrap_or_default();
    }
    if dims.len() == 1 {
        return format!("{{{}}}", elems.join(", "));
    }
    let chunk_size: usize = dims[1..].iter().product();
    let parts: Vec<String> = elems
        .chunks(chunk_size)
        .map(|c| nest_initializer(c, &dims[1..]))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cname_sanitizes_and_prefixes() {
        let t = Tensor::new("conv1/weight:0", DataType::Float, Shape::new(vec![1]));
        assert_eq!(t.cname(), "tensor_conv1_weight_0");
    }

    #[test]
    fn unused_sentinel_has_empty_name() {
        let t = Tensor::new("", DataType::Float, Shape::scalar());
        assert!(!t.is_used());
    }

    #[test]
    fn union_eligibility_excludes_io_const_initialized_recursive() {
        let mut t = Tensor::new("x", DataType::Float, Shape::new(vec![4]));
        assert!(t.is_union_eligible());
        t.is_io = true;
        assert!(!t.is_union_eligible());
        t.is_io = false;
        t.is_recursive = true;
        assert!(!t.is_union_eligible());
    }

    #[test]
    fn reads_int64_constant_vector() {
        let mut data = Vec::new();
        for v in [2i64, 3, 4] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let t = Tensor::constant("shape", DataType::Int64, Shape::new(vec![3]), data);
        assert_eq!(t.as_i64_vec(), Some(vec![2, 3, 4]));
    }

    #[test]
    fn reads_f32_constant_vector() {
        let mut data = Vec::new();
        for v in [1.0f32, 2.0, 3.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let t = Tensor::constant("c", DataType::Float, Shape::new(vec![3]), data);
        assert_eq!(t.as_f32_vec(), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn param_decl_scalar_is_pointer() {
        let t = Tensor::new("s", DataType::Float, Shape::scalar());
        assert_eq!(t.c_param_decl("x"), "float *x");
    }

    #[test]
    fn param_decl_array_keeps_dims() {
        let t = Tensor::new("a", DataType::Float, Shape::new(vec![2, 3]));
        assert_eq!(t.c_param_decl("x"), "float x[2][3]");
    }

    #[test]
    fn quantized_copy_scales_float_to_i8_range() {
        let mut data = Vec::new();
        for v in [-2.0f32, 0.0, 1.0, 2.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let t = Tensor::constant("w", DataType::Float, Shape::new(vec![4]), data);
        let q = t.make_quantized_copy().unwrap();
        assert_eq!(q.data_type, DataType::Int8);
        assert!(q.is_quantized);
        assert_eq!(q.get_data_element_i64(3), Some(127));
        assert_eq!(q.get_data_element_i64(0), Some(-127));
    }

    #[test]
    fn quantized_copy_rejects_int64_out_of_u16_range() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-1i64).to_le_bytes());
        let t = Tensor::constant("idx", DataType::Int64, Shape::new(vec![1]), data);
        assert!(t.make_quantized_copy().is_none());
    }

    #[test]
    fn initializer_nests_by_rank() {
        let mut data = Vec::new();
        for v in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let t = Tensor::constant("w", DataType::Float, Shape::new(vec![2, 3]), data);
        assert_eq!(t.c_initializer(), "{{1f, 2f, 3f}, {4f, 5f, 6f}}");
    }
}
